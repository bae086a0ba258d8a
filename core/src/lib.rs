//! Core types and traits for the realtime messaging client

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub mod channel;
pub mod codec;
pub mod config;
pub mod errors;
pub mod event;
pub mod prelude;
pub mod reassembly;
pub mod timer;
pub mod transport;
pub mod validation;

pub use channel::{ChannelRegistry, ChannelSubscription};
pub use codec::{Command, Frame, Multipart};
pub use config::{ClientConfig, PushRegistration, Session};
pub use errors::RealtimeError;
pub use event::{
    message_callback, ChannelHandler, ChannelMessage, ClientEvent, ClientHandler, EventDispatcher,
    MessageCallback, NoopHandler,
};
pub use reassembly::MessageReassembler;
pub use timer::{Timer, TimerTick};
pub use transport::{ClusterResolver, Transport, TransportEvent, TransportEvents, TransportInfo};
