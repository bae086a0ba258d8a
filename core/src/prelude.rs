//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types and traits from the realtime-core crate.
//!
//! # Examples
//!
//! ```
//! use realtime_core::prelude::*;
//!
//! // Now you have access to all commonly used types:
//! // - ClientConfig, PushRegistration
//! // - ClientHandler, ClientEvent, ChannelMessage, MessageCallback
//! // - Transport, TransportEvent, ClusterResolver
//! // - RealtimeError
//! ```

pub use crate::config::{ClientConfig, PushRegistration};
pub use crate::errors::RealtimeError;
pub use crate::event::{
    message_callback, ChannelHandler, ChannelMessage, ClientEvent, ClientHandler, MessageCallback,
    NoopHandler,
};
pub use crate::transport::{
    ClusterResolver, Transport, TransportEvent, TransportEvents, TransportInfo,
};
