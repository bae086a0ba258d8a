//! Connection engine and public client for the realtime messaging protocol

mod client;
mod engine;
mod processor;
pub mod prelude;

pub use client::RealtimeClient;
pub use engine::ConnectionState;
