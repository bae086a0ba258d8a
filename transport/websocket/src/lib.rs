//! WebSocket transport for the realtime messaging client
//!
//! This crate connects the client to a realtime server over WebSocket:
//! - Server URL to socket endpoint conversion
//! - Quoted outbound text frames
//! - Read errors and socket close reported as transport events
//! - Configurable handshake timeout and inbound frame size limit

mod config;
mod transport;
pub mod prelude;

pub use config::WebSocketConfig;
pub use transport::WebSocketTransport;
