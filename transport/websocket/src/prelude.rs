//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types from the realtime-websocket crate.
//!
//! # Examples
//!
//! ```
//! use realtime_websocket::prelude::*;
//!
//! let transport = WebSocketTransport::new(WebSocketConfig::default());
//! ```

pub use crate::config::WebSocketConfig;
pub use crate::transport::WebSocketTransport;
