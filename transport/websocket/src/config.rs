//! WebSocket configuration

use serde::{Deserialize, Serialize};

/// WebSocket connection and behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// Handshake timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Maximum inbound frame size in bytes; larger frames are dropped
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Wrap every outbound frame in double quotes, as the server expects
    #[serde(default = "default_true")]
    pub quote_outbound_frames: bool,
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64KB
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: 10,
            max_message_size: 64 * 1024,
            quote_outbound_frames: true,
        }
    }
}
