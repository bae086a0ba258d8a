//! Balancer configuration

use serde::{Deserialize, Serialize};

/// Cluster balancer lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancerConfig {
    /// Timeout for balancer requests in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Whether to verify SSL certificates
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    /// User agent sent with every lookup
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    format!("realtime-messaging/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 5,
            verify_ssl: true,
            user_agent: default_user_agent(),
        }
    }
}
