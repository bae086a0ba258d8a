//! Client configuration and the per-client session it produces

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::errors::RealtimeError;

/// Maximum size in bytes of one outbound frame payload, channel included.
pub const MAX_MESSAGE_SIZE: usize = 700;
/// Maximum channel name size in bytes.
pub const MAX_CHANNEL_SIZE: usize = 100;
/// Maximum connection metadata size in bytes.
pub const MAX_CONNECTION_METADATA_SIZE: usize = 256;

pub const HEARTBEAT_MIN_TIME: u64 = 10;
pub const HEARTBEAT_MAX_TIME: u64 = 60;
pub const HEARTBEAT_MIN_FAILS: u32 = 1;
pub const HEARTBEAT_MAX_FAILS: u32 = 6;

/// Platform registration used when subscribing with native notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum PushRegistration {
    /// Google Cloud Messaging registration id
    Gcm { registration_id: String },
    /// Apple Push Notification service device token
    Apns { device_token: String },
}

impl PushRegistration {
    pub fn token(&self) -> &str {
        match self {
            PushRegistration::Gcm { registration_id } => registration_id,
            PushRegistration::Apns { device_token } => device_token,
        }
    }

    /// Platform tag appended to notification-carrying frames.
    pub fn tag(&self) -> &'static str {
        match self {
            PushRegistration::Gcm { .. } => "GCM",
            PushRegistration::Apns { .. } => "Apns",
        }
    }
}

/// Realtime client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server URL (e.g., "https://server.example.com:443")
    #[serde(default)]
    pub url: Option<String>,

    /// Cluster balancer URL; takes precedence over `url` when both are set
    #[serde(default)]
    pub cluster_url: Option<String>,

    /// Connection and reconnect timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,

    /// Send keep-alive frames while connected
    #[serde(default)]
    pub heartbeat_active: bool,

    /// Keep-alive interval in seconds (clamped to 10..=60)
    #[serde(default = "default_heartbeat_time")]
    pub heartbeat_time_seconds: u64,

    /// Keep-alive failures tolerated by the server (clamped to 1..=6)
    #[serde(default = "default_heartbeat_fails")]
    pub heartbeat_fails: u32,

    /// Free-form metadata sent with the handshake (at most 256 bytes)
    #[serde(default)]
    pub connection_metadata: String,

    /// Sub-channel used for server announcements
    #[serde(default)]
    pub announcement_subchannel: String,

    /// Seconds without server traffic before the connection is considered lost
    #[serde(default = "default_server_heartbeat_count")]
    pub server_heartbeat_count: u64,

    /// Cluster balancer lookup timeout in seconds
    #[serde(default = "default_balancer_timeout")]
    pub balancer_timeout_seconds: u64,

    /// Native notification registration
    #[serde(default)]
    pub push_registration: Option<PushRegistration>,
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_heartbeat_time() -> u64 {
    15
}

fn default_heartbeat_fails() -> u32 {
    3
}

fn default_server_heartbeat_count() -> u64 {
    30
}

fn default_balancer_timeout() -> u64 {
    5
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: None,
            cluster_url: None,
            connection_timeout_seconds: 5,
            heartbeat_active: false,
            heartbeat_time_seconds: 15,
            heartbeat_fails: 3,
            connection_metadata: String::new(),
            announcement_subchannel: String::new(),
            server_heartbeat_count: 30,
            balancer_timeout_seconds: 5,
            push_registration: None,
        }
    }
}

impl ClientConfig {
    /// Load a configuration from a JSON document
    pub fn from_json(json: &str) -> Result<Self, RealtimeError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Mutable per-client session state
///
/// The server URL and the cluster URL are mutually exclusive: whichever was
/// written last decides the connection mode.
#[derive(Debug, Clone)]
pub struct Session {
    url: String,
    cluster_url: String,
    is_cluster: bool,
    app_key: String,
    auth_token: String,
    session_id: String,
    connection_metadata: String,
    announcement_subchannel: String,
    heartbeat_active: bool,
    heartbeat_time: u64,
    heartbeat_fails: u32,
    connection_timeout: Duration,
    server_heartbeat_count: u64,
    balancer_timeout: Duration,
    push_registration: Option<PushRegistration>,
}

impl Default for Session {
    fn default() -> Self {
        Session::from(ClientConfig::default())
    }
}

impl From<ClientConfig> for Session {
    fn from(config: ClientConfig) -> Self {
        let mut session = Session {
            url: String::new(),
            cluster_url: String::new(),
            is_cluster: false,
            app_key: String::new(),
            auth_token: String::new(),
            session_id: String::new(),
            connection_metadata: config.connection_metadata,
            announcement_subchannel: config.announcement_subchannel,
            heartbeat_active: config.heartbeat_active,
            heartbeat_time: 0,
            heartbeat_fails: 0,
            connection_timeout: Duration::from_secs(config.connection_timeout_seconds),
            server_heartbeat_count: config.server_heartbeat_count,
            balancer_timeout: Duration::from_secs(config.balancer_timeout_seconds),
            push_registration: config.push_registration,
        };
        session.set_heartbeat_time(config.heartbeat_time_seconds);
        session.set_heartbeat_fails(config.heartbeat_fails);

        if let Some(url) = config.url {
            session.set_url(&url);
        }
        if let Some(cluster_url) = config.cluster_url {
            if !session.url.is_empty() {
                warn!("Both url and cluster_url configured, using cluster mode");
            }
            session.set_cluster_url(&cluster_url);
        }

        session
    }
}

impl Session {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Set the server URL and leave cluster mode
    pub fn set_url(&mut self, url: &str) {
        self.is_cluster = false;
        self.url = url.trim().to_string();
    }

    pub fn cluster_url(&self) -> &str {
        &self.cluster_url
    }

    /// Set the cluster balancer URL and enter cluster mode
    pub fn set_cluster_url(&mut self, cluster_url: &str) {
        self.is_cluster = true;
        self.cluster_url = cluster_url.trim().to_string();
    }

    pub fn is_cluster(&self) -> bool {
        self.is_cluster
    }

    /// Store the URL obtained from the balancer without leaving cluster mode
    pub fn set_resolved_url(&mut self, url: String) {
        self.url = url;
    }

    pub fn app_key(&self) -> &str {
        &self.app_key
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    pub fn set_credentials(&mut self, app_key: &str, auth_token: &str) {
        self.app_key = app_key.to_string();
        self.auth_token = auth_token.to_string();
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Generate a fresh 16 character session id
    pub fn regenerate_session_id(&mut self) -> &str {
        self.session_id = crate::codec::generate_id(16);
        &self.session_id
    }

    pub fn connection_metadata(&self) -> &str {
        &self.connection_metadata
    }

    pub fn set_connection_metadata(&mut self, metadata: &str) {
        self.connection_metadata = metadata.to_string();
    }

    pub fn announcement_subchannel(&self) -> &str {
        &self.announcement_subchannel
    }

    pub fn set_announcement_subchannel(&mut self, subchannel: &str) {
        self.announcement_subchannel = subchannel.to_string();
    }

    pub fn heartbeat_active(&self) -> bool {
        self.heartbeat_active
    }

    pub fn set_heartbeat_active(&mut self, active: bool) {
        self.heartbeat_active = active;
    }

    /// Keep-alive interval in seconds
    pub fn heartbeat_time(&self) -> u64 {
        self.heartbeat_time
    }

    pub fn set_heartbeat_time(&mut self, seconds: u64) {
        self.heartbeat_time = seconds.clamp(HEARTBEAT_MIN_TIME, HEARTBEAT_MAX_TIME);
    }

    pub fn heartbeat_fails(&self) -> u32 {
        self.heartbeat_fails
    }

    pub fn set_heartbeat_fails(&mut self, fails: u32) {
        self.heartbeat_fails = fails.clamp(HEARTBEAT_MIN_FAILS, HEARTBEAT_MAX_FAILS);
    }

    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    pub fn set_connection_timeout(&mut self, timeout: Duration) {
        self.connection_timeout = timeout;
    }

    /// Silence window after which the server is considered gone
    pub fn server_silence_timeout(&self) -> Duration {
        Duration::from_secs(self.server_heartbeat_count)
    }

    pub fn balancer_timeout(&self) -> Duration {
        self.balancer_timeout
    }

    pub fn push_registration(&self) -> Option<&PushRegistration> {
        self.push_registration.as_ref()
    }

    pub fn set_push_registration(&mut self, registration: Option<PushRegistration>) {
        self.push_registration = registration;
    }
}
