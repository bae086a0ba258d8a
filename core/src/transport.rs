//! Transport and cluster resolver traits consumed by the client

use crate::errors::RealtimeError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Transport metadata
#[derive(Debug, Clone)]
pub struct TransportInfo {
    /// Transport name (e.g., "websocket", "mock")
    pub name: String,
    /// Transport version
    pub version: String,
}

/// Notification raised by a transport connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Closed,
    Error(String),
    /// One complete inbound text frame
    Message(String),
}

/// Sink for transport notifications
pub type TransportEvents = mpsc::UnboundedSender<TransportEvent>;

/// Persistent text-frame connection to a realtime server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get transport information
    fn info(&self) -> TransportInfo;

    /// Open a connection to `url`, replacing any previous one.
    ///
    /// All notifications for the new connection are sent on `events`.
    /// Returns [`RealtimeError::InvalidUrl`] when `url` cannot be used.
    async fn open(&self, url: &str, events: TransportEvents) -> Result<(), RealtimeError>;

    /// Send one text frame
    async fn send(&self, frame: &str) -> Result<(), RealtimeError>;

    /// Close the current connection, if any
    async fn close(&self) -> Result<(), RealtimeError>;
}

/// Looks up the server URL to use for a cluster bootstrap URL
#[async_trait]
pub trait ClusterResolver: Send + Sync {
    /// Resolve `cluster_url` into a server URL. An empty result is a failure.
    async fn resolve(&self, cluster_url: &str) -> Result<String, RealtimeError>;
}
