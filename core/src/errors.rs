//! Error types for the realtime messaging client

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RealtimeError {
    #[error("Already connected: {0}")]
    AlreadyConnected(String),

    #[error("Already subscribed: {0}")]
    AlreadySubscribed(String),

    #[error("Empty field: {0}")]
    EmptyField(String),

    #[error("Invalid characters: {0}")]
    InvalidCharacters(String),

    #[error("Max length exceeded: {0}")]
    MaxLength(String),

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Not subscribed: {0}")]
    NotSubscribed(String),

    #[error("Permission error: {0}")]
    NoPermission(String),

    #[error("Push notification error: {0}")]
    PushNotRegistered(String),

    /// The server URL could not be turned into a socket address.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Cluster resolution error: {0}")]
    ClusterResolution(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Error text reported by the server through an `ortc-error` operation.
    #[error("{0}")]
    Server(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Callback execution error: {0}")]
    Callback(String),
}

impl From<serde_json::Error> for RealtimeError {
    fn from(err: serde_json::Error) -> Self {
        RealtimeError::Config(err.to_string())
    }
}

impl RealtimeError {
    /// Whether the error was produced by local input validation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RealtimeError::AlreadyConnected(_)
                | RealtimeError::AlreadySubscribed(_)
                | RealtimeError::EmptyField(_)
                | RealtimeError::InvalidCharacters(_)
                | RealtimeError::MaxLength(_)
                | RealtimeError::NotConnected(_)
                | RealtimeError::NotSubscribed(_)
        )
    }
}
