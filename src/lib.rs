//! # Realtime Messaging
//!
//! Client for a realtime publish/subscribe messaging service.
//!
//! ## Features
//!
//! - **Managed connection**: handshake, heartbeats and automatic reconnection
//! - **Channel subscriptions**: permission hashes and resubscription on reconnect
//! - **Large messages**: outbound chunking and inbound reassembly
//! - **Pluggable transport**: WebSocket out of the box, any [`Transport`] otherwise
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use realtime_messaging::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), RealtimeError> {
//!     let config = ClientConfig {
//!         cluster_url: Some("https://balancer.example.com/server/2.1".to_string()),
//!         ..Default::default()
//!     };
//!
//!     let (handler, mut events) = ChannelHandler::new();
//!     let client = websocket_client(config, Arc::new(handler))?;
//!     client.connect("myAppKey", "myAuthToken").await;
//!
//!     while let Some(event) = events.recv().await {
//!         if event == ClientEvent::Connected {
//!             let callback = message_callback(|message: ChannelMessage| async move {
//!                 println!("{}: {}", message.channel, message.message);
//!                 Ok(())
//!             });
//!             client.subscribe("chat", true, callback).await;
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use tracing::info;

pub mod prelude;

pub use realtime_balancer::{BalancerConfig, HttpBalancer};
pub use realtime_client::{ConnectionState, RealtimeClient};
pub use realtime_core::{
    message_callback, ChannelHandler, ChannelMessage, ClientConfig, ClientEvent, ClientHandler,
    ClusterResolver, MessageCallback, NoopHandler, PushRegistration, RealtimeError, Session,
    Transport, TransportEvent, TransportEvents, TransportInfo,
};
pub use realtime_websocket::{WebSocketConfig, WebSocketTransport};

/// Build a client on the WebSocket transport with an HTTP cluster balancer.
///
/// Must be called inside a tokio runtime.
pub fn websocket_client(
    config: ClientConfig,
    handler: Arc<dyn ClientHandler>,
) -> Result<RealtimeClient, RealtimeError> {
    let balancer = HttpBalancer::new(BalancerConfig {
        timeout_seconds: config.balancer_timeout_seconds,
        ..Default::default()
    })?;
    let transport = WebSocketTransport::new(WebSocketConfig::default());

    info!(cluster = config.cluster_url.is_some(), "Creating realtime client");

    Ok(RealtimeClient::with_resolver(
        config,
        Arc::new(transport),
        Arc::new(balancer),
        handler,
    ))
}
