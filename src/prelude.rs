//! Prelude module for convenient imports

pub use crate::websocket_client;

pub use realtime_balancer::{BalancerConfig, HttpBalancer};
pub use realtime_client::{ConnectionState, RealtimeClient};
pub use realtime_core::{
    message_callback, ChannelHandler, ChannelMessage, ClientConfig, ClientEvent, ClientHandler,
    ClusterResolver, MessageCallback, NoopHandler, PushRegistration, RealtimeError, Session,
    Transport, TransportEvent, TransportEvents, TransportInfo,
};
pub use realtime_websocket::{WebSocketConfig, WebSocketTransport};
