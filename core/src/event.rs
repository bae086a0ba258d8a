//! Application-facing events and their asynchronous dispatch

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::errors::RealtimeError;

/// A complete message received on a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub channel: String,
    pub message: String,
}

type CallbackFuture = Pin<Box<dyn Future<Output = Result<(), RealtimeError>> + Send>>;

/// Callback invoked for every message delivered on a subscribed channel
pub type MessageCallback = Arc<dyn Fn(ChannelMessage) -> CallbackFuture + Send + Sync>;

/// Wrap an async closure into a [`MessageCallback`]
pub fn message_callback<F, Fut>(f: F) -> MessageCallback
where
    F: Fn(ChannelMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), RealtimeError>> + Send + 'static,
{
    Arc::new(move |message: ChannelMessage| -> CallbackFuture { Box::pin(f(message)) })
}

/// Lifecycle and channel events raised by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    Reconnecting,
    Reconnected,
    Subscribed(String),
    Unsubscribed(String),
    Exception(RealtimeError),
}

/// Receives client lifecycle events
///
/// Every method defaults to a no-op so handlers only override what they need.
#[async_trait]
pub trait ClientHandler: Send + Sync {
    async fn on_connected(&self) {}

    async fn on_disconnected(&self) {}

    async fn on_reconnecting(&self) {}

    async fn on_reconnected(&self) {}

    async fn on_subscribed(&self, channel: String) {
        let _ = channel;
    }

    async fn on_unsubscribed(&self, channel: String) {
        let _ = channel;
    }

    async fn on_exception(&self, error: RealtimeError) {
        let _ = error;
    }
}

/// Handler that ignores every event
pub struct NoopHandler;

#[async_trait]
impl ClientHandler for NoopHandler {}

/// Forwards every event into an unbounded channel
///
/// Useful for applications that prefer polling a stream of events over
/// implementing [`ClientHandler`].
pub struct ChannelHandler {
    sender: mpsc::UnboundedSender<ClientEvent>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn forward(&self, event: ClientEvent) {
        if self.sender.send(event).is_err() {
            warn!("Client event receiver dropped");
        }
    }
}

#[async_trait]
impl ClientHandler for ChannelHandler {
    async fn on_connected(&self) {
        self.forward(ClientEvent::Connected);
    }

    async fn on_disconnected(&self) {
        self.forward(ClientEvent::Disconnected);
    }

    async fn on_reconnecting(&self) {
        self.forward(ClientEvent::Reconnecting);
    }

    async fn on_reconnected(&self) {
        self.forward(ClientEvent::Reconnected);
    }

    async fn on_subscribed(&self, channel: String) {
        self.forward(ClientEvent::Subscribed(channel));
    }

    async fn on_unsubscribed(&self, channel: String) {
        self.forward(ClientEvent::Unsubscribed(channel));
    }

    async fn on_exception(&self, error: RealtimeError) {
        self.forward(ClientEvent::Exception(error));
    }
}

enum Dispatch {
    Client(ClientEvent),
    Message {
        callback: MessageCallback,
        message: ChannelMessage,
    },
}

/// Queues events for delivery on a background worker task
///
/// Events are never delivered inline; callers only enqueue.
pub struct EventDispatcher {
    sender: mpsc::UnboundedSender<Dispatch>,
    worker: JoinHandle<()>,
}

impl EventDispatcher {
    /// Spawn the dispatch worker. Must be called inside a tokio runtime.
    pub fn spawn(handler: Arc<dyn ClientHandler>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Dispatch>();

        let worker = tokio::spawn(async move {
            while let Some(dispatch) = receiver.recv().await {
                match dispatch {
                    Dispatch::Client(event) => deliver(handler.as_ref(), event).await,
                    Dispatch::Message { callback, message } => {
                        let channel = message.channel.clone();
                        if let Err(e) = callback(message).await {
                            error!(
                                channel = %channel,
                                error = %e,
                                "Message callback execution failed"
                            );
                        }
                    }
                }
            }
        });

        Self { sender, worker }
    }

    pub fn emit(&self, event: ClientEvent) {
        if self.sender.send(Dispatch::Client(event)).is_err() {
            warn!("Event dispatcher stopped, dropping client event");
        }
    }

    pub fn exception(&self, error: RealtimeError) {
        self.emit(ClientEvent::Exception(error));
    }

    pub fn message(&self, callback: MessageCallback, message: ChannelMessage) {
        if self
            .sender
            .send(Dispatch::Message { callback, message })
            .is_err()
        {
            warn!("Event dispatcher stopped, dropping channel message");
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

async fn deliver(handler: &dyn ClientHandler, event: ClientEvent) {
    match event {
        ClientEvent::Connected => handler.on_connected().await,
        ClientEvent::Disconnected => handler.on_disconnected().await,
        ClientEvent::Reconnecting => handler.on_reconnecting().await,
        ClientEvent::Reconnected => handler.on_reconnected().await,
        ClientEvent::Subscribed(channel) => handler.on_subscribed(channel).await,
        ClientEvent::Unsubscribed(channel) => handler.on_unsubscribed(channel).await,
        ClientEvent::Exception(error) => handler.on_exception(error).await,
    }
}
