//! Public client API: input validation in front of the connection engine

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use realtime_core::config::{MAX_CHANNEL_SIZE, MAX_CONNECTION_METADATA_SIZE};
use realtime_core::validation::{is_valid_input, is_valid_url};
use realtime_core::{
    ClientConfig, ClientEvent, ClientHandler, ClusterResolver, MessageCallback, RealtimeError,
    Session, Transport,
};

use crate::engine::{ConnectionEngine, ConnectionState, EngineState};

/// Realtime messaging client
///
/// Every operation validates its input first; failures are reported through
/// [`ClientHandler::on_exception`] and the operation is not attempted.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use realtime_client::RealtimeClient;
/// use realtime_core::prelude::*;
/// # async fn run(transport: Arc<dyn Transport>) {
/// let config = ClientConfig {
///     url: Some("https://server.example.com".to_string()),
///     ..Default::default()
/// };
/// let client = RealtimeClient::new(config, transport, Arc::new(NoopHandler));
/// client.connect("myAppKey", "myToken").await;
/// # }
/// ```
pub struct RealtimeClient {
    engine: ConnectionEngine,
}

impl RealtimeClient {
    /// Create a client connecting directly to a server URL.
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        handler: Arc<dyn ClientHandler>,
    ) -> Self {
        Self {
            engine: ConnectionEngine::new(Session::from(config), transport, None, handler),
        }
    }

    /// Create a client able to resolve its server through a cluster balancer
    pub fn with_resolver(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn ClusterResolver>,
        handler: Arc<dyn ClientHandler>,
    ) -> Self {
        Self {
            engine: ConnectionEngine::new(
                Session::from(config),
                transport,
                Some(resolver),
                handler,
            ),
        }
    }

    /// Validate the credentials and start connecting
    pub async fn connect(&self, app_key: &str, auth_token: &str) {
        let result = {
            let mut state = self.engine.lock().await;
            match validate_connect(&state, app_key, auth_token) {
                Ok(()) => {
                    let shared = self.engine.shared();
                    shared.stop_reconnecting(&mut state);
                    state.session.set_credentials(app_key, auth_token);
                    state.unable_to_connect_reported = false;
                    // set under the same lock as the check above
                    state.begin_connecting();
                    Ok(())
                }
                Err(e) => Err(e),
            }
        };

        match result {
            Ok(()) => {
                info!(app_key = %app_key, "Connecting");
                self.engine.shared().connect().await;
            }
            Err(e) => self.report(e),
        }
    }

    /// Publish `message` on `channel`, split into parts when it is too large
    pub async fn send(&self, channel: &str, message: &str) {
        let mut state = self.engine.lock().await;
        let result = match validate_send(&state, channel, message) {
            Ok(()) => self.engine.shared().send(&mut state, channel, message).await,
            Err(e) => Err(e),
        };
        drop(state);
        self.report_result(result);
    }

    /// Send through the proxy path, authenticated with a private key
    pub async fn send_proxy(
        &self,
        app_key: &str,
        private_key: &str,
        channel: &str,
        message: &str,
    ) {
        let state = self.engine.lock().await;
        let result = match validate_send_proxy(&state, app_key, private_key, channel, message) {
            Ok(()) => {
                self.engine
                    .shared()
                    .send_proxy(app_key, private_key, channel, message)
                    .await
            }
            Err(e) => Err(e),
        };
        drop(state);
        self.report_result(result);
    }

    /// Subscribe to `channel`; `resubscribe` keeps the subscription across reconnects
    pub async fn subscribe(&self, channel: &str, resubscribe: bool, callback: MessageCallback) {
        self.subscribe_inner(channel, resubscribe, false, callback)
            .await
    }

    /// Subscribe and also receive the channel's messages as native notifications
    pub async fn subscribe_with_notifications(
        &self,
        channel: &str,
        resubscribe: bool,
        callback: MessageCallback,
    ) {
        self.subscribe_inner(channel, resubscribe, true, callback)
            .await
    }

    async fn subscribe_inner(
        &self,
        channel: &str,
        resubscribe: bool,
        with_notification: bool,
        callback: MessageCallback,
    ) {
        let mut state = self.engine.lock().await;
        let result = match validate_subscribe(&state, channel, with_notification) {
            Ok(()) => {
                self.engine
                    .shared()
                    .subscribe(&mut state, channel, resubscribe, with_notification, callback)
                    .await
            }
            Err(e) => Err(e),
        };
        drop(state);
        self.report_result(result);
    }

    /// Stop receiving messages from `channel`
    pub async fn unsubscribe(&self, channel: &str) {
        let mut state = self.engine.lock().await;
        let result = match validate_unsubscribe(&state, channel) {
            Ok(()) => self.engine.shared().unsubscribe(&mut state, channel).await,
            Err(e) => Err(e),
        };
        drop(state);
        self.report_result(result);
    }

    /// Whether `channel` is subscribed. Invalid queries are reported and answer `false`.
    pub async fn is_subscribed(&self, channel: &str) -> bool {
        let state = self.engine.lock().await;
        let result = check_connected(&state).and_then(|()| check_channel(channel));
        let subscribed = state
            .channels
            .get(channel)
            .map(|s| s.is_subscribed())
            .unwrap_or(false);
        drop(state);

        match result {
            Ok(()) => subscribed,
            Err(e) => {
                self.report(e);
                false
            }
        }
    }

    /// Stop reconnecting, forget every subscription and close the connection.
    ///
    /// Always results in a `Disconnected` event, even when not connected.
    pub async fn disconnect(&self) {
        let mut state = self.engine.lock().await;
        let shared = self.engine.shared();

        let announced = shared.stop_reconnecting(&mut state);
        state.channels.clear();
        let was_connected = state.connected;
        shared.do_disconnect(&mut state).await;
        drop(state);

        info!("Disconnecting");
        if !was_connected && !announced {
            self.engine.emit(ClientEvent::Disconnected);
        }
    }

    /// Whether the handshake has completed on the current connection
    pub async fn is_connected(&self) -> bool {
        self.engine.lock().await.connected
    }

    /// Current connection state
    pub async fn state(&self) -> ConnectionState {
        self.engine.lock().await.connection_state()
    }

    /// Session id sent with the latest handshake
    pub async fn session_id(&self) -> String {
        self.engine.lock().await.session.session_id().to_string()
    }

    /// Time of the last meaningful frame received from the server
    pub async fn last_keep_alive(&self) -> Option<DateTime<Utc>> {
        self.engine.lock().await.last_keep_alive
    }

    /// Snapshot of the current session settings
    pub async fn session(&self) -> Session {
        self.engine.lock().await.session.clone()
    }

    /// Change session settings; they apply from the next connection attempt
    ///
    /// ```no_run
    /// # async fn run(client: realtime_client::RealtimeClient) {
    /// client
    ///     .update_session(|session| {
    ///         session.set_heartbeat_active(true);
    ///         session.set_heartbeat_time(30);
    ///     })
    ///     .await;
    /// # }
    /// ```
    pub async fn update_session(&self, update: impl FnOnce(&mut Session)) {
        let mut state = self.engine.lock().await;
        update(&mut state.session);
    }

    fn report_result(&self, result: Result<(), RealtimeError>) {
        if let Err(e) = result {
            self.report(e);
        }
    }

    fn report(&self, error: RealtimeError) {
        if error.is_validation() {
            warn!(error = %error, "Operation rejected");
        } else {
            error!(error = %error, "Operation failed");
        }
        self.engine.report(error);
    }
}

fn check_connected(state: &EngineState) -> Result<(), RealtimeError> {
    if state.connected {
        Ok(())
    } else {
        Err(RealtimeError::NotConnected("Not connected".to_string()))
    }
}

fn check_channel(channel: &str) -> Result<(), RealtimeError> {
    if channel.is_empty() {
        return Err(RealtimeError::EmptyField(
            "Channel is null or empty".to_string(),
        ));
    }
    if !is_valid_input(channel) {
        return Err(RealtimeError::InvalidCharacters(
            "Channel has invalid characters".to_string(),
        ));
    }
    if channel.len() > MAX_CHANNEL_SIZE {
        return Err(RealtimeError::MaxLength(format!(
            "Channel size exceeds the limit of {} characters",
            MAX_CHANNEL_SIZE
        )));
    }
    Ok(())
}

fn check_credential(value: &str, name: &str) -> Result<(), RealtimeError> {
    if value.is_empty() {
        return Err(RealtimeError::EmptyField(format!("{} is null or empty", name)));
    }
    if !is_valid_input(value) {
        return Err(RealtimeError::InvalidCharacters(format!(
            "{} has invalid characters",
            name
        )));
    }
    Ok(())
}

fn check_message(message: &str) -> Result<(), RealtimeError> {
    if message.is_empty() {
        return Err(RealtimeError::EmptyField(
            "Message is null or empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_connect(
    state: &EngineState,
    app_key: &str,
    auth_token: &str,
) -> Result<(), RealtimeError> {
    if state.connected {
        return Err(RealtimeError::AlreadyConnected(
            "Already connected".to_string(),
        ));
    }
    if state.connecting {
        return Err(RealtimeError::AlreadyConnected(
            "Already trying to connect".to_string(),
        ));
    }

    let session = &state.session;
    let target = if session.is_cluster() {
        session.cluster_url()
    } else {
        session.url()
    };
    if target.is_empty() {
        return Err(RealtimeError::EmptyField(
            "URL and Cluster URL are null or empty".to_string(),
        ));
    }
    if app_key.is_empty() {
        return Err(RealtimeError::EmptyField(
            "Application Key is null or empty".to_string(),
        ));
    }
    if auth_token.is_empty() {
        return Err(RealtimeError::EmptyField(
            "Authentication Token is null or empty".to_string(),
        ));
    }
    if !is_valid_url(target) {
        let what = if session.is_cluster() { "Cluster URL" } else { "URL" };
        return Err(RealtimeError::InvalidCharacters(format!(
            "{} has invalid characters",
            what
        )));
    }
    check_credential(app_key, "Application Key")?;
    check_credential(auth_token, "Authentication Token")?;

    let announcement = session.announcement_subchannel();
    if !announcement.is_empty() && !is_valid_input(announcement) {
        return Err(RealtimeError::InvalidCharacters(
            "Announcement Subchannel has invalid characters".to_string(),
        ));
    }
    if session.connection_metadata().len() > MAX_CONNECTION_METADATA_SIZE {
        return Err(RealtimeError::MaxLength(format!(
            "Connection metadata size exceeds the limit of {} characters",
            MAX_CONNECTION_METADATA_SIZE
        )));
    }
    Ok(())
}

fn validate_send(state: &EngineState, channel: &str, message: &str) -> Result<(), RealtimeError> {
    check_connected(state)?;
    check_channel(channel)?;
    check_message(message)
}

fn validate_send_proxy(
    state: &EngineState,
    app_key: &str,
    private_key: &str,
    channel: &str,
    message: &str,
) -> Result<(), RealtimeError> {
    check_connected(state)?;
    check_credential(app_key, "Application Key")?;
    check_credential(private_key, "Private Key")?;
    check_channel(channel)?;
    check_message(message)
}

fn validate_subscribe(
    state: &EngineState,
    channel: &str,
    with_notification: bool,
) -> Result<(), RealtimeError> {
    check_connected(state)?;
    check_channel(channel)?;

    if let Some(subscription) = state.channels.get(channel) {
        if subscription.is_subscribing() {
            return Err(RealtimeError::AlreadySubscribed(format!(
                "Already subscribing to the channel {}",
                channel
            )));
        }
        if subscription.is_subscribed() {
            return Err(RealtimeError::AlreadySubscribed(format!(
                "Already subscribed to the channel {}",
                channel
            )));
        }
    }

    if with_notification && state.session.push_registration().is_none() {
        return Err(RealtimeError::PushNotRegistered(
            "No push notification registration is configured".to_string(),
        ));
    }
    Ok(())
}

fn validate_unsubscribe(state: &EngineState, channel: &str) -> Result<(), RealtimeError> {
    check_connected(state)?;
    check_channel(channel)?;

    let subscribed = state
        .channels
        .get(channel)
        .map(|s| s.is_subscribed())
        .unwrap_or(false);
    if !subscribed {
        return Err(RealtimeError::NotSubscribed(format!(
            "Not subscribed to the channel {}",
            channel
        )));
    }
    Ok(())
}
