//! Connection state machine: connect, handshake, heartbeat and reconnect

use chrono::{DateTime, Utc};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use realtime_core::codec::{generate_id, split_message, Command, Frame};
use realtime_core::config::MAX_MESSAGE_SIZE;
use realtime_core::{
    trace_log, ChannelRegistry, ClientEvent, ClientHandler, ClusterResolver, EventDispatcher,
    MessageCallback, MessageReassembler, RealtimeError, Session, Timer, TimerTick, Transport,
    TransportEvent, TransportEvents,
};

/// Timers owned by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    /// Sends keep-alive frames while connected
    Heartbeat,
    /// Fires when the server has been silent for too long
    Connection,
    /// Retries `connect` while not connected
    Reconnect,
}

/// Observable connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingHandshake,
    Connected,
}

/// Everything guarded by the client's single lock
pub(crate) struct EngineState {
    pub(crate) session: Session,
    pub(crate) channels: ChannelRegistry,
    pub(crate) reassembler: MessageReassembler,
    pub(crate) connected: bool,
    pub(crate) connecting: bool,
    pub(crate) waiting_server_response: bool,
    pub(crate) reconnect_on_close: bool,
    pub(crate) already_connected_first_time: bool,
    pub(crate) open_count: u32,
    pub(crate) unable_to_connect_reported: bool,
    pub(crate) last_keep_alive: Option<DateTime<Utc>>,
    pub(crate) heartbeat: Timer<TimerKind>,
    pub(crate) connection: Timer<TimerKind>,
    pub(crate) reconnect: Timer<TimerKind>,
}

impl EngineState {
    fn new(session: Session, ticks: mpsc::UnboundedSender<TimerTick<TimerKind>>) -> Self {
        Self {
            session,
            channels: ChannelRegistry::new(),
            reassembler: MessageReassembler::new(),
            connected: false,
            connecting: false,
            waiting_server_response: false,
            reconnect_on_close: false,
            already_connected_first_time: false,
            open_count: 0,
            unable_to_connect_reported: false,
            last_keep_alive: None,
            heartbeat: Timer::new(TimerKind::Heartbeat, ticks.clone()),
            connection: Timer::new(TimerKind::Connection, ticks.clone()),
            reconnect: Timer::new(TimerKind::Reconnect, ticks),
        }
    }

    /// Enter the connecting state for a fresh attempt
    pub(crate) fn begin_connecting(&mut self) {
        self.connecting = true;
        self.reconnect_on_close = false;
        self.open_count = 0;
    }

    pub(crate) fn connection_state(&self) -> ConnectionState {
        if self.connected {
            ConnectionState::Connected
        } else if self.connecting && self.waiting_server_response {
            ConnectionState::AwaitingHandshake
        } else if self.connecting {
            ConnectionState::Connecting
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Hash to send for `channel`, or an authorization error when the
    /// granted permissions do not cover it.
    pub(crate) fn permission_hash(
        &self,
        channel: &str,
        action: &str,
    ) -> Result<String, RealtimeError> {
        match self.channels.hash_for(channel) {
            Some(hash) => Ok(hash.to_string()),
            None if self.channels.requires_permission() => Err(RealtimeError::NoPermission(
                format!("No permission found to {} to the channel '{}'", action, channel),
            )),
            None => Ok(String::new()),
        }
    }
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<EngineState>,
    pub(crate) transport: Arc<dyn Transport>,
    resolver: Option<Arc<dyn ClusterResolver>>,
    pub(crate) dispatcher: EventDispatcher,
    transport_events: TransportEvents,
}

/// Drives one client connection
///
/// Transport notifications and timer ticks are applied by a single pump
/// task, in arrival order, under the state lock.
pub(crate) struct ConnectionEngine {
    shared: Arc<Shared>,
    pump: JoinHandle<()>,
}

impl ConnectionEngine {
    /// Create the engine and spawn its pump. Must be called inside a tokio runtime.
    pub(crate) fn new(
        session: Session,
        transport: Arc<dyn Transport>,
        resolver: Option<Arc<dyn ClusterResolver>>,
        handler: Arc<dyn ClientHandler>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            state: Mutex::new(EngineState::new(session, ticks_tx)),
            transport,
            resolver,
            dispatcher: EventDispatcher::spawn(handler),
            transport_events: events_tx,
        });

        let pump = spawn_pump(Arc::downgrade(&shared), events_rx, ticks_rx);

        Self { shared, pump }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.shared.state.lock().await
    }

    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    pub(crate) fn report(&self, error: RealtimeError) {
        self.shared.dispatcher.exception(error);
    }

    pub(crate) fn emit(&self, event: ClientEvent) {
        self.shared.dispatcher.emit(event);
    }
}

impl Drop for ConnectionEngine {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

fn spawn_pump(
    shared: Weak<Shared>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    mut ticks: mpsc::UnboundedReceiver<TimerTick<TimerKind>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(event) = events.recv() => {
                    let Some(shared) = shared.upgrade() else { break };
                    shared.on_transport_event(event).await;
                }
                Some(tick) = ticks.recv() => {
                    let Some(shared) = shared.upgrade() else { break };
                    shared.on_tick(tick).await;
                }
                else => break,
            }
        }
    })
}

impl Shared {
    async fn on_transport_event(&self, event: TransportEvent) {
        let mut state = self.state.lock().await;
        match event {
            TransportEvent::Opened => self.on_opened(&mut state).await,
            TransportEvent::Closed => self.on_closed(&mut state),
            TransportEvent::Error(reason) => self.on_error(&mut state, reason).await,
            TransportEvent::Message(raw) => self.on_message(&mut state, &raw).await,
        }
    }

    async fn on_tick(&self, tick: TimerTick<TimerKind>) {
        let mut state = self.state.lock().await;
        match tick.kind {
            TimerKind::Heartbeat => {
                if state.heartbeat.accept(&tick) && state.connected {
                    if let Err(e) = self.send_frame(&Command::KeepAlive.to_string()).await {
                        warn!(error = %e, "Failed to send keep-alive");
                    }
                }
            }
            TimerKind::Connection => {
                if state.connection.accept(&tick) {
                    warn!("Server silent for too long, treating connection as closed");
                    self.on_closed(&mut state);
                }
            }
            TimerKind::Reconnect => {
                if !state.reconnect.accept(&tick) {
                    return;
                }
                if state.connected {
                    state.reconnect.stop();
                    return;
                }
                if !state.unable_to_connect_reported {
                    state.unable_to_connect_reported = true;
                    self.dispatcher
                        .exception(RealtimeError::NotConnected("Unable to connect".to_string()));
                }
                drop(state);
                self.connect().await;
            }
        }
    }

    /// Resolve the server URL if needed and open the transport.
    ///
    /// The lock is released while the cluster resolver runs.
    pub(crate) async fn connect(&self) {
        let cluster = {
            let mut state = self.state.lock().await;
            state.begin_connecting();

            state.session.is_cluster().then(|| {
                (
                    state.session.cluster_url().to_string(),
                    state.session.balancer_timeout(),
                )
            })
        };

        let resolved = match cluster {
            Some((cluster_url, timeout)) => Some(self.resolve(&cluster_url, timeout).await),
            None => None,
        };

        let mut state = self.state.lock().await;
        match resolved {
            Some(Ok(url)) => {
                info!(url = %url, "Resolved server from cluster");
                state.session.set_resolved_url(url);
            }
            Some(Err(e)) => {
                error!(error = %e, "Cluster resolution failed");
                self.dispatcher.exception(e);
                if state.connecting {
                    self.do_reconnect(&mut state);
                }
                return;
            }
            None => {}
        }

        if !state.connecting {
            return;
        }
        self.open_transport(&mut state).await;
    }

    async fn resolve(&self, cluster_url: &str, timeout: Duration) -> Result<String, RealtimeError> {
        let resolver = self.resolver.as_ref().ok_or_else(|| {
            RealtimeError::ClusterResolution("No cluster resolver configured".to_string())
        })?;

        let url = match tokio::time::timeout(timeout, resolver.resolve(cluster_url)).await {
            Ok(Ok(url)) => url,
            Ok(Err(RealtimeError::ClusterResolution(message))) => {
                return Err(RealtimeError::ClusterResolution(message))
            }
            Ok(Err(e)) => return Err(RealtimeError::ClusterResolution(e.to_string())),
            Err(_) => {
                return Err(RealtimeError::ClusterResolution(format!(
                    "Cluster lookup timed out after {:?}",
                    timeout
                )))
            }
        };

        let url = url.trim();
        if url.is_empty() {
            return Err(RealtimeError::ClusterResolution(
                "Unable to get URL from cluster".to_string(),
            ));
        }
        Ok(url.to_string())
    }

    async fn open_transport(&self, state: &mut EngineState) {
        let url = state.session.url().to_string();
        info!(url = %url, transport = %self.transport.info().name, "Opening connection");

        match self.transport.open(&url, self.transport_events.clone()).await {
            Ok(()) => {
                state.waiting_server_response = true;
                let timeout = state.session.connection_timeout();
                state.reconnect.start(timeout, true);
            }
            Err(e @ RealtimeError::InvalidUrl(_)) => {
                error!(url = %url, error = %e, "Cannot open connection");
                self.dispatcher.exception(e);
                self.stop_reconnecting(state);
            }
            Err(e) => {
                error!(url = %url, error = %e, "Cannot open connection");
                self.dispatcher.exception(e);
                state.connecting = false;
            }
        }
    }

    async fn on_opened(&self, state: &mut EngineState) {
        state.open_count += 1;
        // the socket open and the server's open frame both count
        if state.open_count > 1 {
            self.send_validate(state).await;
        }
    }

    async fn send_validate(&self, state: &mut EngineState) {
        let session_id = state.session.regenerate_session_id().to_string();
        let session = &state.session;

        let frame = Command::Validate {
            app_key: session.app_key(),
            auth_token: session.auth_token(),
            announcement_subchannel: session.announcement_subchannel(),
            session_id: &session_id,
            metadata: session.connection_metadata(),
            heartbeat: session
                .heartbeat_active()
                .then(|| (session.heartbeat_time(), session.heartbeat_fails())),
        }
        .to_string();

        if let Err(e) = self.send_frame(&frame).await {
            self.dispatcher.exception(e);
        }
    }

    async fn on_message(&self, state: &mut EngineState, raw: &str) {
        trace_log!(frame = %raw, "Inbound frame");

        if !Frame::is_close_marker(raw) {
            state.reconnect.stop();
            let silence = state.session.server_silence_timeout();
            state.connection.start(silence, false);
        }

        match Frame::parse(raw) {
            Frame::Open => self.on_opened(state).await,
            Frame::Heartbeat => {}
            frame => {
                state.last_keep_alive = Some(Utc::now());
                self.process(state, frame, raw).await;
            }
        }
    }

    pub(crate) fn on_closed(&self, state: &mut EngineState) {
        let was_active = state.connecting || state.connected;

        state.channels.clear_permissions();
        state.connecting = false;
        state.connected = false;
        state.waiting_server_response = false;
        state.heartbeat.stop();
        state.connection.stop();

        if state.reconnect_on_close {
            warn!("Connection lost, reconnecting");
            self.do_reconnect(state);
        } else if was_active {
            info!("Connection closed");
            self.dispatcher.emit(ClientEvent::Disconnected);
        }
    }

    async fn on_error(&self, state: &mut EngineState, reason: String) {
        error!(error = %reason, connecting = state.connecting, "Transport error");

        if state.connecting {
            self.dispatcher.exception(RealtimeError::Transport(reason));
            self.do_reconnect(state);
        } else {
            self.dispatcher.exception(RealtimeError::Transport(format!(
                "WebSocketConnection exception: {}",
                reason
            )));
            if let Err(e) = self.transport.close().await {
                warn!(error = %e, "Failed to close transport after error");
            }
        }
    }

    /// Announce a reconnect cycle and make sure the retry timer runs
    pub(crate) fn do_reconnect(&self, state: &mut EngineState) {
        if state.connected {
            return;
        }
        self.dispatcher.emit(ClientEvent::Reconnecting);
        if !state.reconnect.is_running() {
            let interval = state.session.connection_timeout();
            state.reconnect.start(interval, true);
        }
    }

    /// Stop retrying. Returns whether a `Disconnected` event was raised.
    pub(crate) fn stop_reconnecting(&self, state: &mut EngineState) -> bool {
        state.connecting = false;
        state.already_connected_first_time = false;

        let was_retrying = state.reconnect.is_running();
        if was_retrying {
            self.dispatcher.emit(ClientEvent::Disconnected);
        }
        state.reconnect.stop();
        was_retrying
    }

    pub(crate) async fn do_disconnect(&self, state: &mut EngineState) {
        state.reconnect_on_close = false;
        state.heartbeat.stop();
        state.connection.stop();
        state.reconnect.stop();

        if let Err(e) = self.transport.close().await {
            self.dispatcher.exception(RealtimeError::Transport(format!(
                "Error disconnecting: {}",
                e
            )));
        }
    }

    pub(crate) async fn send_frame(&self, frame: &str) -> Result<(), RealtimeError> {
        trace_log!(frame = %frame, "Outbound frame");
        self.transport.send(frame).await
    }

    /// Split and transmit a channel message, one frame per part in order
    pub(crate) async fn send(
        &self,
        state: &mut EngineState,
        channel: &str,
        message: &str,
    ) -> Result<(), RealtimeError> {
        let hash = state.permission_hash(channel, "send")?;
        let message = message.replace("\r\n", "\n");
        let parts = split_message(&message, MAX_MESSAGE_SIZE.saturating_sub(channel.len()));
        let message_id = generate_id(8);
        let total = parts.len();

        for (index, payload) in parts.iter().enumerate() {
            let frame = Command::Send {
                app_key: state.session.app_key(),
                auth_token: state.session.auth_token(),
                channel,
                hash: &hash,
                message_id: &message_id,
                part: index + 1,
                total,
                payload,
            }
            .to_string();
            self.send_frame(&frame).await?;
        }
        Ok(())
    }

    /// Like [`Shared::send`] but authenticated with a private key instead of
    /// a permission hash
    pub(crate) async fn send_proxy(
        &self,
        app_key: &str,
        private_key: &str,
        channel: &str,
        message: &str,
    ) -> Result<(), RealtimeError> {
        let message = message.replace("\r\n", "\n");
        let parts = split_message(&message, MAX_MESSAGE_SIZE.saturating_sub(channel.len()));
        let message_id = generate_id(8);
        let total = parts.len();

        for (index, payload) in parts.iter().enumerate() {
            let frame = Command::SendProxy {
                app_key,
                private_key,
                channel,
                message_id: &message_id,
                part: index + 1,
                total,
                payload,
            }
            .to_string();
            self.send_frame(&frame).await?;
        }
        Ok(())
    }

    pub(crate) async fn subscribe(
        &self,
        state: &mut EngineState,
        channel: &str,
        resubscribe: bool,
        with_notification: bool,
        callback: MessageCallback,
    ) -> Result<(), RealtimeError> {
        let hash = state.permission_hash(channel, "subscribe")?;

        let subscription = state.channels.add_or_get(channel, callback.clone());
        subscription.set_subscribing(true);
        subscription.set_resubscribe_on_reconnect(resubscribe);
        subscription.set_with_notification(with_notification);
        subscription.set_callback(callback);

        let notification = if with_notification {
            state.session.push_registration()
        } else {
            None
        };

        let frame = Command::Subscribe {
            app_key: state.session.app_key(),
            auth_token: state.session.auth_token(),
            channel,
            hash: &hash,
            notification,
        }
        .to_string();
        self.send_frame(&frame).await
    }

    pub(crate) async fn unsubscribe(
        &self,
        state: &mut EngineState,
        channel: &str,
    ) -> Result<(), RealtimeError> {
        let with_notification = state
            .channels
            .get(channel)
            .map(|s| s.with_notification())
            .unwrap_or(false);

        let notification = if with_notification {
            state.session.push_registration()
        } else {
            None
        };

        let frame = Command::Unsubscribe {
            app_key: state.session.app_key(),
            channel,
            notification,
        }
        .to_string();
        self.send_frame(&frame).await
    }
}
