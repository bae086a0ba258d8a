//! Applies classified inbound frames to the engine state

use std::time::Duration;
use tracing::{error, info, warn};

use realtime_core::codec::{parse_multipart, Command, Frame};
use realtime_core::{debug_log, ChannelMessage, ClientEvent, RealtimeError};

use crate::engine::{EngineState, Shared};

impl Shared {
    pub(crate) async fn process(&self, state: &mut EngineState, frame: Frame, raw: &str) {
        match frame {
            Frame::Validated { permissions, busy } => {
                self.on_validated(state, permissions, busy).await
            }
            Frame::Subscribed(channel) => {
                if let Some(subscription) = state.channels.get_mut(&channel) {
                    subscription.set_subscribed(true);
                }
                info!(channel = %channel, "Subscribed");
                self.dispatcher.emit(ClientEvent::Subscribed(channel));
            }
            Frame::Unsubscribed(channel) => {
                state.channels.remove(&channel);
                info!(channel = %channel, "Unsubscribed");
                self.dispatcher.emit(ClientEvent::Unsubscribed(channel));
            }
            Frame::Error { op, channel, text } => {
                self.on_server_error(state, op, channel, text).await
            }
            Frame::Received { channel, message } => self.on_received(state, channel, message),
            Frame::Close { code, message } => {
                info!(code = %code, message = %message, "Server sent close frame");
            }
            Frame::UnknownOperation { op } => {
                self.protocol_error(
                    state,
                    format!("Unknown operation \"{}\" for the message \"{}\"", op, raw),
                )
                .await
            }
            Frame::Malformed { op } => {
                self.protocol_error(
                    state,
                    format!("Malformed \"{}\" operation: \"{}\"", op, raw),
                )
                .await
            }
            Frame::Unrecognized => {
                self.protocol_error(state, format!("Unknown message received: {}", raw))
                    .await
            }
            // handled before classification reaches here
            Frame::Open | Frame::Heartbeat => {}
        }
    }

    async fn protocol_error(&self, state: &mut EngineState, message: String) {
        error!(error = %message, "Protocol error, disconnecting");
        self.dispatcher.exception(RealtimeError::Protocol(message));
        self.do_disconnect(state).await;
    }

    async fn on_validated(
        &self,
        state: &mut EngineState,
        permissions: Vec<(String, String)>,
        busy: bool,
    ) {
        debug_log!(permissions = permissions.len(), busy, "Handshake validated");

        state.channels.set_permissions(permissions);
        state.connected = true;
        state.connecting = false;
        state.waiting_server_response = false;
        state.unable_to_connect_reported = false;

        if state.session.heartbeat_active() {
            let interval = Duration::from_secs(state.session.heartbeat_time());
            state.heartbeat.start(interval, true);
        }

        if state.already_connected_first_time {
            for channel in state.channels.retain_for_resubscribe() {
                if let Err(e) = self.resubscribe(state, &channel).await {
                    warn!(channel = %channel, error = %e, "Failed to resubscribe");
                    self.dispatcher.exception(e);
                }
            }
            state.reassembler.clear();

            info!(session_id = %state.session.session_id(), "Reconnected");
            self.dispatcher.emit(ClientEvent::Reconnected);
        } else {
            state.already_connected_first_time = true;
            state.channels.clear();

            info!(session_id = %state.session.session_id(), "Connected");
            self.dispatcher.emit(ClientEvent::Connected);
        }

        if !busy {
            state.reconnect.stop();
        }
        state.reconnect_on_close = true;
    }

    async fn resubscribe(&self, state: &EngineState, channel: &str) -> Result<(), RealtimeError> {
        let hash = state.channels.hash_for(channel).unwrap_or_default();
        let with_notification = state
            .channels
            .get(channel)
            .map(|s| s.with_notification())
            .unwrap_or(false);

        let frame = Command::Subscribe {
            app_key: state.session.app_key(),
            auth_token: state.session.auth_token(),
            channel,
            hash,
            notification: if with_notification {
                state.session.push_registration()
            } else {
                None
            },
        }
        .to_string();
        self.send_frame(&frame).await
    }

    async fn on_server_error(
        &self,
        state: &mut EngineState,
        op: Option<String>,
        channel: Option<String>,
        text: String,
    ) {
        warn!(
            operation = op.as_deref().unwrap_or(""),
            channel = channel.as_deref().unwrap_or(""),
            error = %text,
            "Server reported an error"
        );

        let lowered = text.to_lowercase();
        if !text.is_empty() {
            self.dispatcher.exception(RealtimeError::Server(text));
        }

        match op.as_deref() {
            Some("validate") => {
                if lowered.contains("unable to connect") || lowered.contains("server is too busy")
                {
                    state.connected = false;
                    state.connecting = true;
                    self.do_reconnect(state);
                } else {
                    self.stop_reconnecting(state);
                }
            }
            Some("subscribe") => {
                self.clear_subscribing(state, channel.as_deref());
            }
            Some("subscribe_maxsize") | Some("unsubscribe_maxsize") | Some("send_maxsize") => {
                self.clear_subscribing(state, channel.as_deref());
                self.stop_reconnecting(state);
                self.do_disconnect(state).await;
            }
            _ => {}
        }
    }

    fn clear_subscribing(&self, state: &mut EngineState, channel: Option<&str>) {
        if let Some(subscription) = channel.and_then(|c| state.channels.get_mut(c)) {
            subscription.set_subscribing(false);
        }
    }

    fn on_received(&self, state: &mut EngineState, channel: String, message: String) {
        let Some(subscription) = state.channels.get(&channel) else {
            debug_log!(channel = %channel, "Dropping message for untracked channel");
            return;
        };
        let callback = subscription.callback().clone();

        let complete = match parse_multipart(&message) {
            Some(part) => {
                state.reassembler.ensure_buffer(&part.id);
                state
                    .reassembler
                    .add_fragment(&part.id, part.part, &part.payload);

                if state.reassembler.is_complete(&part.id, part.total) {
                    state.reassembler.drain_sorted(&part.id)
                } else {
                    None
                }
            }
            None => Some(message),
        };

        if let Some(message) = complete {
            self.dispatcher
                .message(callback, ChannelMessage { channel, message });
        }
    }
}
