//! WebSocket transport implementation

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{error, info, warn};
use url::Url;

use crate::config::WebSocketConfig;
use realtime_core::{trace_log, RealtimeError, Transport, TransportEvent, TransportEvents, TransportInfo};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = futures_util::stream::SplitSink<WsStream, Message>;

/// The connection task and the sink its notifications go to
struct Connection {
    task: JoinHandle<()>,
    events: TransportEvents,
}

/// WebSocket transport
///
/// `open` returns as soon as the socket URL is known; connecting, reading
/// and failures are reported through the event sink.
pub struct WebSocketTransport {
    config: WebSocketConfig,
    writer: Arc<Mutex<Option<WsWriter>>>,
    connection: Mutex<Option<Connection>>,
}

impl WebSocketTransport {
    /// Create a new WebSocket transport
    pub fn new(config: WebSocketConfig) -> Self {
        Self {
            config,
            writer: Arc::new(Mutex::new(None)),
            connection: Mutex::new(None),
        }
    }

    /// Build the socket endpoint for a server URL:
    /// `ws(s)://host:port/broadcast/<server id>/<connection id>/websocket`
    pub fn socket_url(url: &str) -> Result<String, RealtimeError> {
        let parsed = Url::parse(url.trim())
            .map_err(|e| RealtimeError::InvalidUrl(format!("{}: {}", url, e)))?;

        let scheme = match parsed.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(RealtimeError::InvalidUrl(format!(
                    "Unsupported scheme '{}' in {}",
                    other, url
                )))
            }
        };
        let host = parsed
            .host_str()
            .ok_or_else(|| RealtimeError::InvalidUrl(format!("Missing host in {}", url)))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| RealtimeError::InvalidUrl(format!("Missing port in {}", url)))?;

        let mut rng = rand::thread_rng();
        let server_id: u32 = rng.gen_range(1..1000);
        let connection_id: String = (0..8)
            .map(|_| rng.gen_range(b'A'..=b'Z') as char)
            .collect();

        Ok(format!(
            "{}://{}:{}/broadcast/{}/{}/websocket",
            scheme, host, port, server_id, connection_id
        ))
    }

    /// Tear down the current connection. Returns its event sink when the
    /// connection task was still running.
    async fn drop_connection(&self) -> Option<TransportEvents> {
        let previous = self.connection.lock().await.take();
        let running = previous.and_then(|connection| {
            let running = !connection.task.is_finished();
            connection.task.abort();
            running.then_some(connection.events)
        });
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.close().await {
                warn!(error = %e, "Failed to close WebSocket connection gracefully");
            }
        }
        running
    }
}

async fn run_connection(
    socket_url: String,
    config: WebSocketConfig,
    writer: Arc<Mutex<Option<WsWriter>>>,
    events: TransportEvents,
) {
    let timeout = Duration::from_secs(config.connect_timeout_seconds);
    let stream = match tokio::time::timeout(timeout, connect_async(socket_url.as_str())).await {
        Ok(Ok((stream, _))) => stream,
        Ok(Err(e)) => {
            error!(url = %socket_url, error = %e, "WebSocket connection failed");
            let _ = events.send(TransportEvent::Error(e.to_string()));
            return;
        }
        Err(_) => {
            error!(url = %socket_url, "WebSocket connection timed out");
            let _ = events.send(TransportEvent::Error(format!(
                "Connection timed out after {}s",
                config.connect_timeout_seconds
            )));
            return;
        }
    };

    info!(url = %socket_url, "Connected to WebSocket server");

    let (write, mut read) = stream.split();
    *writer.lock().await = Some(write);
    let _ = events.send(TransportEvent::Opened);

    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if text.len() > config.max_message_size {
                    warn!(size = text.len(), "Dropping oversized WebSocket frame");
                    continue;
                }
                trace_log!(frame = %text.as_str(), "WebSocket frame received");
                let _ = events.send(TransportEvent::Message(text.as_str().to_string()));
            }
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(text) => {
                    let _ = events.send(TransportEvent::Message(text));
                }
                Err(e) => {
                    warn!(error = %e, "Ignoring non UTF-8 binary frame");
                }
            },
            Ok(Message::Close(_)) => {
                info!(url = %socket_url, "WebSocket connection closed by server");
                break;
            }
            // Ignore control frames
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
            Err(e) => {
                error!(url = %socket_url, error = %e, "WebSocket read error");
                let _ = events.send(TransportEvent::Error(e.to_string()));
                break;
            }
        }
    }

    writer.lock().await.take();
    let _ = events.send(TransportEvent::Closed);
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn info(&self) -> TransportInfo {
        TransportInfo {
            name: "websocket".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    async fn open(&self, url: &str, events: TransportEvents) -> Result<(), RealtimeError> {
        let socket_url = Self::socket_url(url)?;

        // a replaced connection ends silently
        self.drop_connection().await;

        info!(url = %socket_url, "Opening WebSocket connection");
        let task = tokio::spawn(run_connection(
            socket_url,
            self.config.clone(),
            self.writer.clone(),
            events.clone(),
        ));

        *self.connection.lock().await = Some(Connection { task, events });
        Ok(())
    }

    async fn send(&self, frame: &str) -> Result<(), RealtimeError> {
        let payload = if self.config.quote_outbound_frames {
            format!("\"{}\"", frame)
        } else {
            frame.to_string()
        };

        let mut writer_guard = self.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or_else(|| {
            RealtimeError::Transport("WebSocket connection is not established".to_string())
        })?;

        writer
            .send(Message::Text(payload.into()))
            .await
            .map_err(|e| RealtimeError::Transport(format!("WebSocket send failed: {}", e)))
    }

    async fn close(&self) -> Result<(), RealtimeError> {
        if let Some(events) = self.drop_connection().await {
            info!("WebSocket connection closed");
            let _ = events.send(TransportEvent::Closed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(socket_url: &str) -> (String, u32, String) {
        let parts: Vec<&str> = socket_url.split('/').collect();
        // ["ws:", "", "host:port", "broadcast", id, conn, "websocket"]
        assert_eq!(parts.len(), 7, "{}", socket_url);
        assert_eq!(parts[3], "broadcast");
        assert_eq!(parts[6], "websocket");
        (
            format!("{}//{}", parts[0], parts[2]),
            parts[4].parse().unwrap(),
            parts[5].to_string(),
        )
    }

    #[test]
    fn test_socket_url_from_http() {
        let url = WebSocketTransport::socket_url("http://server.example.com/some/path").unwrap();
        let (base, server_id, connection_id) = shape(&url);

        assert_eq!(base, "ws://server.example.com:80");
        assert!((1..1000).contains(&server_id));
        assert_eq!(connection_id.len(), 8);
        assert!(connection_id.chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn test_socket_url_from_https_with_port() {
        let url = WebSocketTransport::socket_url("https://server.example.com:8443").unwrap();
        let (base, _, _) = shape(&url);
        assert_eq!(base, "wss://server.example.com:8443");
    }

    #[test]
    fn test_socket_url_rejects_invalid() {
        assert!(matches!(
            WebSocketTransport::socket_url("not a url"),
            Err(RealtimeError::InvalidUrl(_))
        ));
        assert!(matches!(
            WebSocketTransport::socket_url("ftp://server.example.com"),
            Err(RealtimeError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_send_without_connection_fails() {
        let transport = WebSocketTransport::new(WebSocketConfig::default());
        assert!(matches!(
            transport.send("b").await,
            Err(RealtimeError::Transport(_))
        ));
        assert!(transport.close().await.is_ok());
    }
}
