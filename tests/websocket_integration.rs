//! WebSocket integration tests
//!
//! Each test runs its own WebSocket server on an ephemeral localhost port.

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, accept_hdr_async, WebSocketStream};
use realtime_messaging::prelude::*;

type ServerStream = WebSocketStream<TcpStream>;

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let port = listener.local_addr().expect("No local address").port();
    (listener, format!("http://127.0.0.1:{}", port))
}

async fn accept(listener: &TcpListener) -> ServerStream {
    let (stream, _) = listener.accept().await.expect("Failed to accept");
    accept_async(stream).await.expect("WebSocket handshake failed")
}

async fn send_text(ws: &mut ServerStream, text: &str) {
    ws.send(Message::Text(text.into()))
        .await
        .expect("Server failed to send");
}

/// Next text frame from the client, skipping control frames
async fn next_text(ws: &mut ServerStream) -> String {
    loop {
        let message = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("Timed out waiting for client frame")
            .expect("Client went away")
            .expect("Read error");
        if let Message::Text(text) = message {
            return text.as_str().to_string();
        }
    }
}

async fn wait_for_client_close(ws: &mut ServerStream) {
    while let Ok(Some(Ok(message))) = timeout(Duration::from_secs(5), ws.next()).await {
        if message.is_close() {
            break;
        }
    }
}

async fn next_transport_event(events: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("Timed out waiting for transport event")
        .expect("Transport event channel closed")
}

async fn next_client_event(events: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("Timed out waiting for client event")
        .expect("Event channel closed")
}

#[tokio::test]
async fn test_transport_exchanges_frames() {
    let (listener, url) = listen().await;
    let (path_tx, path_rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("Failed to accept");
        let mut ws = accept_hdr_async(stream, |request: &Request, response: Response| {
            let _ = path_tx.send(request.uri().path().to_string());
            Ok(response)
        })
        .await
        .expect("WebSocket handshake failed");

        send_text(&mut ws, "o").await;
        let frame = next_text(&mut ws).await;
        ws.close(None).await.expect("Server failed to close");
        frame
    });

    let transport = WebSocketTransport::new(WebSocketConfig::default());
    let (events_tx, mut events) = mpsc::unbounded_channel();
    transport
        .open(&url, events_tx)
        .await
        .expect("Failed to open transport");

    assert_eq!(next_transport_event(&mut events).await, TransportEvent::Opened);
    assert_eq!(
        next_transport_event(&mut events).await,
        TransportEvent::Message("o".to_string())
    );

    transport
        .send("validate;appKey;authToken;;session;")
        .await
        .expect("Failed to send");

    assert_eq!(next_transport_event(&mut events).await, TransportEvent::Closed);

    let frame = server.await.expect("Server task failed");
    assert_eq!(frame, "\"validate;appKey;authToken;;session;\"");

    let path = path_rx.await.expect("Handshake path not captured");
    let segments: Vec<&str> = path.split('/').collect();
    assert_eq!(segments.len(), 5, "{}", path);
    assert_eq!(segments[1], "broadcast");
    assert!(segments[2].parse::<u32>().is_ok());
    assert_eq!(segments[3].len(), 8);
    assert_eq!(segments[4], "websocket");

    assert!(matches!(
        transport.send("b").await,
        Err(RealtimeError::Transport(_))
    ));
}

#[tokio::test]
async fn test_unquoted_frames_when_disabled() {
    let (listener, url) = listen().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let frame = next_text(&mut ws).await;
        wait_for_client_close(&mut ws).await;
        frame
    });

    let transport = WebSocketTransport::new(WebSocketConfig {
        quote_outbound_frames: false,
        ..Default::default()
    });
    let (events_tx, mut events) = mpsc::unbounded_channel();
    transport.open(&url, events_tx).await.expect("Failed to open transport");
    assert_eq!(next_transport_event(&mut events).await, TransportEvent::Opened);

    transport.send("b").await.expect("Failed to send");
    assert_eq!(server.await.expect("Server task failed"), "b");
}

#[tokio::test]
async fn test_close_reports_closed_once() {
    let (listener, url) = listen().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        wait_for_client_close(&mut ws).await;
    });

    let transport = WebSocketTransport::new(WebSocketConfig::default());
    let (events_tx, mut events) = mpsc::unbounded_channel();
    transport.open(&url, events_tx).await.expect("Failed to open transport");
    assert_eq!(next_transport_event(&mut events).await, TransportEvent::Opened);

    transport.close().await.expect("Failed to close");
    assert_eq!(next_transport_event(&mut events).await, TransportEvent::Closed);

    server.await.expect("Server task failed");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_refused_connection_reports_error() {
    let (listener, url) = listen().await;
    drop(listener);

    let transport = WebSocketTransport::new(WebSocketConfig::default());
    let (events_tx, mut events) = mpsc::unbounded_channel();

    // opening only fails synchronously for unusable URLs
    transport.open(&url, events_tx).await.expect("Open should not block");

    assert!(matches!(
        next_transport_event(&mut events).await,
        TransportEvent::Error(_)
    ));
}

#[tokio::test]
async fn test_client_session_over_websocket() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let (listener, url) = listen().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        send_text(&mut ws, "o").await;

        let validate = next_text(&mut ws).await;
        assert!(validate.starts_with("\"validate;appKey;authToken;;"), "{}", validate);
        send_text(
            &mut ws,
            r#"a["{\"op\":\"ortc-validated\",\"up\":null,\"set\":1800}"]"#,
        )
        .await;

        let subscribe = next_text(&mut ws).await;
        assert_eq!(subscribe, "\"subscribe;appKey;authToken;chat;\"");
        send_text(&mut ws, r#"a["{\"op\":\"ortc-subscribed\",\"ch\":\"chat\"}"]"#).await;
        send_text(&mut ws, r#"a["{\"ch\":\"chat\",\"m\":\"hello from server\"}"]"#).await;

        let send = next_text(&mut ws).await;
        assert!(send.starts_with("\"send;appKey;authToken;chat;;"), "{}", send);
        assert!(send.ends_with("_1-1_ping\""), "{}", send);

        wait_for_client_close(&mut ws).await;
    });

    let (handler, mut events) = ChannelHandler::new();
    let config = ClientConfig {
        url: Some(url),
        ..Default::default()
    };
    let client = websocket_client(config, Arc::new(handler)).expect("Failed to build client");

    client.connect("appKey", "authToken").await;
    assert_eq!(next_client_event(&mut events).await, ClientEvent::Connected);

    let (messages_tx, mut messages) = mpsc::unbounded_channel();
    let callback = message_callback(move |message| {
        let messages_tx = messages_tx.clone();
        async move {
            messages_tx
                .send(message)
                .map_err(|e| RealtimeError::Callback(e.to_string()))
        }
    });
    client.subscribe("chat", true, callback).await;
    assert_eq!(
        next_client_event(&mut events).await,
        ClientEvent::Subscribed("chat".to_string())
    );

    let message = timeout(Duration::from_secs(5), messages.recv())
        .await
        .expect("Timed out waiting for channel message")
        .expect("Callback channel closed");
    assert_eq!(message.channel, "chat");
    assert_eq!(message.message, "hello from server");

    client.send("chat", "ping").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.disconnect().await;
    assert_eq!(next_client_event(&mut events).await, ClientEvent::Disconnected);

    server.await.expect("Server script failed");
}
