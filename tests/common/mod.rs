//! Shared helpers for integration tests: an in-process server on a random
//! port and a small JSON WebSocket client.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use livecast_server::config::{Config, VerifierKind};
use livecast_server::state::AppState;

pub const JWT_SECRET: &str = "integration-test-secret";
pub const HOST_EMAIL: &str = "host@example.com";
pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASSWORD: &str = "letmein";

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Config with the JWT verifier, one allowed broadcaster and one admin.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.broadcaster.verifier = VerifierKind::Jwt;
    config.broadcaster.jwt_secret = JWT_SECRET.to_string();
    config.broadcaster.allowed_identities = vec![HOST_EMAIL.to_string()];
    config
        .admins
        .insert(ADMIN_USER.to_string(), ADMIN_PASSWORD.to_string());
    config
}

/// Helper: start the server on a random port and return its address and state.
pub async fn start_test_server(config: Config) -> (SocketAddr, AppState) {
    let state = AppState::from_config(&config).expect("Failed to build state");
    let app = livecast_server::routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (addr, state)
}

pub fn ws_url(addr: SocketAddr) -> String {
    format!("ws://{}/ws", addr)
}

/// Mint a broadcaster credential accepted by [`test_config`].
pub fn host_token(email: &str) -> String {
    livecast_server::auth::jwt::issue_identity_token(
        JWT_SECRET.as_bytes(),
        "subject-1",
        Some(email),
        None,
        300,
    )
    .expect("Failed to issue token")
}

pub struct TestClient {
    pub id: String,
    pub welcome: Value,
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    /// Connect and consume the `welcome` event.
    pub async fn connect(addr: SocketAddr) -> Self {
        let (ws, _) = tokio_tungstenite::connect_async(ws_url(addr))
            .await
            .expect("Failed to connect");
        let mut client = Self {
            id: String::new(),
            welcome: Value::Null,
            ws,
        };
        let welcome = client.recv().await;
        assert_eq!(welcome["event"], "welcome", "first event must be welcome");
        client.id = welcome["data"]["id"].as_str().unwrap().to_string();
        client.welcome = welcome;
        client
    }

    pub async fn send(&mut self, frame: Value) {
        self.ws
            .send(Message::Text(frame.to_string().into()))
            .await
            .expect("Failed to send frame");
    }

    pub async fn send_event(&mut self, event: &str) {
        self.send(json!({ "event": event })).await;
    }

    /// Next JSON text frame.
    pub async fn recv(&mut self) -> Value {
        self.recv_within(RECV_TIMEOUT).await
    }

    pub async fn recv_within(&mut self, limit: Duration) -> Value {
        loop {
            let frame = tokio::time::timeout(limit, self.ws.next())
                .await
                .expect("Timed out waiting for a frame")
                .expect("Stream ended")
                .expect("WebSocket error");
            if let Message::Text(text) = frame {
                return serde_json::from_str(text.as_str()).expect("Invalid JSON from server");
            }
        }
    }

    /// Skip frames until one named `event` arrives.
    pub async fn recv_event(&mut self, event: &str) -> Value {
        self.recv_event_within(event, RECV_TIMEOUT).await
    }

    pub async fn recv_event_within(&mut self, event: &str, limit: Duration) -> Value {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let frame = self.recv_within(remaining).await;
            if frame["event"] == event {
                return frame;
            }
        }
    }

    /// Collect every event until a malformed-frame `error` reply comes back.
    /// Frames are handled in order per connection, so everything caused by
    /// earlier frames has been delivered by then.
    pub async fn barrier(&mut self) -> Vec<Value> {
        self.send(json!({ "event": "no-such-event" })).await;
        let mut seen = Vec::new();
        loop {
            let frame = self.recv().await;
            if frame["event"] == "error" {
                return seen;
            }
            seen.push(frame);
        }
    }

    pub async fn login_broadcaster(&mut self, email: &str) -> bool {
        self.send(json!({
            "event": "broadcaster-login",
            "data": { "credential": host_token(email) }
        }))
        .await;
        self.recv_event("broadcaster-auth").await["data"]
            .as_bool()
            .unwrap()
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
