use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::hub::PartyId;
use crate::state::AppState;
use crate::stream::turn;
use crate::ws::protocol::{self, ServerEvent, Welcome};
use crate::ws::send_event;

/// Ping interval: server sends WebSocket ping every 30 seconds.
/// Abrupt disconnects are detected through missing pongs.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for one WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, serializes hub events and forwards control frames
/// - Reader task: decodes incoming events and dispatches them to protocol handlers
///
/// The party is registered in the hub for the lifetime of the reader loop and
/// removed (releasing the broadcast slot if it held it) once the loop ends.
pub async fn run_connection(socket: WebSocket, state: AppState, remote: SocketAddr) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<ServerEvent>();
    let (control_tx, control_rx) = mpsc::unbounded_channel::<Message>();

    // Welcome goes out first so the client knows its id before any fan-out.
    let party_id = PartyId::generate();
    send_event(
        &tx,
        ServerEvent::Welcome(Welcome {
            id: party_id.clone(),
            ice_servers: turn::get_ice_servers(&state.ice, &party_id),
            retry: state.retry,
        }),
    );
    state.hub.connect(party_id.clone(), tx.clone());

    tracing::info!(
        party_id = %party_id,
        remote = %remote,
        "WebSocket actor started"
    );

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx, control_rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = control_tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died, connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Reader loop: process incoming WebSocket messages
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_message(text.as_str(), &tx, &state, &party_id).await;
                }
                Message::Binary(data) => {
                    tracing::debug!(
                        party_id = %party_id,
                        bytes = data.len(),
                        "Ignoring binary frame (expected JSON text)"
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = control_tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        party_id = %party_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    party_id = %party_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(party_id = %party_id, "WebSocket stream ended");
                break;
            }
        }
    }

    writer_handle.abort();
    ping_handle.abort();

    // Runs to completion before the id is forgotten: registry removal,
    // conditional slot release, presence push.
    state.hub.disconnect(&party_id);

    tracing::info!(party_id = %party_id, "WebSocket actor stopped");
}

/// Writer task: serializes hub events and forwards control frames to the sink.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
    mut control: mpsc::UnboundedReceiver<Message>,
) {
    loop {
        let msg = tokio::select! {
            Some(frame) = control.recv() => frame,
            Some(event) = events.recv() => match serde_json::to_string(&event) {
                Ok(text) => Message::Text(text.into()),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to encode server event");
                    continue;
                }
            },
            else => break,
        };

        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed, connection is broken
            break;
        }
    }
}
