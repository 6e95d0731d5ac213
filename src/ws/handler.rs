use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    response::Response,
};
use std::net::SocketAddr;

use crate::state::AppState;
use crate::ws::actor;

/// GET /ws
/// WebSocket upgrade endpoint. Every connection starts as an anonymous viewer;
/// broadcaster and admin roles are obtained in-band through login events.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    tracing::debug!(remote = %remote, "WebSocket upgrade requested");
    ws.on_upgrade(move |socket| actor::run_connection(socket, state, remote))
}
