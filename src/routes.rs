use axum::{extract::State, routing::get, Json, Router};

use crate::hub::PresenceSnapshot;
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler::ws_upgrade))
        .route("/health", get(health_check))
        .route("/api/presence", get(presence))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// GET /api/presence
/// Same snapshot connected clients receive as `update-users`.
async fn presence(State(state): State<AppState>) -> Json<PresenceSnapshot> {
    Json(state.hub.presence())
}
