use std::collections::HashMap;

use crate::hub::PartyId;
use crate::state::AppState;
use crate::ws::protocol::{AdminLogin, ServerEvent};
use crate::ws::{send_event, ConnectionSender};

/// Static admin credential table (username -> password), loaded from config.
#[derive(Debug, Clone, Default)]
pub struct AdminCredentials {
    table: HashMap<String, String>,
}

impl AdminCredentials {
    pub fn new(table: HashMap<String, String>) -> Self {
        Self { table }
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Exact string match on both username and password.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.table
            .get(username)
            .is_some_and(|expected| expected == password)
    }
}

/// Handle `admin-login`.
///
/// On success the party becomes an admin and receives `admin-auth: true`
/// followed by a one-time `user-list` snapshot. Re-submitting valid
/// credentials simply refreshes the snapshot.
pub fn handle_admin_login(
    req: AdminLogin,
    tx: &ConnectionSender,
    state: &AppState,
    party_id: &PartyId,
) {
    if !state.admin_credentials.verify(&req.username, &req.password) {
        tracing::warn!(
            party_id = %party_id,
            username = %req.username,
            "Admin login rejected"
        );
        send_event(tx, ServerEvent::AdminAuth(false));
        return;
    }

    match state.hub.promote_admin(party_id) {
        Ok(user_list) => {
            tracing::info!(
                party_id = %party_id,
                username = %req.username,
                "Admin authenticated"
            );
            send_event(tx, ServerEvent::AdminAuth(true));
            send_event(tx, ServerEvent::UserList(user_list));
        }
        Err(e) => {
            tracing::warn!(party_id = %party_id, error = %e, "Admin promotion refused");
            send_event(tx, ServerEvent::AdminAuth(false));
        }
    }
}
