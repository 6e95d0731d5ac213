use crate::hub::{HubError, PartyId};
use crate::state::AppState;
use crate::ws::protocol::StopStream;

/// Handle `stop-stream` (admin only).
///
/// Ends the broadcast held by `target_id`: the holder receives `force-stop`
/// and the remaining parties `broadcaster-terminated`. From a non-admin, or
/// aimed at anyone but the current holder, it changes nothing.
pub fn handle_stop_stream(req: StopStream, state: &AppState, party_id: &PartyId) {
    match state.hub.force_stop(party_id, &req.target_id) {
        Ok(()) => {}
        Err(e @ HubError::NotAdmin(_)) => {
            tracing::warn!(
                party_id = %party_id,
                target_id = %req.target_id,
                error = %e,
                "Unauthorized stop-stream request"
            );
        }
        Err(e) => {
            tracing::info!(
                party_id = %party_id,
                target_id = %req.target_id,
                error = %e,
                "stop-stream had no effect"
            );
        }
    }
}
