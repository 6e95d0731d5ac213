use serde_json::Value;

use crate::hub::{ArtifactKind, Claim, HubError, PartyId, WatchOutcome};
use crate::state::AppState;
use crate::ws::protocol::ServerEvent;
use crate::ws::{send_event, ConnectionSender};

/// Handle a `broadcaster` claim.
///
/// Replies with `broadcaster-accepted` on success. An unauthenticated claimant
/// gets `broadcaster-auth-required`, a conflicting claim `broadcaster-unavailable`.
pub fn handle_claim(tx: &ConnectionSender, state: &AppState, party_id: &PartyId) {
    match state.hub.claim(party_id) {
        Ok(Claim::Acquired) | Ok(Claim::AlreadyHolder) => {
            send_event(tx, ServerEvent::BroadcasterAccepted);
        }
        Err(HubError::AuthenticationRequired) => {
            tracing::info!(party_id = %party_id, "Claim refused: not authenticated");
            send_event(tx, ServerEvent::BroadcasterAuthRequired);
        }
        Err(HubError::SlotUnavailable) => {
            tracing::info!(party_id = %party_id, "Claim refused: slot already held");
            send_event(tx, ServerEvent::BroadcasterUnavailable);
        }
        Err(e) => {
            tracing::debug!(party_id = %party_id, error = %e, "Claim ignored");
        }
    }
}

/// Handle `stop-broadcasting`: voluntary release by the holder.
pub fn handle_stop_broadcasting(state: &AppState, party_id: &PartyId) {
    if let Err(e) = state.hub.stop_broadcasting(party_id) {
        tracing::debug!(party_id = %party_id, error = %e, "Stop request ignored");
    }
}

/// Handle a `watcher` request: forward it to the holder, or tell the viewer
/// there is nobody to watch so it can schedule a retry.
pub fn handle_watcher(tx: &ConnectionSender, state: &AppState, party_id: &PartyId) {
    match state.hub.watch(party_id) {
        Ok(WatchOutcome::Forwarded(holder)) => {
            tracing::debug!(
                party_id = %party_id,
                holder_id = %holder,
                "Watcher forwarded to broadcaster"
            );
        }
        Ok(WatchOutcome::NoBroadcaster) => send_event(tx, ServerEvent::NoBroadcaster),
        Ok(WatchOutcome::OwnBroadcast) => {
            tracing::debug!(party_id = %party_id, "Broadcaster asked to watch itself");
        }
        Err(e) => tracing::debug!(party_id = %party_id, error = %e, "Watcher ignored"),
    }
}

/// Relay an offer/answer/ICE candidate to its target with the sender stamped
/// from this connection. A stale target is dropped without telling the sender.
pub fn handle_artifact(
    kind: ArtifactKind,
    payload: Value,
    target: &PartyId,
    state: &AppState,
    party_id: &PartyId,
) {
    match state.hub.route(kind, party_id, target, payload) {
        Ok(()) => {}
        Err(HubError::UnknownTarget(_)) => {
            tracing::debug!(
                party_id = %party_id,
                target_id = %target,
                kind = kind.label(),
                dropped_total = state.hub.dropped_artifacts(),
                "Dropped artifact for disconnected target"
            );
        }
        Err(e) => {
            tracing::debug!(party_id = %party_id, error = %e, "Artifact not routed");
        }
    }
}
