//! Wire protocol: one JSON object per text frame, `{"event": ..., "data": ...}`.
//!
//! Both directions are closed sets of variants, so dispatch is checked for
//! exhaustiveness at compile time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::{admin, gate};
use crate::config::ViewerConfig;
use crate::hub::{ArtifactKind, PartyId, PartyView, PresenceSnapshot};
use crate::moderation;
use crate::state::AppState;
use crate::stream::signaling;
use crate::stream::turn::IceServer;
use crate::ws::{send_event, ConnectionSender};

// --- client -> server ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Claim the broadcast slot.
    Broadcaster,
    /// Voluntarily release the broadcast slot.
    StopBroadcasting,
    BroadcasterLogin(BroadcasterLogin),
    AdminLogin(AdminLogin),
    /// Ask the current broadcaster to initiate an offer.
    Watcher,
    Offer(ArtifactRequest),
    Answer(ArtifactRequest),
    IceCandidate(CandidateRequest),
    /// Admin-only forced stop.
    StopStream(StopStream),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcasterLogin {
    pub credential: String,
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminLogin {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AdminLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminLogin")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Inbound offer/answer. Any `sender` field a client adds is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRequest {
    pub payload: Value,
    pub target: PartyId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRequest {
    #[serde(alias = "payload")]
    pub candidate: Value,
    pub target: PartyId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopStream {
    pub target_id: PartyId,
}

// --- server -> client ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// First event on every connection.
    Welcome(Welcome),
    BroadcasterAvailable,
    BroadcasterDisconnected,
    BroadcasterStopped,
    /// The broadcast was ended by an admin.
    BroadcasterTerminated,
    /// The claim succeeded (or the claimant already held the slot).
    BroadcasterAccepted,
    /// The slot is held by someone else.
    BroadcasterUnavailable,
    NoBroadcaster,
    BroadcasterAuth(bool),
    BroadcasterAuthRequired,
    AdminAuth(bool),
    UserList(UserList),
    UpdateUsers(PresenceSnapshot),
    ForceStop,
    Watcher(WatcherNotice),
    Offer(RoutedArtifact),
    Answer(RoutedArtifact),
    IceCandidate(RoutedArtifact),
    /// A viewer left; sent to the broadcaster so it can drop that peer.
    UserDisconnected(PartyNotice),
    Error(ErrorNotice),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    pub id: PartyId,
    pub ice_servers: Vec<IceServer>,
    pub retry: RetryHints,
}

/// Reconnection timing viewers should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryHints {
    pub negotiation_timeout_ms: u64,
    pub retry_interval_ms: u64,
}

impl From<&ViewerConfig> for RetryHints {
    fn from(viewer: &ViewerConfig) -> Self {
        Self {
            negotiation_timeout_ms: viewer.negotiation_timeout_secs * 1000,
            retry_interval_ms: viewer.retry_interval_secs * 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserList {
    pub parties: BTreeMap<PartyId, PartyView>,
    pub slot_holder_id: Option<PartyId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherNotice {
    pub sender: PartyId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedArtifact {
    pub payload: Value,
    pub sender: PartyId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyNotice {
    pub id: PartyId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub code: u16,
    pub message: String,
}

/// Handle an incoming text frame: decode the event and dispatch it.
pub async fn handle_text_message(
    text: &str,
    tx: &ConnectionSender,
    state: &AppState,
    party_id: &PartyId,
) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                party_id = %party_id,
                error = %e,
                "Failed to decode client event"
            );
            send_error(tx, 400, "Malformed event");
            return;
        }
    };

    dispatch_event(event, tx, state, party_id).await;
}

/// Dispatch a decoded client event to its handler.
async fn dispatch_event(
    event: ClientEvent,
    tx: &ConnectionSender,
    state: &AppState,
    party_id: &PartyId,
) {
    match event {
        ClientEvent::Broadcaster => signaling::handle_claim(tx, state, party_id),
        ClientEvent::StopBroadcasting => signaling::handle_stop_broadcasting(state, party_id),
        ClientEvent::BroadcasterLogin(req) => {
            gate::handle_broadcaster_login(req, tx, state, party_id).await
        }
        ClientEvent::AdminLogin(req) => admin::handle_admin_login(req, tx, state, party_id),
        ClientEvent::Watcher => signaling::handle_watcher(tx, state, party_id),
        ClientEvent::Offer(req) => {
            signaling::handle_artifact(ArtifactKind::Offer, req.payload, &req.target, state, party_id)
        }
        ClientEvent::Answer(req) => {
            signaling::handle_artifact(ArtifactKind::Answer, req.payload, &req.target, state, party_id)
        }
        ClientEvent::IceCandidate(req) => signaling::handle_artifact(
            ArtifactKind::IceCandidate,
            req.candidate,
            &req.target,
            state,
            party_id,
        ),
        ClientEvent::StopStream(req) => {
            moderation::stop::handle_stop_stream(req, state, party_id)
        }
    }
}

/// Send an error notice for a frame that could not be handled.
fn send_error(tx: &ConnectionSender, code: u16, message: &str) {
    send_event(
        tx,
        ServerEvent::Error(ErrorNotice {
            code,
            message: message.to_string(),
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unit_events_have_no_data() {
        let json = serde_json::to_value(ServerEvent::NoBroadcaster).unwrap();
        assert_eq!(json, json!({ "event": "no-broadcaster" }));

        let parsed: ClientEvent = serde_json::from_value(json!({ "event": "watcher" })).unwrap();
        assert_eq!(parsed, ClientEvent::Watcher);
    }

    #[test]
    fn test_client_sender_field_is_ignored() {
        let parsed: ClientEvent = serde_json::from_value(json!({
            "event": "offer",
            "data": { "payload": { "sdp": "v=0" }, "target": "b", "sender": "spoofed" }
        }))
        .unwrap();

        assert_eq!(
            parsed,
            ClientEvent::Offer(ArtifactRequest {
                payload: json!({ "sdp": "v=0" }),
                target: PartyId::from("b"),
            })
        );
    }

    #[test]
    fn test_stop_stream_uses_camel_case() {
        let parsed: ClientEvent = serde_json::from_value(json!({
            "event": "stop-stream",
            "data": { "targetId": "holder" }
        }))
        .unwrap();
        assert_eq!(
            parsed,
            ClientEvent::StopStream(StopStream {
                target_id: PartyId::from("holder")
            })
        );
    }

    #[test]
    fn test_welcome_shape() {
        let welcome = ServerEvent::Welcome(Welcome {
            id: PartyId::from("p1"),
            ice_servers: vec![],
            retry: RetryHints::from(&ViewerConfig::default()),
        });
        assert_eq!(
            serde_json::to_value(welcome).unwrap(),
            json!({
                "event": "welcome",
                "data": {
                    "id": "p1",
                    "iceServers": [],
                    "retry": { "negotiationTimeoutMs": 5000, "retryIntervalMs": 2000 }
                }
            })
        );
    }

    #[test]
    fn test_bool_payloads() {
        let json = serde_json::to_value(ServerEvent::AdminAuth(false)).unwrap();
        assert_eq!(json, json!({ "event": "admin-auth", "data": false }));
    }

    #[test]
    fn test_admin_login_debug_redacts_password() {
        let login = AdminLogin {
            username: "root".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{login:?}").contains("hunter2"));
    }
}
