//! Targeted relay of handshake artifacts.
//!
//! Payloads are opaque: they are forwarded as-is and never parsed. The sender
//! id always comes from the connection the artifact arrived on.

use serde_json::Value;

use super::error::HubError;
use super::registry::{PartyId, Registry};
use super::slot::BroadcastSlot;
use crate::ws::protocol::{RoutedArtifact, ServerEvent, WatcherNotice};

/// The three artifact kinds. They are routed identically save for the label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Offer,
    Answer,
    IceCandidate,
}

impl ArtifactKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice-candidate",
        }
    }

    /// Wrap a payload in the outbound event for this kind, stamped with `sender`.
    pub fn into_event(self, payload: Value, sender: PartyId) -> ServerEvent {
        let artifact = RoutedArtifact { payload, sender };
        match self {
            Self::Offer => ServerEvent::Offer(artifact),
            Self::Answer => ServerEvent::Answer(artifact),
            Self::IceCandidate => ServerEvent::IceCandidate(artifact),
        }
    }
}

/// Result of forwarding a `watcher` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The holder was told about the viewer.
    Forwarded(PartyId),
    /// The slot is empty; the viewer should be told so.
    NoBroadcaster,
    /// The viewer is the holder itself; nothing to do.
    OwnBroadcast,
}

/// Relay one artifact from `sender` to `target`.
pub fn route(
    registry: &Registry,
    kind: ArtifactKind,
    sender: &PartyId,
    target: &PartyId,
    payload: Value,
) -> Result<(), HubError> {
    if !registry.contains(sender) {
        return Err(HubError::UnknownParty(sender.clone()));
    }
    if !registry.send_to(target, kind.into_event(payload, sender.clone())) {
        return Err(HubError::UnknownTarget(target.clone()));
    }
    Ok(())
}

/// Forward a zero-payload `watcher` request to the slot holder, if any.
pub fn forward_watcher(
    registry: &Registry,
    slot: &BroadcastSlot,
    viewer: &PartyId,
) -> Result<WatchOutcome, HubError> {
    if !registry.contains(viewer) {
        return Err(HubError::UnknownParty(viewer.clone()));
    }

    match slot.holder() {
        None => Ok(WatchOutcome::NoBroadcaster),
        Some(holder) if holder == viewer => Ok(WatchOutcome::OwnBroadcast),
        Some(holder) => {
            let notice = ServerEvent::Watcher(WatcherNotice {
                sender: viewer.clone(),
            });
            registry.send_to(holder, notice);
            Ok(WatchOutcome::Forwarded(holder.clone()))
        }
    }
}
