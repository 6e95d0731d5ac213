//! Aggregate presence counts pushed to every party.
//!
//! Derived from the registry and slot on demand, never stored.

use serde::{Deserialize, Serialize};

use super::registry::Registry;
use super::slot::BroadcastSlot;
use crate::ws::protocol::ServerEvent;

/// Payload of `update-users`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    pub total: usize,
    /// 1 while the broadcast slot is held, 0 otherwise.
    pub active_streams: u8,
}

impl PresenceSnapshot {
    pub fn compute(registry: &Registry, slot: &BroadcastSlot) -> Self {
        Self {
            total: registry.len(),
            active_streams: u8::from(slot.is_held()),
        }
    }
}

/// Recompute presence and push it to everyone. Called with the hub lock held,
/// after the mutation it reports on.
pub fn push_presence(registry: &Registry, slot: &BroadcastSlot) -> PresenceSnapshot {
    let snapshot = PresenceSnapshot::compute(registry, slot);
    registry.broadcast_to_all(&ServerEvent::UpdateUsers(snapshot));
    snapshot
}
