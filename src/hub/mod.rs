//! Shared coordination state: the connection registry and the broadcast slot.
//!
//! Both live behind a single mutex so that registry inserts/removals, slot
//! transitions and presence pushes are atomic with respect to each other.
//! Outbound channels are unbounded, so fan-out happens with the lock held and
//! every party observes mutations in the order they were applied.

pub mod error;
pub mod presence;
pub mod registry;
pub mod router;
pub mod slot;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

pub use error::HubError;
pub use presence::PresenceSnapshot;
pub use registry::{Party, PartyId, PartyView, Registry, Role};
pub use router::{ArtifactKind, WatchOutcome};
pub use slot::{BroadcastSlot, Claim, ReleaseReason};

use crate::ws::protocol::{PartyNotice, ServerEvent, UserList};
use crate::ws::ConnectionSender;

struct HubInner {
    registry: Registry,
    slot: BroadcastSlot,
}

/// Owned coordination state shared by every connection actor.
pub struct Hub {
    inner: Mutex<HubInner>,
    require_broadcaster_auth: bool,
    /// Artifacts addressed to parties that were already gone.
    dropped_artifacts: AtomicU64,
}

impl Hub {
    pub fn new(require_broadcaster_auth: bool) -> Self {
        Self {
            inner: Mutex::new(HubInner {
                registry: Registry::new(),
                slot: BroadcastSlot::Empty,
            }),
            require_broadcaster_auth,
            dropped_artifacts: AtomicU64::new(0),
        }
    }

    pub fn requires_broadcaster_auth(&self) -> bool {
        self.require_broadcaster_auth
    }

    // No critical section can leave the state half-updated, so a poisoned
    // lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Connection registry ---

    /// Register a new connection and push presence to everyone.
    pub fn connect(&self, id: PartyId, tx: ConnectionSender) -> PresenceSnapshot {
        let mut inner = self.lock();
        inner.registry.insert(id.clone(), tx);
        let snapshot = presence::push_presence(&inner.registry, &inner.slot);
        tracing::debug!(
            party_id = %id,
            total = snapshot.total,
            "Party connected"
        );
        snapshot
    }

    /// Remove a connection. If it held the slot, the slot is released and
    /// `broadcaster-disconnected` goes out before the presence push.
    pub fn disconnect(&self, id: &PartyId) -> Option<Party> {
        let mut inner = self.lock();
        let inner = &mut *inner;
        let party = inner.registry.remove(id)?;

        if inner.slot.is_held_by(id) {
            // Cannot fail: the holder was just checked.
            let _ = inner.slot.release(id);
            inner
                .registry
                .broadcast_to_all(&ReleaseReason::Disconnected.notice());
            tracing::info!(party_id = %id, "Broadcaster disconnected, slot released");
        } else if let Some(holder) = inner.slot.holder() {
            inner.registry.send_to(
                holder,
                ServerEvent::UserDisconnected(PartyNotice { id: id.clone() }),
            );
        }

        let snapshot = presence::push_presence(&inner.registry, &inner.slot);
        tracing::debug!(
            party_id = %id,
            total = snapshot.total,
            "Party disconnected"
        );
        Some(party)
    }

    pub fn party(&self, id: &PartyId) -> Option<Party> {
        self.lock().registry.get(id).cloned()
    }

    pub fn parties(&self) -> Vec<Party> {
        self.lock().registry.all().into_values().collect()
    }

    pub fn slot_holder(&self) -> Option<PartyId> {
        self.lock().slot.holder().cloned()
    }

    pub fn presence(&self) -> PresenceSnapshot {
        let inner = self.lock();
        PresenceSnapshot::compute(&inner.registry, &inner.slot)
    }

    pub fn dropped_artifacts(&self) -> u64 {
        self.dropped_artifacts.load(Ordering::Relaxed)
    }

    // --- Authentication results ---

    /// Apply the outcome of a broadcaster identity check performed outside
    /// the lock. The latest verification is authoritative: a failed re-login
    /// clears the flag, though it does not pre-empt an active broadcast.
    pub fn set_broadcaster_identity(
        &self,
        id: &PartyId,
        principal: Option<String>,
    ) -> Result<(), HubError> {
        let mut inner = self.lock();
        let party = inner
            .registry
            .get_mut(id)
            .ok_or_else(|| HubError::UnknownParty(id.clone()))?;
        party.authenticated = principal.is_some();
        party.principal = principal;
        Ok(())
    }

    /// Make a party an admin and return the one-time registry snapshot.
    ///
    /// Admin rights do not count as broadcaster authentication; an admin
    /// still needs a broadcaster login to claim the slot.
    pub fn promote_admin(&self, id: &PartyId) -> Result<UserList, HubError> {
        let mut inner = self.lock();
        let inner = &mut *inner;
        if inner.slot.is_held_by(id) {
            return Err(HubError::BroadcasterCannotAdmin);
        }
        let party = inner
            .registry
            .get_mut(id)
            .ok_or_else(|| HubError::UnknownParty(id.clone()))?;
        party.admin = true;
        party.role = Role::Admin;

        Ok(user_list(&inner.registry, &inner.slot))
    }

    /// Current registry snapshot as shown to admins.
    pub fn user_list(&self) -> UserList {
        let inner = self.lock();
        user_list(&inner.registry, &inner.slot)
    }

    // --- Broadcast slot ---

    /// Claim the broadcast slot. On acquisition every other party receives
    /// `broadcaster-available`, followed by the presence push.
    pub fn claim(&self, id: &PartyId) -> Result<Claim, HubError> {
        let mut inner = self.lock();
        let inner = &mut *inner;
        let party = inner
            .registry
            .get(id)
            .ok_or_else(|| HubError::UnknownParty(id.clone()))?;

        let claim = inner.slot.claim(party, self.require_broadcaster_auth)?;
        if claim == Claim::Acquired {
            if let Some(party) = inner.registry.get_mut(id) {
                party.role = Role::Broadcaster;
            }
            inner
                .registry
                .broadcast_except(id, &ServerEvent::BroadcasterAvailable);
            presence::push_presence(&inner.registry, &inner.slot);
            tracing::info!(party_id = %id, "Broadcast slot claimed");
        }
        Ok(claim)
    }

    /// Voluntary release by the holder.
    pub fn stop_broadcasting(&self, id: &PartyId) -> Result<(), HubError> {
        let mut inner = self.lock();
        release(&mut inner, id, ReleaseReason::Stopped)
    }

    /// Admin override: end the broadcast held by `target`.
    ///
    /// The target gets a direct `force-stop` so its own controls deactivate;
    /// everyone else gets `broadcaster-terminated`.
    pub fn force_stop(&self, admin: &PartyId, target: &PartyId) -> Result<(), HubError> {
        let mut inner = self.lock();
        let is_admin = inner
            .registry
            .get(admin)
            .map(Party::is_admin)
            .ok_or_else(|| HubError::UnknownParty(admin.clone()))?;
        if !is_admin {
            return Err(HubError::NotAdmin(admin.clone()));
        }
        if !inner.slot.is_held_by(target) {
            return Err(HubError::NotSlotHolder(target.clone()));
        }

        inner.registry.send_to(target, ServerEvent::ForceStop);
        release(&mut inner, target, ReleaseReason::ForceStopped)?;
        tracing::info!(admin_id = %admin, party_id = %target, "Broadcast force-stopped");
        Ok(())
    }

    // --- Routing ---

    /// Forward a viewer's `watcher` request to the holder.
    pub fn watch(&self, viewer: &PartyId) -> Result<WatchOutcome, HubError> {
        let inner = self.lock();
        router::forward_watcher(&inner.registry, &inner.slot, viewer)
    }

    /// Relay a handshake artifact. An unknown target is counted and returned
    /// so the caller can log it; nothing is surfaced to the sender.
    pub fn route(
        &self,
        kind: ArtifactKind,
        sender: &PartyId,
        target: &PartyId,
        payload: Value,
    ) -> Result<(), HubError> {
        let inner = self.lock();
        let result = router::route(&inner.registry, kind, sender, target, payload);
        if matches!(result, Err(HubError::UnknownTarget(_))) {
            self.dropped_artifacts.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}

fn release(inner: &mut HubInner, id: &PartyId, reason: ReleaseReason) -> Result<(), HubError> {
    inner.slot.release(id)?;
    if let Some(party) = inner.registry.get_mut(id) {
        party.role = party.resting_role();
    }
    inner.registry.broadcast_except(id, &reason.notice());
    presence::push_presence(&inner.registry, &inner.slot);
    tracing::info!(party_id = %id, reason = reason.as_str(), "Broadcast slot released");
    Ok(())
}

fn user_list(registry: &Registry, slot: &BroadcastSlot) -> UserList {
    UserList {
        parties: registry
            .all()
            .into_iter()
            .map(|(id, party)| (id, party.view()))
            .collect(),
        slot_holder_id: slot.holder().cloned(),
    }
}
