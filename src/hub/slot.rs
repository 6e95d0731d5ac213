use super::error::HubError;
use super::registry::{Party, PartyId};
use crate::ws::protocol::ServerEvent;

/// Single-ownership token for "who is currently broadcasting".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BroadcastSlot {
    #[default]
    Empty,
    Held(PartyId),
}

/// Successful claim outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The slot was empty and now belongs to the claimant.
    Acquired,
    /// The claimant already held the slot; nothing changed.
    AlreadyHolder,
}

/// Why the slot was released. Each reason maps to its own notice so viewers
/// can tell a voluntary stop from a dropped connection or an admin override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    Stopped,
    Disconnected,
    ForceStopped,
}

impl ReleaseReason {
    /// Notice fanned out to the remaining parties.
    pub fn notice(self) -> ServerEvent {
        match self {
            Self::Stopped => ServerEvent::BroadcasterStopped,
            Self::Disconnected => ServerEvent::BroadcasterDisconnected,
            Self::ForceStopped => ServerEvent::BroadcasterTerminated,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Disconnected => "disconnected",
            Self::ForceStopped => "force-stopped",
        }
    }
}

impl BroadcastSlot {
    pub fn holder(&self) -> Option<&PartyId> {
        match self {
            Self::Empty => None,
            Self::Held(id) => Some(id),
        }
    }

    pub fn is_held(&self) -> bool {
        matches!(self, Self::Held(_))
    }

    pub fn is_held_by(&self, id: &PartyId) -> bool {
        self.holder() == Some(id)
    }

    /// Try to take the slot for `party`.
    ///
    /// When `require_auth` is set, an unauthenticated claimant is refused with
    /// `AuthenticationRequired` before the slot is even looked at, so the client
    /// always learns it must log in first. A slot held by someone else is never
    /// pre-empted.
    pub fn claim(&mut self, party: &Party, require_auth: bool) -> Result<Claim, HubError> {
        if require_auth && !party.authenticated {
            return Err(HubError::AuthenticationRequired);
        }

        match self {
            Self::Held(holder) if *holder == party.id => Ok(Claim::AlreadyHolder),
            Self::Held(_) => Err(HubError::SlotUnavailable),
            Self::Empty => {
                *self = Self::Held(party.id.clone());
                Ok(Claim::Acquired)
            }
        }
    }

    /// Release the slot. Only the current holder may release it.
    pub fn release(&mut self, id: &PartyId) -> Result<(), HubError> {
        if !self.is_held_by(id) {
            return Err(HubError::NotSlotHolder(id.clone()));
        }
        *self = Self::Empty;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn party(id: &str, authenticated: bool) -> Party {
        let mut party = Party::new(PartyId::from(id));
        party.authenticated = authenticated;
        party
    }

    #[test]
    fn test_claim_empty_slot() {
        let mut slot = BroadcastSlot::Empty;
        let a = party("a", true);

        assert_eq!(slot.claim(&a, true), Ok(Claim::Acquired));
        assert!(slot.is_held_by(&a.id));
    }

    #[test]
    fn test_claim_requires_authentication() {
        let mut slot = BroadcastSlot::Empty;
        let a = party("a", false);

        assert_eq!(slot.claim(&a, true), Err(HubError::AuthenticationRequired));
        assert_eq!(slot, BroadcastSlot::Empty);

        // Auth not required: the same party may claim.
        assert_eq!(slot.claim(&a, false), Ok(Claim::Acquired));
    }

    #[test]
    fn test_second_claimant_is_rejected() {
        let mut slot = BroadcastSlot::Empty;
        let a = party("a", true);
        let b = party("b", true);

        slot.claim(&a, true).unwrap();
        assert_eq!(slot.claim(&b, true), Err(HubError::SlotUnavailable));
        assert!(slot.is_held_by(&a.id));
    }

    #[test]
    fn test_holder_reclaim_is_idempotent() {
        let mut slot = BroadcastSlot::Empty;
        let a = party("a", true);

        slot.claim(&a, true).unwrap();
        assert_eq!(slot.claim(&a, true), Ok(Claim::AlreadyHolder));
        assert!(slot.is_held_by(&a.id));
    }

    #[test]
    fn test_only_holder_can_release() {
        let mut slot = BroadcastSlot::Empty;
        let a = party("a", true);
        let b = party("b", true);

        assert_eq!(
            slot.release(&a.id),
            Err(HubError::NotSlotHolder(a.id.clone()))
        );

        slot.claim(&a, true).unwrap();
        assert_eq!(
            slot.release(&b.id),
            Err(HubError::NotSlotHolder(b.id.clone()))
        );
        assert_eq!(slot.release(&a.id), Ok(()));
        assert_eq!(slot.holder(), None);
    }

    #[test]
    fn test_release_reasons_map_to_distinct_notices() {
        assert_eq!(ReleaseReason::Stopped.notice(), ServerEvent::BroadcasterStopped);
        assert_eq!(
            ReleaseReason::Disconnected.notice(),
            ServerEvent::BroadcasterDisconnected
        );
        assert_eq!(
            ReleaseReason::ForceStopped.notice(),
            ServerEvent::BroadcasterTerminated
        );
    }
}
