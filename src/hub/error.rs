use super::registry::PartyId;

/// Failures of hub operations. None of these are fatal: handlers turn them
/// into reply events or log them and carry on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("party {0} is not connected")]
    UnknownParty(PartyId),

    #[error("target {0} is not connected")]
    UnknownTarget(PartyId),

    #[error("broadcaster authentication required")]
    AuthenticationRequired,

    #[error("broadcast slot is held by another party")]
    SlotUnavailable,

    #[error("party {0} does not hold the broadcast slot")]
    NotSlotHolder(PartyId),

    #[error("party {0} is not an administrator")]
    NotAdmin(PartyId),

    #[error("the active broadcaster cannot take the admin role")]
    BroadcasterCannotAdmin,
}
