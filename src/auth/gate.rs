use std::collections::HashSet;
use std::sync::Arc;

use crate::auth::verifier::{IdentityVerifier, VerifyError};
use crate::hub::PartyId;
use crate::state::AppState;
use crate::ws::protocol::{BroadcasterLogin, ServerEvent};
use crate::ws::{send_event, ConnectionSender};

/// Why a broadcaster login was refused.
#[derive(Debug, thiserror::Error)]
pub enum AuthFailure {
    #[error("identity verification failed: {0}")]
    Verification(#[from] VerifyError),

    #[error("identity {0} is not on the broadcaster allow-list")]
    NotAllowed(String),
}

/// Broadcaster credential path: external verification, then allow-list.
pub struct BroadcasterGate {
    verifier: Arc<dyn IdentityVerifier>,
    /// Lowercased identities allowed to broadcast. Empty allows nobody.
    allowed: HashSet<String>,
}

impl BroadcasterGate {
    pub fn new<I>(verifier: Arc<dyn IdentityVerifier>, allowed: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let allowed = allowed
            .into_iter()
            .map(|id| id.trim().to_lowercase())
            .filter(|id| !id.is_empty())
            .collect();
        Self { verifier, allowed }
    }

    pub fn allow_list_len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_allowed(&self, principal: &str) -> bool {
        self.allowed.contains(&principal.trim().to_lowercase())
    }

    /// Verify a credential and check the resulting principal.
    /// Must be called without holding the hub lock: it may wait on the network.
    pub async fn authenticate(&self, credential: &str) -> Result<String, AuthFailure> {
        let principal = self.verifier.verify(credential).await?;
        if !self.is_allowed(&principal) {
            return Err(AuthFailure::NotAllowed(principal));
        }
        Ok(principal)
    }
}

/// Handle `broadcaster-login`: verify outside the hub lock, then apply the
/// result atomically. The client always gets an explicit `broadcaster-auth`.
pub async fn handle_broadcaster_login(
    req: BroadcasterLogin,
    tx: &ConnectionSender,
    state: &AppState,
    party_id: &PartyId,
) {
    let principal = match state.broadcaster_gate.authenticate(&req.credential).await {
        Ok(principal) => {
            tracing::info!(
                party_id = %party_id,
                principal = %principal,
                "Broadcaster authenticated"
            );
            Some(principal)
        }
        Err(e) => {
            tracing::warn!(party_id = %party_id, error = %e, "Broadcaster login rejected");
            None
        }
    };

    let accepted = principal.is_some();
    match state.hub.set_broadcaster_identity(party_id, principal) {
        Ok(()) => send_event(tx, ServerEvent::BroadcasterAuth(accepted)),
        Err(e) => {
            // The party disconnected while its token was being verified.
            tracing::debug!(party_id = %party_id, error = %e, "Login result discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedVerifier(Option<&'static str>);

    #[async_trait]
    impl IdentityVerifier for FixedVerifier {
        async fn verify(&self, _credential: &str) -> Result<String, VerifyError> {
            self.0.map(str::to_string).ok_or(VerifyError::MissingIdentity)
        }
    }

    fn gate(principal: Option<&'static str>, allowed: &[&str]) -> BroadcasterGate {
        BroadcasterGate::new(
            Arc::new(FixedVerifier(principal)),
            allowed.iter().map(|s| s.to_string()),
        )
    }

    #[tokio::test]
    async fn test_allowed_principal_accepted() {
        let gate = gate(Some("Host@Example.com"), &["host@example.com"]);
        assert_eq!(gate.authenticate("token").await.unwrap(), "Host@Example.com");
    }

    #[tokio::test]
    async fn test_verified_but_not_allowed() {
        let gate = gate(Some("stranger@example.com"), &["host@example.com"]);
        assert!(matches!(
            gate.authenticate("token").await,
            Err(AuthFailure::NotAllowed(_))
        ));
    }

    #[tokio::test]
    async fn test_verifier_failure_is_auth_failure() {
        let gate = gate(None, &["host@example.com"]);
        assert!(matches!(
            gate.authenticate("token").await,
            Err(AuthFailure::Verification(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_allow_list_rejects_everyone() {
        let gate = gate(Some("host@example.com"), &[]);
        assert_eq!(gate.allow_list_len(), 0);
        assert!(gate.authenticate("token").await.is_err());
    }
}
