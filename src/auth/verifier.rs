use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::auth::jwt::JwtVerifier;
use crate::auth::tokeninfo::TokenInfoVerifier;
use crate::config::{BroadcasterAuthConfig, VerifierKind};

/// Errors from the external identity check. Every one of them is reported to
/// the client as a plain authentication failure.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("empty credential")]
    EmptyCredential,

    #[error("identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("identity provider rejected the token (status {0})")]
    Rejected(u16),

    #[error("token audience does not match")]
    AudienceMismatch,

    #[error("token email is not verified")]
    UnverifiedEmail,

    #[error("token carries no usable identity")]
    MissingIdentity,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

/// Verifies an opaque identity token and returns the verified principal
/// (email when present, otherwise the subject).
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<String, VerifyError>;
}

/// Build the verifier selected in config.
pub fn build_verifier(
    config: &BroadcasterAuthConfig,
) -> Result<Arc<dyn IdentityVerifier>, VerifyError> {
    let verifier: Arc<dyn IdentityVerifier> = match config.verifier {
        VerifierKind::Tokeninfo => Arc::new(TokenInfoVerifier::new(
            &config.tokeninfo_url,
            config.audience.clone(),
            Duration::from_secs(config.timeout_secs),
        )?),
        VerifierKind::Jwt => Arc::new(JwtVerifier::new(
            config.jwt_secret.as_bytes().to_vec(),
            config.audience.clone(),
        )),
    };
    Ok(verifier)
}
