use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::verifier::{IdentityVerifier, VerifyError};

/// Claims carried by a broadcaster identity token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Stable subject identifier
    pub sub: String,
    /// Email address, preferred over `sub` as the principal when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Intended audience
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Verifies HS256 identity tokens signed with a shared secret.
pub struct JwtVerifier {
    secret: Vec<u8>,
    audience: Option<String>,
}

impl JwtVerifier {
    pub fn new(secret: Vec<u8>, audience: Option<String>) -> Self {
        Self { secret, audience }
    }

    /// Validate a token and return its claims.
    pub fn validate(&self, token: &str) -> Result<IdentityClaims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        match &self.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        let token_data = decode::<IdentityClaims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &validation,
        )?;
        Ok(token_data.claims)
    }
}

#[async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, credential: &str) -> Result<String, VerifyError> {
        if credential.is_empty() {
            return Err(VerifyError::EmptyCredential);
        }
        let claims = self.validate(credential)?;
        Ok(claims.email.unwrap_or(claims.sub))
    }
}

/// Issue an identity token accepted by [`JwtVerifier`].
/// Used by operators to mint broadcaster credentials, and by tests.
pub fn issue_identity_token(
    secret: &[u8],
    subject: &str,
    email: Option<&str>,
    audience: Option<&str>,
    ttl_secs: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = IdentityClaims {
        sub: subject.to_string(),
        email: email.map(str::to_string),
        aud: audience.map(str::to_string),
        iat: now,
        exp: now + ttl_secs,
    };

    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(secret),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    #[tokio::test]
    async fn test_email_preferred_over_subject() {
        let verifier = JwtVerifier::new(SECRET.to_vec(), None);
        let token =
            issue_identity_token(SECRET, "user-1", Some("host@example.com"), None, 300).unwrap();
        assert_eq!(verifier.verify(&token).await.unwrap(), "host@example.com");

        let token = issue_identity_token(SECRET, "user-1", None, None, 300).unwrap();
        assert_eq!(verifier.verify(&token).await.unwrap(), "user-1");
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let verifier = JwtVerifier::new(b"other-secret".to_vec(), None);
        let token = issue_identity_token(SECRET, "user-1", None, None, 300).unwrap();
        assert!(matches!(
            verifier.verify(&token).await,
            Err(VerifyError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_audience_enforced() {
        let verifier = JwtVerifier::new(SECRET.to_vec(), Some("livecast".to_string()));

        let good = issue_identity_token(SECRET, "u", None, Some("livecast"), 300).unwrap();
        assert!(verifier.verify(&good).await.is_ok());

        let bad = issue_identity_token(SECRET, "u", None, Some("elsewhere"), 300).unwrap();
        assert!(verifier.verify(&bad).await.is_err());
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let verifier = JwtVerifier::new(SECRET.to_vec(), None);
        // Well past the default 60s leeway.
        let token = issue_identity_token(SECRET, "u", None, None, -3600).unwrap();
        assert!(verifier.verify(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_credential() {
        let verifier = JwtVerifier::new(SECRET.to_vec(), None);
        assert!(matches!(
            verifier.verify("").await,
            Err(VerifyError::EmptyCredential)
        ));
    }
}
