use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::verifier::{IdentityVerifier, VerifyError};

/// Response of an OpenID token-info endpoint (Google's `tokeninfo` shape).
#[derive(Debug, Deserialize)]
struct TokenInfo {
    #[serde(default)]
    aud: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    email: Option<String>,
    /// Reported as either a JSON bool or the string "true"/"false".
    #[serde(default)]
    email_verified: Option<Value>,
}

impl TokenInfo {
    fn email_verified(&self) -> Option<bool> {
        match self.email_verified.as_ref()? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => Some(s.eq_ignore_ascii_case("true")),
            _ => None,
        }
    }

    /// Resolve the principal, enforcing the audience when one is configured.
    fn principal(self, audience: Option<&str>) -> Result<String, VerifyError> {
        if let Some(expected) = audience {
            if self.aud.as_deref() != Some(expected) {
                return Err(VerifyError::AudienceMismatch);
            }
        }

        if self.email.is_some() && self.email_verified() == Some(false) {
            return Err(VerifyError::UnverifiedEmail);
        }

        self.email
            .or(self.sub)
            .filter(|id| !id.is_empty())
            .ok_or(VerifyError::MissingIdentity)
    }
}

/// Delegates token verification to a remote token-info endpoint.
pub struct TokenInfoVerifier {
    client: reqwest::Client,
    endpoint: String,
    audience: Option<String>,
}

impl TokenInfoVerifier {
    pub fn new(
        endpoint: &str,
        audience: Option<String>,
        timeout: Duration,
    ) -> Result<Self, VerifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            audience,
        })
    }
}

#[async_trait]
impl IdentityVerifier for TokenInfoVerifier {
    async fn verify(&self, credential: &str) -> Result<String, VerifyError> {
        if credential.is_empty() {
            return Err(VerifyError::EmptyCredential);
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("id_token", credential)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VerifyError::Rejected(status.as_u16()));
        }

        let info: TokenInfo = response.json().await?;
        info.principal(self.audience.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info(value: Value) -> TokenInfo {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_principal_prefers_verified_email() {
        let parsed = info(json!({
            "aud": "client-id",
            "sub": "1234",
            "email": "host@example.com",
            "email_verified": "true"
        }));
        assert_eq!(parsed.principal(Some("client-id")).unwrap(), "host@example.com");
    }

    #[test]
    fn test_audience_mismatch() {
        let parsed = info(json!({ "aud": "other", "sub": "1234" }));
        assert!(matches!(
            parsed.principal(Some("client-id")),
            Err(VerifyError::AudienceMismatch)
        ));
    }

    #[test]
    fn test_unverified_email_rejected() {
        let parsed = info(json!({ "sub": "1", "email": "x@example.com", "email_verified": false }));
        assert!(matches!(parsed.principal(None), Err(VerifyError::UnverifiedEmail)));
    }

    #[test]
    fn test_subject_fallback_and_missing_identity() {
        assert_eq!(info(json!({ "sub": "42" })).principal(None).unwrap(), "42");
        assert!(matches!(
            info(json!({})).principal(None),
            Err(VerifyError::MissingIdentity)
        ));
    }
}
