use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;

use crate::config::{IceConfig, TurnConfig};
use crate::hub::PartyId;

type HmacSha1 = Hmac<Sha1>;

/// One entry of the `iceServers` list handed to clients in `welcome`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub credential: String,
}

/// ICE settings resolved from config at startup.
#[derive(Debug, Clone, Default)]
pub struct IceSettings {
    pub stun_urls: Vec<String>,
    pub turn: Option<TurnConfig>,
}

impl IceSettings {
    pub fn new(ice: &IceConfig, turn: Option<TurnConfig>) -> Self {
        Self {
            stun_urls: ice.stun_urls.clone(),
            turn,
        }
    }
}

/// Generate time-limited TURN credentials using HMAC-SHA1 shared secret mechanism.
///
/// This is the standard coturn time-limited credential mechanism:
/// - username = "{expiry_timestamp}:{party_id}"
/// - credential = base64(HMAC-SHA1(shared_secret, username))
///
/// The TURN server independently computes the same HMAC to verify credentials.
pub fn generate_turn_credentials(
    username: &str,
    shared_secret: &str,
    ttl_secs: u64,
) -> (String, String) {
    let timestamp = chrono::Utc::now().timestamp() as u64 + ttl_secs;
    let turn_username = format!("{}:{}", timestamp, username);
    let credential = sign_turn_username(&turn_username, shared_secret);
    (turn_username, credential)
}

fn sign_turn_username(turn_username: &str, shared_secret: &str) -> String {
    let mut mac =
        HmacSha1::new_from_slice(shared_secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(turn_username.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Build the list of ICE servers (STUN + TURN) for a `welcome` event.
///
/// Always includes the configured STUN servers.
/// If TURN is configured and enabled, includes TURN servers with time-limited credentials.
pub fn get_ice_servers(settings: &IceSettings, party_id: &PartyId) -> Vec<IceServer> {
    let mut servers = Vec::new();

    if !settings.stun_urls.is_empty() {
        servers.push(IceServer {
            urls: settings.stun_urls.clone(),
            username: String::new(),
            credential: String::new(),
        });
    }

    if let Some(cfg) = &settings.turn {
        if cfg.enabled && !cfg.shared_secret.is_empty() {
            let (turn_username, credential) = generate_turn_credentials(
                party_id.as_str(),
                &cfg.shared_secret,
                cfg.credential_ttl_secs,
            );

            servers.push(IceServer {
                urls: vec![
                    format!("turn:{}:{}?transport=udp", cfg.host, cfg.port),
                    format!("turn:{}:{}?transport=tcp", cfg.host, cfg.port),
                ],
                username: turn_username,
                credential,
            });
        }
    }

    servers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn_config(enabled: bool, secret: &str) -> TurnConfig {
        TurnConfig {
            enabled,
            host: "turn.example.com".to_string(),
            port: 3478,
            shared_secret: secret.to_string(),
            credential_ttl_secs: 600,
        }
    }

    #[test]
    fn test_stun_only_by_default() {
        let settings = IceSettings::new(&IceConfig::default(), None);
        let servers = get_ice_servers(&settings, &PartyId::from("p"));
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].urls, vec!["stun:stun.l.google.com:19302".to_string()]);
        assert!(servers[0].username.is_empty());
    }

    #[test]
    fn test_turn_credentials_included_when_enabled() {
        let settings = IceSettings::new(&IceConfig::default(), Some(turn_config(true, "s3cret")));
        let servers = get_ice_servers(&settings, &PartyId::from("party-1"));
        assert_eq!(servers.len(), 2);

        let turn = &servers[1];
        assert!(turn.username.ends_with(":party-1"));
        assert_eq!(turn.credential, sign_turn_username(&turn.username, "s3cret"));
        assert_eq!(turn.urls[0], "turn:turn.example.com:3478?transport=udp");
    }

    #[test]
    fn test_turn_skipped_without_secret_or_when_disabled() {
        for cfg in [turn_config(true, ""), turn_config(false, "s3cret")] {
            let settings = IceSettings::new(&IceConfig::default(), Some(cfg));
            assert_eq!(get_ice_servers(&settings, &PartyId::from("p")).len(), 1);
        }
    }

    #[test]
    fn test_credential_expiry_in_future() {
        let (username, _) = generate_turn_credentials("p", "secret", 600);
        let expiry: i64 = username.split(':').next().unwrap().parse().unwrap();
        assert!(expiry > chrono::Utc::now().timestamp());
    }
}
