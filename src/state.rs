use std::sync::Arc;

use crate::auth::admin::AdminCredentials;
use crate::auth::gate::BroadcasterGate;
use crate::auth::verifier::{build_verifier, VerifyError};
use crate::config::Config;
use crate::hub::Hub;
use crate::stream::turn::IceSettings;
use crate::ws::protocol::RetryHints;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Connection registry and broadcast slot, guarded by one lock
    pub hub: Arc<Hub>,
    /// Broadcaster credential verification and allow-list
    pub broadcaster_gate: Arc<BroadcasterGate>,
    /// Static admin credential table
    pub admin_credentials: Arc<AdminCredentials>,
    /// STUN/TURN settings used to build `iceServers` for each welcome
    pub ice: Arc<IceSettings>,
    /// Reconnection timing advertised to viewers
    pub retry: RetryHints,
}

impl AppState {
    pub fn new(
        hub: Hub,
        broadcaster_gate: BroadcasterGate,
        admin_credentials: AdminCredentials,
        ice: IceSettings,
        retry: RetryHints,
    ) -> Self {
        Self {
            hub: Arc::new(hub),
            broadcaster_gate: Arc::new(broadcaster_gate),
            admin_credentials: Arc::new(admin_credentials),
            ice: Arc::new(ice),
            retry,
        }
    }

    /// Build the state for a resolved config. Fails only if the identity
    /// verifier cannot be constructed.
    pub fn from_config(config: &Config) -> Result<Self, VerifyError> {
        let verifier = build_verifier(&config.broadcaster)?;
        Ok(Self::new(
            Hub::new(config.require_broadcaster_auth),
            BroadcasterGate::new(verifier, config.broadcaster.allowed_identities.clone()),
            AdminCredentials::new(config.admins.clone()),
            IceSettings::new(&config.ice, config.turn.clone()),
            RetryHints::from(&config.viewer),
        ))
    }
}
