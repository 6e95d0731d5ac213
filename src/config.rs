use std::collections::HashMap;

use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Command-line flags. Only flags actually given (or set through their env
/// var) override the config file; absent ones are skipped when merging.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "livecast-server", version, about = "livecast signaling server")]
pub struct Cli {
    /// Port to listen on
    #[arg(long, env = "LIVECAST_PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long, env = "LIVECAST_BIND_ADDRESS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./livecast.toml")]
    #[serde(skip)]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "LIVECAST_JSON_LOGS")]
    #[serde(skip_serializing_if = "is_false")]
    pub json_logs: bool,

    /// Require a successful broadcaster-login before claiming the broadcast slot
    #[arg(long, env = "LIVECAST_REQUIRE_BROADCASTER_AUTH")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_broadcaster_auth: Option<bool>,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip)]
    pub generate_config: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    #[serde(default)]
    pub json_logs: bool,
    /// Whether claiming the broadcast slot requires a prior broadcaster-login
    pub require_broadcaster_auth: bool,

    /// Broadcaster identity verification ([broadcaster] section)
    #[serde(default)]
    pub broadcaster: BroadcasterAuthConfig,

    /// Static admin credentials ([admins] section, username = "password")
    #[serde(default)]
    pub admins: HashMap<String, String>,

    /// Timing hints handed to viewers ([viewer] section)
    #[serde(default)]
    pub viewer: ViewerConfig,

    /// STUN servers advertised to clients ([ice] section)
    #[serde(default)]
    pub ice: IceConfig,

    /// TURN relay configuration ([turn] section)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn: Option<TurnConfig>,

    #[serde(skip)]
    pub generate_config: bool,
}

/// Which external verifier checks broadcaster identity tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifierKind {
    /// OpenID token-info endpoint (Google ID tokens by default)
    #[default]
    Tokeninfo,
    /// HS256 tokens signed with `jwt_secret`
    Jwt,
}

/// Configuration for the broadcaster authentication path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcasterAuthConfig {
    /// Identities (emails or subjects) allowed to broadcast. Empty allows nobody.
    #[serde(default)]
    pub allowed_identities: Vec<String>,

    #[serde(default)]
    pub verifier: VerifierKind,

    /// Token-info endpoint queried with `?id_token=<credential>`
    #[serde(default = "default_tokeninfo_url")]
    pub tokeninfo_url: String,

    /// Expected token audience (OAuth client id). Unchecked when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,

    /// Shared secret for the `jwt` verifier
    #[serde(default)]
    pub jwt_secret: String,

    /// Timeout for the verification request in seconds (default: 5)
    #[serde(default = "default_verify_timeout")]
    pub timeout_secs: u64,
}

impl Default for BroadcasterAuthConfig {
    fn default() -> Self {
        Self {
            allowed_identities: Vec::new(),
            verifier: VerifierKind::Tokeninfo,
            tokeninfo_url: default_tokeninfo_url(),
            audience: None,
            jwt_secret: String::new(),
            timeout_secs: default_verify_timeout(),
        }
    }
}

fn default_tokeninfo_url() -> String {
    "https://oauth2.googleapis.com/tokeninfo".to_string()
}

fn default_verify_timeout() -> u64 {
    5
}

/// Reconnection timing advertised to viewers in `welcome`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerConfig {
    /// Seconds a viewer waits for a track before retrying (default: 5)
    #[serde(default = "default_negotiation_timeout")]
    pub negotiation_timeout_secs: u64,

    /// Seconds between retry attempts (default: 2)
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            negotiation_timeout_secs: default_negotiation_timeout(),
            retry_interval_secs: default_retry_interval(),
        }
    }
}

fn default_negotiation_timeout() -> u64 {
    5
}

fn default_retry_interval() -> u64 {
    2
}

/// STUN servers handed to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceConfig {
    #[serde(default = "default_stun_urls")]
    pub stun_urls: Vec<String>,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            stun_urls: default_stun_urls(),
        }
    }
}

fn default_stun_urls() -> Vec<String> {
    vec!["stun:stun.l.google.com:19302".to_string()]
}

/// Configuration for the TURN relay server (NAT traversal fallback).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Whether TURN relay is enabled (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// TURN server hostname or IP (default: "127.0.0.1")
    #[serde(default = "default_turn_host")]
    pub host: String,

    /// TURN server port (default: 3478)
    #[serde(default = "default_turn_port")]
    pub port: u16,

    /// Shared secret for generating time-limited TURN credentials
    #[serde(default)]
    pub shared_secret: String,

    /// Credential TTL in seconds (default: 86400 = 24 hours)
    #[serde(default = "default_credential_ttl")]
    pub credential_ttl_secs: u64,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_turn_host(),
            port: default_turn_port(),
            shared_secret: String::new(),
            credential_ttl_secs: default_credential_ttl(),
        }
    }
}

fn default_turn_host() -> String {
    "127.0.0.1".to_string()
}

fn default_turn_port() -> u16 {
    3478
}

fn default_credential_ttl() -> u64 {
    86400
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            require_broadcaster_auth: true,
            broadcaster: BroadcasterAuthConfig::default(),
            admins: HashMap::new(),
            viewer: ViewerConfig::default(),
            ice: IceConfig::default(),
            turn: None,
            generate_config: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Figment(#[from] Box<figment::Error>),

    #[error("broadcaster.jwt_secret must be set when broadcaster.verifier = \"jwt\"")]
    MissingJwtSecret,
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Figment(Box::new(e))
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (LIVECAST_*) < CLI args
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(&Cli::parse())
    }

    /// Resolve config for already-parsed flags.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("LIVECAST_").split("__"))
            .merge(Serialized::defaults(cli))
            .extract()?;
        config.generate_config = cli.generate_config;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcaster.verifier == VerifierKind::Jwt && self.broadcaster.jwt_secret.is_empty()
        {
            return Err(ConfigError::MissingJwtSecret);
        }
        Ok(())
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# livecast Signaling Server Configuration
# Place this file at ./livecast.toml or specify with --config <path>
# All settings can be overridden via environment variables (LIVECAST_PORT,
# LIVECAST_BROADCASTER__AUDIENCE, etc.) or CLI flags (--port, etc.)

# Server port (default: 3000)
# port = 3000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Require a successful broadcaster-login before a party may go live
# require_broadcaster_auth = true

# ---- Broadcaster Authentication ----
# [broadcaster]
# allowed_identities = ["host@example.com"]  # empty allows nobody
# verifier = "tokeninfo"                     # "tokeninfo" or "jwt"
# tokeninfo_url = "https://oauth2.googleapis.com/tokeninfo"
# audience = "your-oauth-client-id.apps.googleusercontent.com"
# jwt_secret = ""                            # required when verifier = "jwt"
# timeout_secs = 5

# ---- Admin Accounts ----
# [admins]
# admin = "change-me"

# ---- Viewer Reconnection ----
# [viewer]
# negotiation_timeout_secs = 5
# retry_interval_secs = 2

# ---- ICE ----
# [ice]
# stun_urls = ["stun:stun.l.google.com:19302"]

# ---- TURN Relay ----
# [turn]
# enabled = false
# host = "127.0.0.1"
# port = 3478
# shared_secret = ""
# credential_ttl_secs = 86400  # 24 hours
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn cli(config_path: &str) -> Cli {
        Cli {
            config: config_path.to_string(),
            ..Cli::default()
        }
    }

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|_jail| {
            let config = Config::from_cli(&cli("missing.toml")).expect("defaults load");
            assert_eq!(config.port, 3000);
            assert!(config.require_broadcaster_auth);
            assert_eq!(config.viewer.negotiation_timeout_secs, 5);
            assert_eq!(config.viewer.retry_interval_secs, 2);
            assert_eq!(config.broadcaster.verifier, VerifierKind::Tokeninfo);
            assert!(config.admins.is_empty());
            Ok(())
        });
    }

    #[test]
    fn test_toml_env_and_cli_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "livecast.toml",
                r#"
                port = 4000
                require_broadcaster_auth = false

                [broadcaster]
                allowed_identities = ["host@example.com"]
                verifier = "jwt"
                jwt_secret = "s3cret"

                [admins]
                admin = "pw"
                "#,
            )?;
            jail.set_env("LIVECAST_BROADCASTER__AUDIENCE", "livecast");

            let config = Config::from_cli(&cli("livecast.toml")).expect("config loads");
            assert_eq!(config.port, 4000);
            assert!(!config.require_broadcaster_auth);
            assert_eq!(config.broadcaster.allowed_identities, vec!["host@example.com"]);
            assert_eq!(config.broadcaster.audience.as_deref(), Some("livecast"));
            assert_eq!(config.admins.get("admin").map(String::as_str), Some("pw"));

            let mut flags = cli("livecast.toml");
            flags.port = Some(5000);
            let config = Config::from_cli(&flags).expect("config loads");
            assert_eq!(config.port, 5000);
            Ok(())
        });
    }

    #[test]
    fn test_jwt_verifier_requires_secret() {
        Jail::expect_with(|jail| {
            jail.create_file("livecast.toml", "[broadcaster]\nverifier = \"jwt\"\n")?;
            assert!(matches!(
                Config::from_cli(&cli("livecast.toml")),
                Err(ConfigError::MissingJwtSecret)
            ));
            Ok(())
        });
    }

    #[test]
    fn test_template_parses() {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(&generate_config_template()))
            .extract()
            .expect("template is valid TOML");
        assert_eq!(config.port, 3000);
    }
}
