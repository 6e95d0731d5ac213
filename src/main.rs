use std::net::SocketAddr;

use tokio::net::TcpListener;

use livecast_server::config::{generate_config_template, Config};
use livecast_server::{routes, state};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("livecast_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }

    tracing::info!("livecast server v{} starting", env!("CARGO_PKG_VERSION"));

    let app_state = state::AppState::from_config(&config)?;

    if config.require_broadcaster_auth && app_state.broadcaster_gate.allow_list_len() == 0 {
        tracing::warn!(
            "broadcaster.allowed_identities is empty: nobody can go live until it is configured"
        );
    }
    if app_state.admin_credentials.is_empty() {
        tracing::warn!("No [admins] configured: stop-stream is unavailable");
    }
    tracing::info!(
        require_broadcaster_auth = config.require_broadcaster_auth,
        verifier = ?config.broadcaster.verifier,
        turn_enabled = config.turn.as_ref().is_some_and(|t| t.enabled),
        "Signaling configured"
    );

    // Build router
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
