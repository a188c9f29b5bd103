use std::path::PathBuf;
use std::sync::Arc;

use axum::middleware;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use audioconnector_gateway::{
    ServerConfig,
    bridge::UnconfiguredConnector,
    middleware::api_key_middleware,
    routes,
    state::AppState,
};

/// AudioConnector Gateway - telephony WebSocket to voice-agent bridge
#[derive(Parser, Debug)]
#[command(name = "audioconnector-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    // Load configuration from file or environment
    let config = if let Some(config_path) = cli.config {
        info!("loading configuration from {}", config_path.display());
        ServerConfig::from_file(&config_path)?
    } else {
        ServerConfig::from_env()?
    };

    let address = config.address();

    // The binary ships without an agent integration; deployments supply a
    // BridgeConnector by embedding the crate as a library.
    let app_state = Arc::new(AppState::new(config, Arc::new(UnconfiguredConnector)));

    // Auth guards the WebSocket upgrade only; the health probe stays open.
    let app = routes::create_voicebot_router()
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            api_key_middleware,
        ))
        .merge(routes::create_public_router())
        .with_state(app_state);

    info!("starting AudioConnector gateway on {address}");
    let listener = TcpListener::bind(&address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
