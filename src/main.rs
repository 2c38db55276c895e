#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(warnings)]

use api_service::infrastructure::{
    config::{AppConfig, RuntimeMode},
    http::start_server,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    init_tracing();

    let config = AppConfig::load();

    info!(
        mode = %config.mode,
        addr = %config.server.socket_addr(),
        "Starting {}",
        config.server.service_name
    );

    if let Err(e) = start_server(config).await {
        error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// JSON logs in production, human readable ones elsewhere. The mode is read
/// straight from the environment because configuration loading logs too.
fn init_tracing() {
    let json = std::env::var("RUN_MODE")
        .ok()
        .and_then(|mode| mode.trim().trim_matches(['"', '\'']).parse::<RuntimeMode>().ok())
        .is_some_and(RuntimeMode::is_production);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api_service=debug,tower_http=info".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer().pretty()))
        .init();
}
