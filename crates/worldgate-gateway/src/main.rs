//! Worldgate gateway binary.
//!
//! Startup sequence:
//! 1. Load configuration (`worldgate.yaml` or `WORLDGATE_CONFIG`, then
//!    environment overrides)
//! 2. Initialise structured logging
//! 3. Open the index and archive, build the compute target
//! 4. Apply the schema (retried lazily if the database is not up yet)
//! 5. Serve until `Ctrl-C`, then drain connections and close the pool

use tracing::info;
use tracing_subscriber::EnvFilter;
use worldgate_gateway::GatewayConfig;
use worldgate_gateway::config::{LogFormat, LoggingConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = GatewayConfig::load(|key| std::env::var(key).ok())?;
    init_logging(&config.logging);

    info!(
        host = %config.server.host,
        port = config.server.port,
        default_world = %config.routing.default_world(),
        "Worldgate starting"
    );

    worldgate_gateway::run(&config).await?;
    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}
