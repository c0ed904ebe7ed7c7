//! Game server binary for the merchant trading game.
//!
//! Wires configuration, persistence and the HTTP API together.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `merchant-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Connect to PostgreSQL and run migrations (unless disabled)
//! 4. Seed an empty database with reference data and players
//! 5. Load reference data and game data, replay the ledger, audit it
//! 6. Serve the HTTP API until `Ctrl-C`

mod error;
mod startup;

use std::path::Path;
use std::sync::Arc;

use merchant_api::{AppState, ServerConfig};
use merchant_core::MerchantConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::ServerError;

/// Configuration file read from the working directory.
const CONFIG_PATH: &str = "merchant-config.yaml";

/// Application entry point for the game server.
///
/// # Errors
///
/// Returns an error if any startup step or the HTTP server fails.
#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // 1. Load configuration before logging so its level can seed the filter.
    let config = MerchantConfig::load(Path::new(CONFIG_PATH))?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!(
        host = %config.server.host,
        port = config.server.port,
        database = config.database.enabled,
        round_duration = config.game.round_duration,
        "merchant-server starting"
    );

    // 3-5. Build the game state.
    let state = if config.database.enabled {
        let pool = startup::connect(&config).await?;
        info!("Database connected and migrated");
        let exchange = startup::load_exchange(&pool, &config).await?;
        AppState::with_store(exchange, pool)
    } else {
        AppState::new(startup::in_memory_exchange(&config)?)
    };

    // 6. Serve.
    let server_config = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };
    let store = state.store.clone();
    merchant_api::start_server(&server_config, Arc::new(state)).await?;

    if let Some(pool) = store {
        pool.close().await;
    }
    info!("merchant-server stopped");
    Ok(())
}
