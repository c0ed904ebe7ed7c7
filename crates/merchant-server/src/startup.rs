//! Game state bootstrap.
//!
//! Builds the in-memory [`Exchange`] either from PostgreSQL (seeding an
//! empty database first) or, when persistence is disabled, directly from
//! the seed data.

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::{info, warn};

use merchant_core::{Exchange, MerchantConfig, PriceBook, SeedData, generate_player_codes};
use merchant_core::config::SeedConfig;
use merchant_db::{Catalog, PostgresConfig, PostgresPool};
use merchant_ledger::Ledger;
use merchant_types::{GameData, PlayerCode};

use crate::error::ServerError;

/// Load the seed file named by the config, or the built-in seed.
fn load_seed(config: &SeedConfig) -> Result<SeedData, ServerError> {
    let seed = match &config.file {
        Some(path) => {
            info!(path = %path.display(), "Loading seed file");
            SeedData::from_file(path)?
        }
        None => SeedData::builtin()?,
    };
    Ok(seed)
}

/// Random player codes for a fresh game.
fn new_players(config: &SeedConfig) -> Vec<PlayerCode> {
    let count = usize::try_from(config.player_count).unwrap_or(usize::MAX);
    generate_player_codes(&mut rand::rng(), count, &BTreeSet::new())
}

/// Build an exchange that lives in memory only.
///
/// # Errors
///
/// Returns an error if the seed cannot be loaded or is inconsistent.
pub fn in_memory_exchange(config: &MerchantConfig) -> Result<Exchange, ServerError> {
    let seed = load_seed(&config.seed)?;
    let prices = seed.to_price_book()?;
    let players = new_players(&config.seed);
    let game = config.game.to_game_data(Utc::now());

    warn!(
        players = players.len(),
        "Persistence disabled, game state will be lost on restart"
    );
    Ok(Exchange::new(game, prices, players, Ledger::new())?)
}

/// Connect to PostgreSQL and apply pending migrations.
///
/// # Errors
///
/// Returns [`ServerError::Database`] if the connection or a migration
/// fails.
pub async fn connect(config: &MerchantConfig) -> Result<PostgresPool, ServerError> {
    let pg_config = PostgresConfig::new(&config.database.url)
        .with_max_connections(config.database.max_connections);
    let pool = PostgresPool::connect(&pg_config).await?;
    pool.run_migrations().await?;
    Ok(pool)
}

/// Write reference data and a fresh player roster into an empty database.
async fn seed_database(pool: &PostgresPool, config: &SeedConfig) -> Result<(), ServerError> {
    let seed = load_seed(config)?;
    // Reject an inconsistent seed before anything is written.
    seed.to_price_book()?;

    let catalog = Catalog {
        items: seed.items(),
        cities: seed.cities(),
        rounds: seed.round_numbers(),
        rates: seed.rates(),
    };
    pool.catalog().insert_catalog(&catalog).await?;

    let players = new_players(config);
    pool.catalog().insert_players(&players).await?;

    info!(
        items = catalog.items.len(),
        cities = catalog.cities.len(),
        rounds = catalog.rounds.len(),
        rates = catalog.rates.len(),
        players = players.len(),
        "Database seeded"
    );
    Ok(())
}

/// Load stored game data, persisting the configured defaults on first start.
async fn load_game_data(
    pool: &PostgresPool,
    config: &MerchantConfig,
) -> Result<GameData, ServerError> {
    if let Some(game) = pool.game_data().load().await? {
        return Ok(game);
    }
    let game = config.game.to_game_data(Utc::now());
    pool.game_data().save(&game).await?;
    info!(starting_time = %game.starting_time, "Game data initialised");
    Ok(game)
}

/// Build the exchange from the database, seeding it first if it is empty.
///
/// The stored event log is replayed into a [`Ledger`] and audited; an
/// anomaly is logged but does not stop startup.
///
/// # Errors
///
/// Returns an error if the database cannot be read or the stored state
/// violates a ledger invariant.
pub async fn load_exchange(
    pool: &PostgresPool,
    config: &MerchantConfig,
) -> Result<Exchange, ServerError> {
    if !pool.catalog().is_seeded().await? {
        if config.seed.enabled {
            seed_database(pool, &config.seed).await?;
        } else {
            warn!("Database is empty and seeding is disabled");
        }
    }

    let catalog = pool.catalog().load_catalog().await?;
    let prices = PriceBook::from_parts(catalog.items, catalog.cities, catalog.rounds, catalog.rates)?;
    let players = pool.catalog().load_players().await?;
    let game = load_game_data(pool, config).await?;

    let events = pool.events().load_all().await?;
    info!(events = events.len(), "Replaying ledger");
    let ledger = Ledger::from_events(events)?;

    let exchange = Exchange::new(game, prices, players, ledger)?;
    let audit = exchange.audit();
    if audit.is_clean() {
        info!("Ledger audit clean");
    } else {
        warn!(?audit, "Ledger audit found anomalies");
    }
    Ok(exchange)
}
