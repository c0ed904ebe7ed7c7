//! `PostgreSQL` data layer for the merchant game.
//!
//! The database is the durable copy of the game. At startup the server
//! loads the reference data, the game data and every ledger event, and
//! replays them into memory. During play each validated operation is
//! written here before it is applied in memory.
//!
//! # Modules
//!
//! - [`postgres`] -- Connection pool, configuration and migrations
//! - [`catalog_store`] -- Items, cities, rounds, exchange rates, players
//! - [`game_store`] -- The single game data row
//! - [`event_store`] -- Atomic commit persistence and replay loading
//! - [`error`] -- Shared error types

pub mod catalog_store;
pub mod error;
pub mod event_store;
pub mod game_store;
pub mod postgres;

// Re-export primary types for convenience.
pub use catalog_store::{Catalog, CatalogStore};
pub use error::DbError;
pub use event_store::EventStore;
pub use game_store::GameDataStore;
pub use postgres::{PostgresConfig, PostgresPool};
