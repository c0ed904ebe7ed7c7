//! Error types for the game server binary.
//!
//! [`ServerError`] is the top-level error type that wraps all possible
//! failure modes during startup and serving.

/// Top-level error for the game server binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration or seed loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: merchant_core::ConfigError,
    },

    /// Loaded state violates a game rule.
    #[error("game error: {source}")]
    Game {
        /// The underlying game error.
        #[from]
        source: merchant_core::GameError,
    },

    /// The stored event log could not be replayed.
    #[error("ledger error: {source}")]
    Ledger {
        /// The underlying ledger error.
        #[from]
        source: merchant_ledger::LedgerError,
    },

    /// Database connection, migration or query failed.
    #[error("database error: {source}")]
    Database {
        /// The underlying database error.
        #[from]
        source: merchant_db::DbError,
    },

    /// The HTTP server failed to bind or serve.
    #[error("http error: {source}")]
    Http {
        /// The underlying HTTP server error.
        #[from]
        source: merchant_api::ServerError,
    },
}
