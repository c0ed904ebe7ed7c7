//! Shared application state for the game API.
//!
//! [`AppState`] holds the game engine behind one async mutex and an
//! optional database handle. Every mutating request runs the same
//! sequence while holding the lock:
//!
//! 1. plan the operation against the current ledger,
//! 2. persist the planned commit in one SQL transaction (when a database
//!    is attached),
//! 3. apply the commit in memory.
//!
//! Holding the lock across all three steps serialises every balance
//! check with the append it guards, so concurrent requests can never
//! overdraw a player. A failed persist leaves the in-memory ledger
//! untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use merchant_core::{Exchange, GameError, Planned, validate_game_data};
use merchant_db::PostgresPool;
use merchant_types::GameData;

use crate::error::ApiError;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The game engine.
    pub exchange: Arc<Mutex<Exchange>>,
    /// Durable storage; `None` runs the game in memory only.
    pub store: Option<PostgresPool>,
}

impl AppState {
    /// Create state around an exchange, without persistence.
    pub fn new(exchange: Exchange) -> Self {
        Self {
            exchange: Arc::new(Mutex::new(exchange)),
            store: None,
        }
    }

    /// Create state around an exchange, persisting to `store`.
    pub fn with_store(exchange: Exchange, store: PostgresPool) -> Self {
        Self {
            exchange: Arc::new(Mutex::new(exchange)),
            store: Some(store),
        }
    }

    /// Run a read against the exchange at the current time.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `read`.
    pub async fn read<T>(
        &self,
        read: impl FnOnce(&Exchange, DateTime<Utc>) -> Result<T, GameError>,
    ) -> Result<T, ApiError> {
        let exchange = self.exchange.lock().await;
        Ok(read(&exchange, Utc::now())?)
    }

    /// Plan, persist and apply one operation.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Game`] if planning or applying fails, or
    /// [`ApiError::Db`] if the commit cannot be stored.
    pub async fn execute<T>(
        &self,
        plan: impl FnOnce(&Exchange, DateTime<Utc>) -> Result<Planned<T>, GameError>,
    ) -> Result<T, ApiError> {
        self.execute_then(plan, |_, record| Ok(record)).await
    }

    /// Plan, persist and apply one operation, then derive a response from
    /// the updated exchange before the lock is released.
    ///
    /// # Errors
    ///
    /// Same as [`AppState::execute`], plus any error returned by `then`.
    pub async fn execute_then<T, R>(
        &self,
        plan: impl FnOnce(&Exchange, DateTime<Utc>) -> Result<Planned<T>, GameError>,
        then: impl FnOnce(&Exchange, T) -> Result<R, GameError>,
    ) -> Result<R, ApiError> {
        let mut exchange = self.exchange.lock().await;
        let planned = plan(&exchange, Utc::now())?;
        if let Some(store) = &self.store {
            store.events().persist(&planned.commit).await?;
        }
        let record = exchange.commit(planned)?;
        Ok(then(&exchange, record)?)
    }

    /// Validate, persist and install new game data.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Game`] for invalid data, or [`ApiError::Db`] if
    /// it cannot be stored.
    pub async fn update_game_data(&self, game: GameData) -> Result<GameData, ApiError> {
        let mut exchange = self.exchange.lock().await;
        validate_game_data(&game)?;
        if let Some(store) = &self.store {
            store.game_data().save(&game).await?;
        }
        exchange.set_game_data(game.clone())?;
        Ok(game)
    }
}
