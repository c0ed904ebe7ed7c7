//! Persistence of the single game data row.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use merchant_types::GameData;

use crate::error::DbError;

/// Operations on the `game_data` table.
#[derive(Debug, Clone, Copy)]
pub struct GameDataStore<'a> {
    pool: &'a PgPool,
}

impl<'a> GameDataStore<'a> {
    /// Create a new game data store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Load the game data, if it has been stored.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails, or
    /// [`DbError::Corrupt`] for a negative round duration.
    pub async fn load(&self) -> Result<Option<GameData>, DbError> {
        let row = sqlx::query_as::<_, (DateTime<Utc>, i32, i64, i64, i64)>(
            r"SELECT starting_time, round_duration, starting_loan, loan_increase, loan_interest
              FROM game_data WHERE id = 1",
        )
        .fetch_optional(self.pool)
        .await?;

        row.map(
            |(starting_time, round_duration, starting_loan, loan_increase, loan_interest)| {
                let round_duration =
                    u32::try_from(round_duration).map_err(|_| DbError::Corrupt {
                        table: "game_data",
                        reason: format!("negative round_duration {round_duration}"),
                    })?;
                Ok(GameData {
                    starting_time,
                    round_duration,
                    starting_loan,
                    loan_increase,
                    loan_interest,
                })
            },
        )
        .transpose()
    }

    /// Store the game data, replacing any previous row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the upsert fails.
    pub async fn save(&self, game: &GameData) -> Result<(), DbError> {
        let round_duration = i32::try_from(game.round_duration).map_err(|_| DbError::Corrupt {
            table: "game_data",
            reason: format!("round_duration {} does not fit", game.round_duration),
        })?;
        sqlx::query(
            r"INSERT INTO game_data (id, starting_time, round_duration, starting_loan, loan_increase, loan_interest, updated_at)
              VALUES (1, $1, $2, $3, $4, $5, now())
              ON CONFLICT (id) DO UPDATE SET
                  starting_time = EXCLUDED.starting_time,
                  round_duration = EXCLUDED.round_duration,
                  starting_loan = EXCLUDED.starting_loan,
                  loan_increase = EXCLUDED.loan_increase,
                  loan_interest = EXCLUDED.loan_interest,
                  updated_at = now()",
        )
        .bind(game.starting_time)
        .bind(round_duration)
        .bind(game.starting_loan)
        .bind(game.loan_increase)
        .bind(game.loan_interest)
        .execute(self.pool)
        .await?;
        tracing::debug!("Stored game data");
        Ok(())
    }
}
