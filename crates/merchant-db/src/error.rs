//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`sqlx`] errors. Unique-constraint violations are surfaced separately
//! as [`DbError::Conflict`] so callers can report them as a clash with an
//! existing record rather than a storage failure.

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// An insert collided with an existing row.
    #[error("Conflict with existing record: {0}")]
    Conflict(String),

    /// A stored value cannot be represented in the domain types.
    #[error("Corrupt row in {table}: {reason}")]
    Corrupt {
        /// The table the row came from.
        table: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DbError {
    /// Classify an insert failure, mapping unique violations to
    /// [`DbError::Conflict`].
    pub fn from_insert(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(db.message().to_owned())
            }
            _ => Self::Postgres(err),
        }
    }
}

/// Convert a round number to its column type.
pub(crate) fn round_to_db(round: u32) -> Result<i32, DbError> {
    i32::try_from(round).map_err(|_| DbError::Corrupt {
        table: "rounds",
        reason: format!("round {round} does not fit in INTEGER"),
    })
}

/// Convert a round column back to a round number.
pub(crate) fn round_from_db(table: &'static str, round: i32) -> Result<u32, DbError> {
    u32::try_from(round).map_err(|_| DbError::Corrupt {
        table,
        reason: format!("negative round {round}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_convert_both_ways() {
        assert_eq!(round_to_db(6).ok(), Some(6));
        assert_eq!(round_from_db("loans", 6).ok(), Some(6));
    }

    #[test]
    fn negative_round_is_corrupt() {
        assert!(matches!(
            round_from_db("loans", -1),
            Err(DbError::Corrupt { table: "loans", .. })
        ));
    }

    #[test]
    fn oversized_round_is_rejected() {
        assert!(round_to_db(u32::MAX).is_err());
    }

    #[test]
    fn non_database_errors_are_not_conflicts() {
        assert!(matches!(
            DbError::from_insert(sqlx::Error::RowNotFound),
            DbError::Postgres(_)
        ));
    }
}
