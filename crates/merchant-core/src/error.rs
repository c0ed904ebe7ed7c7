//! The game error taxonomy.
//!
//! Every failure of a gameplay operation is detected before anything is
//! appended to the ledger and surfaces as one [`GameError`] variant that
//! identifies the offending input.

use merchant_ledger::LedgerError;
use merchant_types::{CityName, ItemName, LoanId, MarketSide, PlayerCode};

use crate::clock::ClockError;

/// Errors returned by the game engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// An unknown player, city, item, round or loan was referenced.
    #[error("{kind} not found: {key}")]
    NotFound {
        /// What kind of reference failed to resolve.
        kind: &'static str,
        /// The key that was looked up.
        key: String,
    },

    /// The requested side of the exchange rate has no price.
    #[error("market closed: no {side:?} price for {item} in {city} during round {round}")]
    MarketClosed {
        /// City of the rate.
        city: CityName,
        /// Round of the rate.
        round: u32,
        /// Item of the rate.
        item: ItemName,
        /// The closed side.
        side: MarketSide,
    },

    /// The operation would leave the player with negative money.
    #[error("insufficient funds: {player} has {available}, needs {required}")]
    InsufficientFunds {
        /// The paying player.
        player: PlayerCode,
        /// Money currently held.
        available: i64,
        /// Money the operation needs.
        required: i64,
    },

    /// The operation would leave the player with a negative item quantity.
    #[error("insufficient items: {player} has {available} {item}, needs {required}")]
    InsufficientItems {
        /// The selling player.
        player: PlayerCode,
        /// The item.
        item: ItemName,
        /// Quantity currently held.
        available: i64,
        /// Quantity the operation needs.
        required: i64,
    },

    /// A quantity or money amount is negative, zero where not allowed, or
    /// exceeds what the giver holds.
    #[error("invalid {field}: {reason}")]
    InvalidAmount {
        /// The offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The player already has a loan in this round.
    #[error("player {player} already took a loan in round {round}")]
    DuplicateLoan {
        /// Borrowing player.
        player: PlayerCode,
        /// Round of the existing loan.
        round: u32,
    },

    /// The loan has already been repaid.
    #[error("loan {0} has already been repaid")]
    AlreadyRepaid(LoanId),

    /// Giver and taker of a transfer are the same player.
    #[error("giver and taker are the same player: {0}")]
    SelfTransfer(PlayerCode),

    /// A loan was requested for a round that has not started.
    #[error("round {requested} has not started (current round is {current})")]
    FutureRound {
        /// The requested round.
        requested: u32,
        /// The current round.
        current: u32,
    },

    /// The game has ended; no further gameplay operations are accepted.
    #[error("the game has already ended")]
    GameEnded,

    /// Game data or reference data is unusable.
    #[error("invalid game configuration: {0}")]
    InvalidConfig(String),

    /// Integer overflow while computing an amount.
    #[error("arithmetic overflow computing {0}")]
    Overflow(&'static str),
}

impl GameError {
    /// Shorthand for [`GameError::NotFound`].
    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    /// Shorthand for [`GameError::InvalidAmount`].
    pub fn invalid_amount(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAmount {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::MarketClosed { .. } => "market_closed",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::InsufficientItems { .. } => "insufficient_items",
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::DuplicateLoan { .. } => "duplicate_loan",
            Self::AlreadyRepaid(_) => "already_repaid",
            Self::SelfTransfer(_) => "self_transfer",
            Self::FutureRound { .. } => "future_round",
            Self::GameEnded => "game_ended",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Overflow(_) => "overflow",
        }
    }
}

impl From<LedgerError> for GameError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::MarketClosed {
                city,
                round,
                item,
                side,
            } => Self::MarketClosed {
                city,
                round,
                item,
                side,
            },
            LedgerError::InvalidAmount { field, reason } => Self::InvalidAmount { field, reason },
            LedgerError::SelfTransfer(player) => Self::SelfTransfer(player),
            LedgerError::DuplicateLoan { player, round } => Self::DuplicateLoan { player, round },
            LedgerError::AlreadyRepaid(id) => Self::AlreadyRepaid(id),
            LedgerError::UnknownLoan(id) => Self::not_found("loan", id),
            LedgerError::GameEnded => Self::GameEnded,
            LedgerError::MissingField(field) => Self::invalid_amount(field, "is required"),
            LedgerError::Overflow(what) => Self::Overflow(what),
        }
    }
}

impl From<ClockError> for GameError {
    fn from(err: ClockError) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}
