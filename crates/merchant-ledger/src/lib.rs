//! Append-only economic ledger for the merchant trading game.
//!
//! Every change to a player's money or stock is a ledger event. Nothing
//! stores a balance: money and item quantities are always derived by
//! folding the events that mention a player.
//!
//! # Architecture
//!
//! - [`event`] -- [`LedgerEvent`] and the [`Commit`] unit of atomic append.
//! - [`ledger`] -- The [`Ledger`] struct: event log, uniqueness indexes,
//!   balance fold and queries.
//! - [`transaction`] -- [`TradeBuilder`] and [`TransferBuilder`] for
//!   validated record construction.
//! - [`audit`] -- Solvency and uniqueness verification over a full log.
//!
//! # Balance fold
//!
//! ```text
//! money  = 1000 + sum(trade.price) - sum(given money) + sum(taken money)
//!               + sum(loan.amount) - sum(payback.payback_amount)
//!               + sum(liquidation.proceeds)
//! items  = sum(trade.item_amount) - sum(given items) + sum(taken items)
//!               - sum(liquidated items)
//! ```
//!
//! The fold is a pure sum, so event order never changes a balance.
//!
//! # Usage
//!
//! ```
//! use chrono::Utc;
//! use merchant_ledger::Ledger;
//! use merchant_types::{CityName, ExchangeRate, ItemName, PlayerCode};
//!
//! let mut ledger = Ledger::new();
//! let player = PlayerCode::new("abc123");
//! let rate = ExchangeRate {
//!     city: CityName::new("Eger"),
//!     round: 1,
//!     item: ItemName::new("gem"),
//!     buy_price: Some(14),
//!     sell_price: Some(12),
//! };
//!
//! ledger.append_transaction(&player, &rate, 10, Utc::now()).ok();
//!
//! let balances = ledger.balances(&player);
//! assert_eq!(balances.money, 860);
//! assert_eq!(balances.item("gem"), 10);
//! ```

pub mod audit;
pub mod event;
pub mod ledger;
pub mod transaction;

pub use audit::{AuditResult, LedgerAnomaly, NegativeBalance, audit};
pub use event::{Commit, LedgerEvent};
pub use ledger::Ledger;
pub use transaction::{TradeBuilder, TransferBuilder};

use merchant_types::{CityName, ItemName, LoanId, MarketSide, PlayerCode};

/// Errors that can occur when building or appending ledger events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
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

    /// A quantity or money amount is out of range.
    #[error("invalid {field}: {reason}")]
    InvalidAmount {
        /// The offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A player tried to transfer assets to themselves.
    #[error("giver and taker are the same player: {0}")]
    SelfTransfer(PlayerCode),

    /// The player already has a loan in this round.
    #[error("player {player} already took a loan in round {round}")]
    DuplicateLoan {
        /// Borrowing player.
        player: PlayerCode,
        /// Round of the existing loan.
        round: u32,
    },

    /// The loan already has a payback.
    #[error("loan {0} has already been repaid")]
    AlreadyRepaid(LoanId),

    /// A payback refers to a loan that is not in the ledger.
    #[error("unknown loan: {0}")]
    UnknownLoan(LoanId),

    /// The game has ended; the ledger accepts no further events.
    #[error("the game has already ended")]
    GameEnded,

    /// A required field was not set on a builder.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Integer overflow while computing an amount.
    #[error("arithmetic overflow computing {0}")]
    Overflow(&'static str),
}
