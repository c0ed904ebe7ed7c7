//! Game engine for the merchant trading game.
//!
//! This crate owns the rules of the game: the round clock, the static
//! price book, the loan formulas and the orchestrator that validates
//! every trade, gift, robbery, loan and payback before it reaches the
//! ledger.
//!
//! # Modules
//!
//! - [`clock`] -- Wall-clock time to round number and remaining seconds.
//! - [`config`] -- Configuration loading from `merchant-config.yaml` into
//!   strongly-typed structs.
//! - [`error`] -- The [`GameError`] taxonomy.
//! - [`exchange`] -- [`Exchange`], the plan/apply orchestrator.
//! - [`loans`] -- Loan principal and payback formulas.
//! - [`price_book`] -- Items, cities, rounds and exchange rates.
//! - [`seed`] -- Seed file parsing and player code generation.

pub mod clock;
pub mod config;
pub mod error;
pub mod exchange;
pub mod loans;
pub mod price_book;
pub mod seed;

pub use clock::{ClockError, RoundClock, RoundStatus};
pub use config::{ConfigError, MerchantConfig};
pub use error::GameError;
pub use exchange::{
    Exchange, LoanQuote, LoanStatus, Planned, PlayerReport, Standing, TradeOutcome,
    validate_game_data,
};
pub use price_book::PriceBook;
pub use seed::{SeedData, generate_player_codes};
