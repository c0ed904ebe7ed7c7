//! HTTP/JSON API for the merchant trading game.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **Reference endpoints** for the round clock, items, cities and
//!   exchange rates
//! - **Player endpoints** for balances, history, loans, and the gameplay
//!   operations (buy, sell, gift, rob, borrow, repay)
//! - **Admin endpoints** for game data, ending the game, auditing the
//!   ledger and listing unpaid loans
//!
//! # Architecture
//!
//! The game engine ([`merchant_core::Exchange`]) lives in memory behind a
//! single async mutex in [`AppState`]. Each mutation is planned, persisted
//! to PostgreSQL in one transaction when a database is attached, and then
//! applied in memory while the lock is held.

pub mod admin;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

// Re-export primary types for convenience.
pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::AppState;
