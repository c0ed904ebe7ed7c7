//! Shared type definitions for the merchant trading game.
//!
//! This crate is the single source of truth for the types that flow between
//! the ledger, the game engine, the database layer and the HTTP API. Types
//! are exported to `TypeScript` via `ts-rs` for the player-facing frontend.
//!
//! # Modules
//!
//! - [`ids`] -- Record identifiers and natural-key newtypes
//! - [`enums`] -- Market side and robbery target
//! - [`structs`] -- Reference data, ledger records and derived balances

pub mod enums;
pub mod ids;
pub mod structs;

pub use enums::{MarketSide, RobTarget};
pub use ids::{
    CityName, ItemName, LiquidationId, LoanId, LoanPaybackId, PlayerCode, PlayerTransactionId,
    TransactionId,
};
pub use structs::{
    Balances, City, ExchangeRate, GameData, GameEnd, Item, Liquidation, Loan, LoanPayback, Player,
    PlayerTransaction, PlayerTransactionItemAmount, Transaction,
};

/// Money every player holds before any ledger activity.
pub const STARTING_MONEY: i64 = 1000;

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::TransactionId::export_all();
        let _ = crate::ids::PlayerTransactionId::export_all();
        let _ = crate::ids::LoanId::export_all();
        let _ = crate::ids::LoanPaybackId::export_all();
        let _ = crate::ids::LiquidationId::export_all();
        let _ = crate::ids::ItemName::export_all();
        let _ = crate::ids::CityName::export_all();
        let _ = crate::ids::PlayerCode::export_all();

        // Enums
        let _ = crate::enums::MarketSide::export_all();
        let _ = crate::enums::RobTarget::export_all();

        // Structs
        let _ = crate::structs::Item::export_all();
        let _ = crate::structs::City::export_all();
        let _ = crate::structs::Player::export_all();
        let _ = crate::structs::ExchangeRate::export_all();
        let _ = crate::structs::GameData::export_all();
        let _ = crate::structs::Transaction::export_all();
        let _ = crate::structs::PlayerTransactionItemAmount::export_all();
        let _ = crate::structs::PlayerTransaction::export_all();
        let _ = crate::structs::Loan::export_all();
        let _ = crate::structs::LoanPayback::export_all();
        let _ = crate::structs::Liquidation::export_all();
        let _ = crate::structs::GameEnd::export_all();
        let _ = crate::structs::Balances::export_all();
    }
}
