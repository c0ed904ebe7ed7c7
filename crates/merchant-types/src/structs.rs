//! Core entity structs: reference data, ledger records and derived balances.
//!
//! Reference data (items, cities, rounds, exchange rates, players) is seeded
//! once and read-only during play. Ledger records are immutable once
//! created. Player balances are never stored; [`Balances`] is always the
//! result of folding ledger records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::MarketSide;
use crate::ids::{
    CityName, ItemName, LiquidationId, LoanId, LoanPaybackId, PlayerCode, PlayerTransactionId,
    TransactionId,
};

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

/// A commodity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Item {
    /// Unique item name.
    pub name: ItemName,
    /// Per-unit price paid for remaining stock when the game ends.
    pub ending_price: i64,
}

/// A trading location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct City {
    /// Unique city name.
    pub name: CityName,
}

/// A player. Identity only: balances are derived from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Player {
    /// Unique, upper-case player code.
    pub code: PlayerCode,
}

/// Buy/sell prices for one item in one city during one round.
///
/// A `None` price means that side of the market is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ExchangeRate {
    /// City offering the rate.
    pub city: CityName,
    /// Round the rate applies to.
    pub round: u32,
    /// Item being priced.
    pub item: ItemName,
    /// Price per unit the player pays to acquire the item.
    pub buy_price: Option<i64>,
    /// Price per unit the market pays the player for the item.
    pub sell_price: Option<i64>,
}

impl ExchangeRate {
    /// Unit price for the given side, or `None` if that side is closed.
    pub const fn price(&self, side: MarketSide) -> Option<i64> {
        match side {
            MarketSide::Buy => self.buy_price,
            MarketSide::Sell => self.sell_price,
        }
    }
}

/// Game configuration driving the round clock and loan terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GameData {
    /// Wall-clock start of round 1.
    pub starting_time: DateTime<Utc>,
    /// Round length in minutes.
    pub round_duration: u32,
    /// Loan amount in the first round.
    pub starting_loan: i64,
    /// Increase of the loan amount in each subsequent round.
    pub loan_increase: i64,
    /// Interest per elapsed round, in percent of the loan amount.
    pub loan_interest: i64,
}

// ---------------------------------------------------------------------------
// Ledger records
// ---------------------------------------------------------------------------

/// A market trade between a player and a city.
///
/// `item_amount` is positive when the player buys and negative when the
/// player sells. `price` is the signed cash delta for the player and is
/// frozen at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Transaction {
    /// Record identifier.
    pub id: TransactionId,
    /// Trading player.
    pub player: PlayerCode,
    /// City of the exchange rate used.
    pub city: CityName,
    /// Round of the exchange rate used.
    pub round: u32,
    /// Item traded.
    pub item: ItemName,
    /// Signed item flow for the player.
    pub item_amount: i64,
    /// Unit price applied.
    pub unit_price: i64,
    /// Signed money flow for the player.
    pub price: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One item line of a [`PlayerTransaction`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PlayerTransactionItemAmount {
    /// Item moved.
    pub item: ItemName,
    /// Quantity moved from giver to taker (never negative).
    pub amount: i64,
}

/// A transfer of money and items from one player to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PlayerTransaction {
    /// Record identifier.
    pub id: PlayerTransactionId,
    /// Player losing the assets.
    pub giver: PlayerCode,
    /// Player receiving the assets.
    pub taker: PlayerCode,
    /// Money moved from giver to taker.
    pub money: i64,
    /// Item lines moved from giver to taker.
    pub items: Vec<PlayerTransactionItemAmount>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A loan taken by a player in a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Loan {
    /// Record identifier.
    pub id: LoanId,
    /// Borrowing player.
    pub player: PlayerCode,
    /// Round the loan belongs to.
    pub round: u32,
    /// Principal, frozen at creation.
    pub amount: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Settlement of a [`Loan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct LoanPayback {
    /// Record identifier.
    pub id: LoanPaybackId,
    /// The loan being repaid.
    pub loan_id: LoanId,
    /// Player owning the loan (copied from the loan).
    pub player: PlayerCode,
    /// Round in which the payback happened.
    pub round: u32,
    /// Principal plus accrued interest, frozen at creation.
    pub payback_amount: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// End-of-game conversion of a player's remaining stock into money.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Liquidation {
    /// Record identifier.
    pub id: LiquidationId,
    /// Player whose stock is liquidated.
    pub player: PlayerCode,
    /// Item liquidated.
    pub item: ItemName,
    /// Quantity removed from the player.
    pub amount: i64,
    /// Unit price paid.
    pub ending_price: i64,
    /// Money credited to the player.
    pub proceeds: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Marker recording that the game has been ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GameEnd {
    /// Round current at the time the game was ended.
    pub round: u32,
    /// When the game was ended.
    pub ended_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Derived state
// ---------------------------------------------------------------------------

/// A player's derived money and item holdings.
///
/// Items with a zero quantity are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Balances {
    /// Money on hand.
    pub money: i64,
    /// Quantity held per item.
    pub items: BTreeMap<ItemName, i64>,
}

impl Balances {
    /// Balances of a player with no ledger activity.
    pub const fn opening() -> Self {
        Self {
            money: crate::STARTING_MONEY,
            items: BTreeMap::new(),
        }
    }

    /// Quantity held of `item` (zero when absent).
    pub fn item(&self, item: &str) -> i64 {
        self.items.get(item).copied().unwrap_or(0)
    }

    /// Whether money and every item quantity are non-negative.
    pub fn is_solvent(&self) -> bool {
        self.money >= 0 && self.items.values().all(|amount| *amount >= 0)
    }

    /// The first item with a negative quantity, if any.
    pub fn first_negative_item(&self) -> Option<(&ItemName, i64)> {
        self.items
            .iter()
            .find(|(_, amount)| **amount < 0)
            .map(|(item, amount)| (item, *amount))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(buy: Option<i64>, sell: Option<i64>) -> ExchangeRate {
        ExchangeRate {
            city: CityName::new("Eger"),
            round: 1,
            item: ItemName::new("gem"),
            buy_price: buy,
            sell_price: sell,
        }
    }

    #[test]
    fn rate_price_selects_side() {
        let r = rate(Some(14), None);
        assert_eq!(r.price(MarketSide::Buy), Some(14));
        assert_eq!(r.price(MarketSide::Sell), None);
    }

    #[test]
    fn balances_solvency() {
        let mut balances = Balances {
            money: 10,
            items: BTreeMap::new(),
        };
        balances.items.insert(ItemName::new("ore"), 2);
        assert!(balances.is_solvent());
        assert_eq!(balances.item("ore"), 2);
        assert_eq!(balances.item("wood"), 0);

        balances.items.insert(ItemName::new("wood"), -1);
        assert!(!balances.is_solvent());
        assert_eq!(
            balances.first_negative_item().map(|(i, a)| (i.as_str().to_owned(), a)),
            Some(("wood".to_owned(), -1))
        );
    }

    #[test]
    fn opening_balances_hold_the_starting_stake() {
        let opening = Balances::opening();
        assert_eq!(opening.money, 1000);
        assert!(opening.items.is_empty());
    }

    #[test]
    fn market_side_of_amount() {
        assert_eq!(MarketSide::of_amount(3), MarketSide::Buy);
        assert_eq!(MarketSide::of_amount(-3), MarketSide::Sell);
    }
}
