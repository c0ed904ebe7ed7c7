//! Enumeration types shared across the merchant game.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Which side of a city market a trade hits.
///
/// `Buy` means the player acquires items from the market and pays the
/// rate's `buy_price`; `Sell` means the player hands items to the market
/// and receives the rate's `sell_price`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum MarketSide {
    /// Player acquires items from the market.
    Buy,
    /// Player sells items to the market.
    Sell,
}

impl MarketSide {
    /// Side implied by a signed item amount: non-negative amounts buy.
    pub const fn of_amount(item_amount: i64) -> Self {
        if item_amount >= 0 { Self::Buy } else { Self::Sell }
    }
}

/// What a robbery takes from its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum RobTarget {
    /// The target's entire money balance.
    Money,
    /// Every item the target holds.
    Items,
}

impl RobTarget {
    /// Map the wire-level `rob_money` flag to a target.
    pub const fn from_rob_money(rob_money: bool) -> Self {
        if rob_money { Self::Money } else { Self::Items }
    }
}
