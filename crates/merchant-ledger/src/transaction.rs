//! Record builders and validation for the ledger.
//!
//! [`TradeBuilder`] prices a market trade against an [`ExchangeRate`];
//! [`TransferBuilder`] assembles a player-to-player transfer. Both validate
//! their inputs before producing a record, so every record that reaches
//! the ledger is well formed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use merchant_types::{
    ExchangeRate, ItemName, MarketSide, PlayerCode, PlayerTransaction, PlayerTransactionId,
    PlayerTransactionItemAmount, Transaction, TransactionId,
};

use crate::LedgerError;

// ---------------------------------------------------------------------------
// Trade builder
// ---------------------------------------------------------------------------

/// Builder for market [`Transaction`] records.
///
/// The unit price is taken from the rate's buy side for non-negative item
/// amounts and from its sell side otherwise. The signed cash delta is
/// `-item_amount * unit_price` and is frozen into the record.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use merchant_ledger::TradeBuilder;
/// use merchant_types::{CityName, ExchangeRate, ItemName, PlayerCode};
///
/// let rate = ExchangeRate {
///     city: CityName::new("Szeged"),
///     round: 2,
///     item: ItemName::new("ore"),
///     buy_price: Some(6),
///     sell_price: Some(5),
/// };
///
/// let sale = TradeBuilder::new(&rate)
///     .player(PlayerCode::new("p1"))
///     .item_amount(-4)
///     .created_at(Utc::now())
///     .build();
///
/// assert_eq!(sale.map(|t| t.price).ok(), Some(20));
/// ```
#[derive(Debug)]
pub struct TradeBuilder<'a> {
    rate: &'a ExchangeRate,
    player: Option<PlayerCode>,
    item_amount: Option<i64>,
    created_at: Option<DateTime<Utc>>,
}

impl<'a> TradeBuilder<'a> {
    /// Start building a trade against the given rate.
    pub const fn new(rate: &'a ExchangeRate) -> Self {
        Self {
            rate,
            player: None,
            item_amount: None,
            created_at: None,
        }
    }

    /// Set the trading player.
    #[must_use]
    pub fn player(mut self, player: PlayerCode) -> Self {
        self.player = Some(player);
        self
    }

    /// Set the signed item amount (positive buys, negative sells).
    #[must_use]
    pub const fn item_amount(mut self, amount: i64) -> Self {
        self.item_amount = Some(amount);
        self
    }

    /// Set the creation timestamp (defaults to now).
    #[must_use]
    pub const fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Validate and produce the [`Transaction`].
    ///
    /// # Errors
    ///
    /// - [`LedgerError::MissingField`] if the player or amount is unset.
    /// - [`LedgerError::InvalidAmount`] if the amount is zero.
    /// - [`LedgerError::MarketClosed`] if the selected price is absent.
    /// - [`LedgerError::Overflow`] if the price does not fit in `i64`.
    pub fn build(self) -> Result<Transaction, LedgerError> {
        let player = self.player.ok_or(LedgerError::MissingField("player"))?;
        let item_amount = self
            .item_amount
            .ok_or(LedgerError::MissingField("item_amount"))?;

        if item_amount == 0 {
            return Err(LedgerError::InvalidAmount {
                field: "amount".to_owned(),
                reason: "must be non-zero".to_owned(),
            });
        }

        let side = MarketSide::of_amount(item_amount);
        let unit_price = self.rate.price(side).ok_or_else(|| LedgerError::MarketClosed {
            city: self.rate.city.clone(),
            round: self.rate.round,
            item: self.rate.item.clone(),
            side,
        })?;

        let price = item_amount
            .checked_mul(unit_price)
            .and_then(i64::checked_neg)
            .ok_or(LedgerError::Overflow("trade price"))?;

        Ok(Transaction {
            id: TransactionId::new(),
            player,
            city: self.rate.city.clone(),
            round: self.rate.round,
            item: self.rate.item.clone(),
            item_amount,
            unit_price,
            price,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        })
    }
}

// ---------------------------------------------------------------------------
// Transfer builder
// ---------------------------------------------------------------------------

/// Builder for [`PlayerTransaction`] records.
///
/// Direction is always giver to taker; money and every item amount must be
/// non-negative. Zero item lines are dropped.
#[derive(Debug)]
pub struct TransferBuilder {
    giver: PlayerCode,
    taker: PlayerCode,
    money: i64,
    items: BTreeMap<ItemName, i64>,
    created_at: Option<DateTime<Utc>>,
}

impl TransferBuilder {
    /// Start building a transfer from `giver` to `taker`.
    pub const fn new(giver: PlayerCode, taker: PlayerCode) -> Self {
        Self {
            giver,
            taker,
            money: 0,
            items: BTreeMap::new(),
            created_at: None,
        }
    }

    /// Set the money moved.
    #[must_use]
    pub const fn money(mut self, money: i64) -> Self {
        self.money = money;
        self
    }

    /// Set the item amounts moved.
    #[must_use]
    pub fn items(mut self, items: BTreeMap<ItemName, i64>) -> Self {
        self.items = items;
        self
    }

    /// Set the creation timestamp (defaults to now).
    #[must_use]
    pub const fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Validate and produce the [`PlayerTransaction`].
    ///
    /// # Errors
    ///
    /// - [`LedgerError::SelfTransfer`] if giver and taker are the same.
    /// - [`LedgerError::InvalidAmount`] if money or any item amount is
    ///   negative.
    pub fn build(self) -> Result<PlayerTransaction, LedgerError> {
        if self.giver == self.taker {
            return Err(LedgerError::SelfTransfer(self.giver));
        }
        if self.money < 0 {
            return Err(LedgerError::InvalidAmount {
                field: "money".to_owned(),
                reason: format!("must not be negative, got {}", self.money),
            });
        }
        if let Some((item, amount)) = self.items.iter().find(|(_, amount)| **amount < 0) {
            return Err(LedgerError::InvalidAmount {
                field: format!("items.{item}"),
                reason: format!("must not be negative, got {amount}"),
            });
        }

        let items = self
            .items
            .into_iter()
            .filter(|(_, amount)| *amount > 0)
            .map(|(item, amount)| PlayerTransactionItemAmount { item, amount })
            .collect();

        Ok(PlayerTransaction {
            id: PlayerTransactionId::new(),
            giver: self.giver,
            taker: self.taker,
            money: self.money,
            items,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use merchant_types::CityName;

    use super::*;

    fn rate(buy: Option<i64>, sell: Option<i64>) -> ExchangeRate {
        ExchangeRate {
            city: CityName::new("Budapest"),
            round: 1,
            item: ItemName::new("mercury"),
            buy_price: buy,
            sell_price: sell,
        }
    }

    fn player() -> PlayerCode {
        PlayerCode::new("123456")
    }

    #[test]
    fn buying_uses_buy_price_and_costs_money() {
        let r = rate(Some(25), Some(18));
        let trade = TradeBuilder::new(&r)
            .player(player())
            .item_amount(3)
            .build()
            .unwrap();
        assert_eq!(trade.unit_price, 25);
        assert_eq!(trade.price, -75);
        assert_eq!(trade.item_amount, 3);
    }

    #[test]
    fn selling_uses_sell_price_and_earns_money() {
        let r = rate(Some(25), Some(18));
        let trade = TradeBuilder::new(&r)
            .player(player())
            .item_amount(-2)
            .build()
            .unwrap();
        assert_eq!(trade.unit_price, 18);
        assert_eq!(trade.price, 36);
    }

    #[test]
    fn closed_buy_side_is_rejected() {
        let r = rate(None, Some(24));
        let result = TradeBuilder::new(&r).player(player()).item_amount(1).build();
        assert!(matches!(
            result,
            Err(LedgerError::MarketClosed {
                side: MarketSide::Buy,
                ..
            })
        ));
    }

    #[test]
    fn closed_sell_side_is_rejected() {
        let r = rate(Some(12), None);
        let result = TradeBuilder::new(&r).player(player()).item_amount(-1).build();
        assert!(matches!(
            result,
            Err(LedgerError::MarketClosed {
                side: MarketSide::Sell,
                ..
            })
        ));
    }

    #[test]
    fn zero_amount_is_rejected() {
        let r = rate(Some(1), Some(1));
        let result = TradeBuilder::new(&r).player(player()).item_amount(0).build();
        assert!(matches!(result, Err(LedgerError::InvalidAmount { .. })));
    }

    #[test]
    fn missing_player_is_rejected() {
        let r = rate(Some(1), Some(1));
        let result = TradeBuilder::new(&r).item_amount(1).build();
        assert_eq!(result, Err(LedgerError::MissingField("player")));
    }

    #[test]
    fn overflowing_price_is_rejected() {
        let r = rate(Some(i64::MAX), Some(1));
        let result = TradeBuilder::new(&r).player(player()).item_amount(2).build();
        assert_eq!(result, Err(LedgerError::Overflow("trade price")));
    }

    #[test]
    fn transfer_drops_zero_lines() {
        let mut items = BTreeMap::new();
        items.insert(ItemName::new("gem"), 2);
        items.insert(ItemName::new("ore"), 0);
        let transfer = TransferBuilder::new(PlayerCode::new("a"), PlayerCode::new("b"))
            .money(5)
            .items(items)
            .build()
            .unwrap();
        assert_eq!(transfer.money, 5);
        assert_eq!(transfer.items.len(), 1);
        assert_eq!(transfer.items[0].item.as_str(), "gem");
    }

    #[test]
    fn transfer_rejects_negative_item() {
        let mut items = BTreeMap::new();
        items.insert(ItemName::new("gem"), -1);
        let result = TransferBuilder::new(PlayerCode::new("a"), PlayerCode::new("b"))
            .items(items)
            .build();
        assert!(matches!(result, Err(LedgerError::InvalidAmount { field, .. }) if field == "items.gem"));
    }

    #[test]
    fn transfer_rejects_negative_money() {
        let result = TransferBuilder::new(PlayerCode::new("a"), PlayerCode::new("b"))
            .money(-1)
            .build();
        assert!(matches!(result, Err(LedgerError::InvalidAmount { field, .. }) if field == "money"));
    }

    #[test]
    fn transfer_to_self_is_rejected() {
        let result = TransferBuilder::new(PlayerCode::new("a"), PlayerCode::new("A")).build();
        assert!(matches!(result, Err(LedgerError::SelfTransfer(_))));
    }
}
