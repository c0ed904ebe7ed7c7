//! The ledger: an append-only log of every economic event.
//!
//! The [`Ledger`] holds all [`LedgerEvent`] values for the running game,
//! keeps the uniqueness indexes for loans and paybacks, and derives player
//! balances by folding the log.
//!
//! # Design
//!
//! - **Append-only**: events are never modified or deleted.
//! - **Derived balances**: no balance is stored; every read folds the log.
//! - **Order-independent**: the fold is a pure sum.
//! - **Atomic commits**: [`Ledger::apply`] validates a whole [`Commit`]
//!   before appending any of it.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use merchant_types::{
    Balances, ExchangeRate, GameEnd, ItemName, Loan, LoanId, LoanPayback, PlayerCode,
    PlayerTransaction, Transaction,
};

use crate::event::{Commit, LedgerEvent};
use crate::transaction::{TradeBuilder, TransferBuilder};
use crate::LedgerError;

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// The central ledger of the game.
///
/// Enforces three invariants on append:
/// 1. At most one loan per (player, round).
/// 2. At most one payback per loan, and only for loans that exist.
/// 3. Nothing is appended after the game has ended.
///
/// Non-negative balances are a post-condition checked by the game engine
/// before it builds a commit; the ledger itself only records.
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    /// All events, in append order.
    events: Vec<LedgerEvent>,
    /// Loan lookup: (player, round) to loan ID.
    loan_keys: BTreeMap<(PlayerCode, u32), LoanId>,
    /// Loan lookup: loan ID to event index.
    loans: BTreeMap<LoanId, usize>,
    /// Payback lookup: loan ID to event index of its payback.
    paybacks: BTreeMap<LoanId, usize>,
    /// Index of the game-ended marker, once appended.
    ended: Option<usize>,
}

impl Ledger {
    /// Create a new empty ledger.
    pub const fn new() -> Self {
        Self {
            events: Vec::new(),
            loan_keys: BTreeMap::new(),
            loans: BTreeMap::new(),
            paybacks: BTreeMap::new(),
            ended: None,
        }
    }

    /// Rebuild a ledger from persisted events.
    ///
    /// Loans must precede their paybacks in `events`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the events violate a ledger invariant.
    pub fn from_events(events: Vec<LedgerEvent>) -> Result<Self, LedgerError> {
        let mut ledger = Self::new();
        ledger.apply(Commit::from_events(events))?;
        Ok(ledger)
    }

    /// Number of events in the ledger.
    pub const fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the ledger has no events.
    pub const fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All events, in append order.
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Validate a commit against the current log without appending it.
    ///
    /// # Errors
    ///
    /// Returns the first invariant the commit would violate.
    pub fn check(&self, commit: &Commit) -> Result<(), LedgerError> {
        let mut pending_keys: BTreeSet<(&PlayerCode, u32)> = BTreeSet::new();
        let mut pending_loans: BTreeSet<LoanId> = BTreeSet::new();
        let mut pending_paybacks: BTreeSet<LoanId> = BTreeSet::new();
        let mut ended = self.ended.is_some();

        for event in commit.events() {
            if ended {
                return Err(LedgerError::GameEnded);
            }
            match event {
                LedgerEvent::Loan(loan) => {
                    let key = (loan.player.clone(), loan.round);
                    if self.loan_keys.contains_key(&key)
                        || !pending_keys.insert((&loan.player, loan.round))
                    {
                        return Err(LedgerError::DuplicateLoan {
                            player: loan.player.clone(),
                            round: loan.round,
                        });
                    }
                    pending_loans.insert(loan.id);
                }
                LedgerEvent::Payback(payback) => {
                    if !self.loans.contains_key(&payback.loan_id)
                        && !pending_loans.contains(&payback.loan_id)
                    {
                        return Err(LedgerError::UnknownLoan(payback.loan_id));
                    }
                    if self.paybacks.contains_key(&payback.loan_id)
                        || !pending_paybacks.insert(payback.loan_id)
                    {
                        return Err(LedgerError::AlreadyRepaid(payback.loan_id));
                    }
                }
                LedgerEvent::Transfer(transfer) => {
                    if transfer.giver == transfer.taker {
                        return Err(LedgerError::SelfTransfer(transfer.giver.clone()));
                    }
                    if transfer.money < 0 || transfer.items.iter().any(|line| line.amount < 0) {
                        return Err(LedgerError::InvalidAmount {
                            field: "transfer".to_owned(),
                            reason: "transferred amounts must not be negative".to_owned(),
                        });
                    }
                }
                LedgerEvent::GameEnded(_) => ended = true,
                LedgerEvent::Trade(_) | LedgerEvent::Liquidation(_) => {}
            }
        }
        Ok(())
    }

    /// Validate and append every event of `commit`, or none of them.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if any event violates a ledger invariant;
    /// the ledger is unchanged in that case.
    pub fn apply(&mut self, commit: Commit) -> Result<(), LedgerError> {
        self.check(&commit)?;
        let count = commit.len();
        for event in commit.into_events() {
            self.push(event);
        }
        tracing::debug!(count, total = self.events.len(), "Applied ledger commit");
        Ok(())
    }

    /// Append events without validating them.
    ///
    /// Used by the audit to fold logs that may violate the append checks.
    pub(crate) fn extend_unchecked(&mut self, events: impl IntoIterator<Item = LedgerEvent>) {
        for event in events {
            self.push(event);
        }
    }

    /// Append an already validated event and update the indexes.
    fn push(&mut self, event: LedgerEvent) {
        let index = self.events.len();
        match &event {
            LedgerEvent::Loan(loan) => {
                self.loan_keys
                    .insert((loan.player.clone(), loan.round), loan.id);
                self.loans.insert(loan.id, index);
            }
            LedgerEvent::Payback(payback) => {
                self.paybacks.insert(payback.loan_id, index);
            }
            LedgerEvent::GameEnded(_) => self.ended = Some(index),
            LedgerEvent::Trade(_) | LedgerEvent::Transfer(_) | LedgerEvent::Liquidation(_) => {}
        }
        self.events.push(event);
    }

    /// Price a market trade against `rate` and append it.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::MarketClosed`] if the selected price side is
    /// absent, or any other [`TradeBuilder`] validation error.
    pub fn append_transaction(
        &mut self,
        player: &PlayerCode,
        rate: &ExchangeRate,
        item_amount: i64,
        created_at: DateTime<Utc>,
    ) -> Result<Transaction, LedgerError> {
        let trade = TradeBuilder::new(rate)
            .player(player.clone())
            .item_amount(item_amount)
            .created_at(created_at)
            .build()?;
        self.apply(LedgerEvent::Trade(trade.clone()).into())?;
        Ok(trade)
    }

    /// Append a transfer of `money` and `items` from `giver` to `taker`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAmount`] if any amount is negative.
    pub fn append_player_transaction(
        &mut self,
        giver: &PlayerCode,
        taker: &PlayerCode,
        money: i64,
        items: BTreeMap<ItemName, i64>,
        created_at: DateTime<Utc>,
    ) -> Result<PlayerTransaction, LedgerError> {
        let transfer = TransferBuilder::new(giver.clone(), taker.clone())
            .money(money)
            .items(items)
            .created_at(created_at)
            .build()?;
        self.apply(LedgerEvent::Transfer(transfer.clone()).into())?;
        Ok(transfer)
    }

    // -----------------------------------------------------------------------
    // Balances
    // -----------------------------------------------------------------------

    /// Derived balances of `player`.
    pub fn balances(&self, player: &PlayerCode) -> Balances {
        fold_balances(player, self.events.iter())
    }

    /// Balances `player` would have if `pending` were appended.
    pub fn projected_balances(&self, player: &PlayerCode, pending: &Commit) -> Balances {
        fold_balances(player, self.events.iter().chain(pending.events()))
    }

    /// Derived balances of every player that appears in the ledger.
    pub fn all_balances(&self) -> BTreeMap<PlayerCode, Balances> {
        let mut all: BTreeMap<PlayerCode, Balances> = BTreeMap::new();
        for event in &self.events {
            for (player, delta) in event_deltas(event) {
                let balances = all.entry(player.clone()).or_insert_with(Balances::opening);
                delta.apply_to(balances);
            }
        }
        for balances in all.values_mut() {
            balances.items.retain(|_, amount| *amount != 0);
        }
        all
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Market trades of `player`, in append order.
    pub fn transactions_for(&self, player: &PlayerCode) -> Vec<&Transaction> {
        self.events
            .iter()
            .filter_map(|e| match e {
                LedgerEvent::Trade(t) if &t.player == player => Some(t),
                _ => None,
            })
            .collect()
    }

    /// Transfers given or taken by `player`, in append order.
    pub fn transfers_for(&self, player: &PlayerCode) -> Vec<&PlayerTransaction> {
        self.events
            .iter()
            .filter_map(|e| match e {
                LedgerEvent::Transfer(t) if &t.giver == player || &t.taker == player => Some(t),
                _ => None,
            })
            .collect()
    }

    /// Loans of `player`, in append order.
    pub fn loans_for(&self, player: &PlayerCode) -> Vec<&Loan> {
        self.loans()
            .into_iter()
            .filter(|loan| &loan.player == player)
            .collect()
    }

    /// Every loan, in append order.
    pub fn loans(&self) -> Vec<&Loan> {
        self.events
            .iter()
            .filter_map(|e| match e {
                LedgerEvent::Loan(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    /// Loans without a payback, in append order.
    pub fn outstanding_loans(&self) -> Vec<&Loan> {
        self.loans()
            .into_iter()
            .filter(|loan| !self.paybacks.contains_key(&loan.id))
            .collect()
    }

    /// Look up a loan by ID.
    pub fn loan(&self, id: LoanId) -> Option<&Loan> {
        let index = *self.loans.get(&id)?;
        match self.events.get(index) {
            Some(LedgerEvent::Loan(loan)) => Some(loan),
            _ => None,
        }
    }

    /// The loan `player` took in `round`, if any.
    pub fn loan_for_round(&self, player: &PlayerCode, round: u32) -> Option<&Loan> {
        let id = *self.loan_keys.get(&(player.clone(), round))?;
        self.loan(id)
    }

    /// The payback of a loan, if it has been repaid.
    pub fn payback_for(&self, loan: LoanId) -> Option<&LoanPayback> {
        let index = *self.paybacks.get(&loan)?;
        match self.events.get(index) {
            Some(LedgerEvent::Payback(payback)) => Some(payback),
            _ => None,
        }
    }

    /// The game-ended marker, if the game has ended.
    pub fn game_end(&self) -> Option<&GameEnd> {
        match self.events.get(self.ended?) {
            Some(LedgerEvent::GameEnded(end)) => Some(end),
            _ => None,
        }
    }

    /// Whether the game has ended.
    pub const fn is_ended(&self) -> bool {
        self.ended.is_some()
    }
}

// ---------------------------------------------------------------------------
// Fold
// ---------------------------------------------------------------------------

/// The signed effect of one event on one player.
#[derive(Debug, Default)]
struct Delta<'a> {
    money: i64,
    items: Vec<(&'a ItemName, i64)>,
}

impl Delta<'_> {
    fn apply_to(&self, balances: &mut Balances) {
        balances.money = balances.money.saturating_add(self.money);
        for (item, amount) in &self.items {
            let held = balances.items.entry((*item).clone()).or_insert(0);
            *held = held.saturating_add(*amount);
        }
    }
}

/// Per-player deltas produced by one event.
fn event_deltas(event: &LedgerEvent) -> Vec<(&PlayerCode, Delta<'_>)> {
    match event {
        LedgerEvent::Trade(t) => vec![(
            &t.player,
            Delta {
                money: t.price,
                items: vec![(&t.item, t.item_amount)],
            },
        )],
        LedgerEvent::Transfer(t) => {
            let given = Delta {
                money: t.money.saturating_neg(),
                items: t
                    .items
                    .iter()
                    .map(|line| (&line.item, line.amount.saturating_neg()))
                    .collect(),
            };
            let taken = Delta {
                money: t.money,
                items: t.items.iter().map(|line| (&line.item, line.amount)).collect(),
            };
            vec![(&t.giver, given), (&t.taker, taken)]
        }
        LedgerEvent::Loan(l) => vec![(
            &l.player,
            Delta {
                money: l.amount,
                items: Vec::new(),
            },
        )],
        LedgerEvent::Payback(p) => vec![(
            &p.player,
            Delta {
                money: p.payback_amount.saturating_neg(),
                items: Vec::new(),
            },
        )],
        LedgerEvent::Liquidation(l) => vec![(
            &l.player,
            Delta {
                money: l.proceeds,
                items: vec![(&l.item, l.amount.saturating_neg())],
            },
        )],
        LedgerEvent::GameEnded(_) => Vec::new(),
    }
}

/// Fold `events` into the balances of `player`.
fn fold_balances<'a>(
    player: &PlayerCode,
    events: impl Iterator<Item = &'a LedgerEvent>,
) -> Balances {
    let mut balances = Balances::opening();
    for event in events.filter(|e| e.involves(player)) {
        for (who, delta) in event_deltas(event) {
            if who == player {
                delta.apply_to(&mut balances);
            }
        }
    }
    balances.items.retain(|_, amount| *amount != 0);
    balances
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use merchant_types::{CityName, LoanPaybackId};

    use super::*;

    fn code(s: &str) -> PlayerCode {
        PlayerCode::new(s)
    }

    fn rate(item: &str, buy: Option<i64>, sell: Option<i64>) -> ExchangeRate {
        ExchangeRate {
            city: CityName::new("Debrecen"),
            round: 1,
            item: ItemName::new(item),
            buy_price: buy,
            sell_price: sell,
        }
    }

    fn loan(player: &str, round: u32, amount: i64) -> Loan {
        Loan {
            id: LoanId::new(),
            player: code(player),
            round,
            amount,
            created_at: Utc::now(),
        }
    }

    fn payback(loan: &Loan, round: u32, amount: i64) -> LoanPayback {
        LoanPayback {
            id: LoanPaybackId::new(),
            loan_id: loan.id,
            player: loan.player.clone(),
            round,
            payback_amount: amount,
            created_at: Utc::now(),
        }
    }

    fn items(pairs: &[(&str, i64)]) -> BTreeMap<ItemName, i64> {
        pairs
            .iter()
            .map(|(name, amount)| (ItemName::new(*name), *amount))
            .collect()
    }

    #[test]
    fn new_ledger_is_empty() {
        let ledger = Ledger::new();
        assert!(ledger.is_empty());
        assert_eq!(ledger.len(), 0);
        assert!(!ledger.is_ended());
    }

    #[test]
    fn untouched_player_has_starting_stake() {
        let ledger = Ledger::new();
        let balances = ledger.balances(&code("a"));
        assert_eq!(balances.money, 1000);
        assert!(balances.items.is_empty());
    }

    #[test]
    fn trades_fold_into_money_and_items() {
        let mut ledger = Ledger::new();
        let a = code("a");
        let wood = rate("wood", Some(16), Some(14));

        ledger.append_transaction(&a, &wood, 10, Utc::now()).unwrap();
        ledger.append_transaction(&a, &wood, -4, Utc::now()).unwrap();

        let balances = ledger.balances(&a);
        assert_eq!(balances.money, 1000 - 160 + 56);
        assert_eq!(balances.item("wood"), 6);
    }

    #[test]
    fn closed_market_appends_nothing() {
        let mut ledger = Ledger::new();
        let result = ledger.append_transaction(
            &code("a"),
            &rate("ore", None, Some(6)),
            1,
            Utc::now(),
        );
        assert!(matches!(result, Err(LedgerError::MarketClosed { .. })));
        assert!(ledger.is_empty());
    }

    #[test]
    fn transfer_moves_money_and_items_between_players() {
        let mut ledger = Ledger::new();
        let a = code("a");
        let b = code("b");
        ledger
            .append_transaction(&a, &rate("gem", Some(10), Some(8)), 5, Utc::now())
            .unwrap();

        ledger
            .append_player_transaction(&a, &b, 100, items(&[("gem", 2)]), Utc::now())
            .unwrap();

        let a_bal = ledger.balances(&a);
        let b_bal = ledger.balances(&b);
        assert_eq!(a_bal.money, 1000 - 50 - 100);
        assert_eq!(a_bal.item("gem"), 3);
        assert_eq!(b_bal.money, 1100);
        assert_eq!(b_bal.item("gem"), 2);
    }

    #[test]
    fn negative_transfer_is_rejected() {
        let mut ledger = Ledger::new();
        let result =
            ledger.append_player_transaction(&code("a"), &code("b"), -1, BTreeMap::new(), Utc::now());
        assert!(matches!(result, Err(LedgerError::InvalidAmount { .. })));
        assert!(ledger.is_empty());
    }

    #[test]
    fn loan_and_payback_change_money() {
        let mut ledger = Ledger::new();
        let l = loan("a", 1, 500);
        let p = payback(&l, 3, 600);
        ledger.apply(LedgerEvent::Loan(l.clone()).into()).unwrap();
        assert_eq!(ledger.balances(&code("a")).money, 1500);
        assert_eq!(ledger.outstanding_loans().len(), 1);

        ledger.apply(LedgerEvent::Payback(p).into()).unwrap();
        assert_eq!(ledger.balances(&code("a")).money, 900);
        assert!(ledger.outstanding_loans().is_empty());
        assert_eq!(ledger.payback_for(l.id).map(|p| p.round), Some(3));
    }

    #[test]
    fn second_loan_in_same_round_is_rejected() {
        let mut ledger = Ledger::new();
        ledger
            .apply(LedgerEvent::Loan(loan("a", 2, 600)).into())
            .unwrap();
        let result = ledger.apply(LedgerEvent::Loan(loan("a", 2, 600)).into());
        assert!(matches!(result, Err(LedgerError::DuplicateLoan { round: 2, .. })));
        assert_eq!(ledger.len(), 1);

        // Another round or another player is fine.
        assert!(ledger.apply(LedgerEvent::Loan(loan("a", 3, 700)).into()).is_ok());
        assert!(ledger.apply(LedgerEvent::Loan(loan("b", 2, 600)).into()).is_ok());
    }

    #[test]
    fn duplicate_loan_within_one_commit_is_rejected() {
        let mut ledger = Ledger::new();
        let mut commit = Commit::new();
        commit.push(LedgerEvent::Loan(loan("a", 1, 500)));
        commit.push(LedgerEvent::Loan(loan("a", 1, 500)));
        assert!(matches!(
            ledger.apply(commit),
            Err(LedgerError::DuplicateLoan { .. })
        ));
        assert!(ledger.is_empty());
    }

    #[test]
    fn second_payback_is_rejected() {
        let mut ledger = Ledger::new();
        let l = loan("a", 1, 500);
        ledger.apply(LedgerEvent::Loan(l.clone()).into()).unwrap();
        ledger
            .apply(LedgerEvent::Payback(payback(&l, 1, 500)).into())
            .unwrap();
        let result = ledger.apply(LedgerEvent::Payback(payback(&l, 2, 550)).into());
        assert_eq!(result, Err(LedgerError::AlreadyRepaid(l.id)));
    }

    #[test]
    fn payback_of_unknown_loan_is_rejected() {
        let mut ledger = Ledger::new();
        let l = loan("a", 1, 500);
        let result = ledger.apply(LedgerEvent::Payback(payback(&l, 1, 500)).into());
        assert_eq!(result, Err(LedgerError::UnknownLoan(l.id)));
    }

    #[test]
    fn nothing_is_appended_after_game_end() {
        let mut ledger = Ledger::new();
        ledger
            .apply(
                LedgerEvent::GameEnded(GameEnd {
                    round: 6,
                    ended_at: Utc::now(),
                })
                .into(),
            )
            .unwrap();
        assert!(ledger.is_ended());
        assert_eq!(ledger.game_end().map(|e| e.round), Some(6));

        let result = ledger.apply(LedgerEvent::Loan(loan("a", 6, 1000)).into());
        assert_eq!(result, Err(LedgerError::GameEnded));
    }

    #[test]
    fn projected_balances_include_pending_events() {
        let ledger = Ledger::new();
        let a = code("a");
        let trade = TradeBuilder::new(&rate("ore", Some(5), Some(4)))
            .player(a.clone())
            .item_amount(7)
            .build()
            .unwrap();
        let pending = Commit::from(LedgerEvent::Trade(trade));

        let projected = ledger.projected_balances(&a, &pending);
        assert_eq!(projected.money, 965);
        assert_eq!(projected.item("ore"), 7);
        // The ledger itself is untouched.
        assert_eq!(ledger.balances(&a).money, 1000);
    }

    #[test]
    fn fold_is_order_independent() {
        let a = code("a");
        let b = code("b");
        let l = loan("a", 1, 500);
        let t = TradeBuilder::new(&rate("gem", Some(10), Some(8)))
            .player(a.clone())
            .item_amount(4)
            .build()
            .unwrap();
        let g = TransferBuilder::new(a.clone(), b.clone())
            .money(30)
            .items(items(&[("gem", 1)]))
            .build()
            .unwrap();

        let forward = vec![
            LedgerEvent::Loan(l.clone()),
            LedgerEvent::Trade(t.clone()),
            LedgerEvent::Transfer(g.clone()),
        ];
        let backward = vec![
            LedgerEvent::Transfer(g),
            LedgerEvent::Trade(t),
            LedgerEvent::Loan(l),
        ];

        let one = Ledger::from_events(forward).unwrap();
        let two = Ledger::from_events(backward).unwrap();
        assert_eq!(one.balances(&a), two.balances(&a));
        assert_eq!(one.balances(&b), two.balances(&b));
        assert_eq!(one.all_balances(), two.all_balances());
    }

    #[test]
    fn all_balances_covers_every_player_in_the_log() {
        let mut ledger = Ledger::new();
        ledger
            .append_player_transaction(&code("a"), &code("b"), 10, BTreeMap::new(), Utc::now())
            .unwrap();
        let all = ledger.all_balances();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get(&code("a")).map(|b| b.money), Some(990));
        assert_eq!(all.get(&code("b")).map(|b| b.money), Some(1010));
    }

    #[test]
    fn zero_holdings_are_omitted() {
        let mut ledger = Ledger::new();
        let a = code("a");
        let wood = rate("wood", Some(10), Some(10));
        ledger.append_transaction(&a, &wood, 3, Utc::now()).unwrap();
        ledger.append_transaction(&a, &wood, -3, Utc::now()).unwrap();
        let balances = ledger.balances(&a);
        assert!(balances.items.is_empty());
        assert_eq!(balances.money, 1000);
    }
}
