//! The trade and transfer orchestrator.
//!
//! [`Exchange`] owns the game data, the price book, the player roster and
//! the ledger. Every gameplay operation runs in two phases:
//!
//! 1. **Plan**: validate the request against the clock, the price book and
//!    the current derived balances, and build a [`Planned`] record plus the
//!    [`Commit`] that would realise it. Planning never mutates anything.
//! 2. **Apply**: append the commit to the ledger.
//!
//! The split lets a caller persist the commit between the two phases, so a
//! storage failure leaves the in-memory ledger untouched. Callers that do
//! not persist use the one-step methods ([`Exchange::buy`],
//! [`Exchange::gift`], ...), which plan and apply in one call.
//!
//! All validation happens in the plan phase; an operation that fails
//! produces no ledger events.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use merchant_ledger::{AuditResult, Commit, Ledger, LedgerEvent, TradeBuilder, TransferBuilder};
use merchant_types::{
    Balances, ExchangeRate, GameData, GameEnd, ItemName, Liquidation, LiquidationId, Loan, LoanId,
    LoanPayback, LoanPaybackId, PlayerCode, PlayerTransaction, RobTarget, Transaction,
};

use crate::clock::{RoundClock, RoundStatus};
use crate::loans::{loan_amount, payback_amount};
use crate::price_book::PriceBook;
use crate::GameError;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// A validated operation that has not been applied yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Planned<T> {
    /// The primary record the operation creates.
    pub record: T,
    /// Every ledger event the operation appends.
    pub commit: Commit,
}

impl<T> Planned<T> {
    /// Pair a record with its commit.
    pub const fn new(record: T, commit: Commit) -> Self {
        Self { record, commit }
    }
}

/// The loan a player would receive if they borrowed now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoanQuote {
    /// The current round.
    pub round: u32,
    /// Principal of a loan taken in this round.
    pub amount: i64,
    /// Whether the player already has a loan in this round.
    pub taken: bool,
}

/// A loan together with its settlement state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanStatus {
    /// The loan.
    pub loan: Loan,
    /// The payback, once repaid.
    pub payback: Option<LoanPayback>,
    /// Amount due if repaid in the current round; `None` once repaid.
    pub amount_due: Option<i64>,
}

/// One row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    /// 1-based position.
    pub rank: usize,
    /// The player.
    pub player: PlayerCode,
    /// Money held.
    pub money: i64,
    /// Items held.
    pub items: BTreeMap<ItemName, i64>,
}

/// A committed trade and the trader's balances right after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeOutcome {
    /// The recorded trade.
    pub transaction: Transaction,
    /// The trader's money and items after the trade.
    #[serde(flatten)]
    pub balances: Balances,
}

/// Everything known about one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerReport {
    /// The player.
    pub player: PlayerCode,
    /// Derived balances.
    pub balances: Balances,
    /// Market trades, oldest first.
    pub transactions: Vec<Transaction>,
    /// Transfers given or taken, oldest first.
    pub transfers: Vec<PlayerTransaction>,
    /// Loans with their settlement state.
    pub loans: Vec<LoanStatus>,
}

// ---------------------------------------------------------------------------
// Exchange
// ---------------------------------------------------------------------------

/// The game engine: reference data, players and the ledger.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// Clock and loan terms.
    game: GameData,
    /// Items, cities, rounds and rates.
    prices: PriceBook,
    /// Known player codes.
    players: BTreeSet<PlayerCode>,
    /// The event log.
    ledger: Ledger,
}

impl Exchange {
    /// Assemble an exchange from loaded state.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfig`] if the price book has no rounds
    /// or the game data cannot drive a clock.
    pub fn new(
        game: GameData,
        prices: PriceBook,
        players: impl IntoIterator<Item = PlayerCode>,
        ledger: Ledger,
    ) -> Result<Self, GameError> {
        let exchange = Self {
            game,
            prices,
            players: players.into_iter().collect(),
            ledger,
        };
        exchange.clock()?;
        tracing::info!(
            players = exchange.players.len(),
            events = exchange.ledger.len(),
            ended = exchange.ledger.is_ended(),
            "Exchange ready"
        );
        Ok(exchange)
    }

    /// Current game data.
    pub const fn game_data(&self) -> &GameData {
        &self.game
    }

    /// Replace the game data.
    ///
    /// Loans and paybacks already recorded keep their frozen amounts.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfig`] if the new data cannot drive a
    /// clock or has negative loan terms.
    pub fn set_game_data(&mut self, game: GameData) -> Result<(), GameError> {
        validate_game_data(&game)?;
        let last_round = self.last_round()?;
        RoundClock::new(&game, last_round)?;
        tracing::info!(
            starting_time = %game.starting_time,
            round_duration = game.round_duration,
            starting_loan = game.starting_loan,
            loan_increase = game.loan_increase,
            loan_interest = game.loan_interest,
            "Game data updated"
        );
        self.game = game;
        Ok(())
    }

    /// Reference data.
    pub const fn prices(&self) -> &PriceBook {
        &self.prices
    }

    /// The event log.
    pub const fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Every known player code, ascending.
    pub fn players(&self) -> impl Iterator<Item = &PlayerCode> {
        self.players.iter()
    }

    /// Resolve a player code (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotFound`] if no such player exists.
    pub fn player(&self, code: &str) -> Result<PlayerCode, GameError> {
        let code = PlayerCode::new(code);
        if self.players.contains(&code) {
            Ok(code)
        } else {
            Err(GameError::not_found("player", code))
        }
    }

    // -----------------------------------------------------------------------
    // Clock
    // -----------------------------------------------------------------------

    fn last_round(&self) -> Result<u32, GameError> {
        self.prices
            .last_round()
            .ok_or_else(|| GameError::InvalidConfig("no rounds are defined".to_owned()))
    }

    /// The round clock for the current game data.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidConfig`] if no rounds exist or the round
    /// duration is zero.
    pub fn clock(&self) -> Result<RoundClock, GameError> {
        Ok(RoundClock::new(&self.game, self.last_round()?)?)
    }

    /// The round in progress at `now`.
    ///
    /// # Errors
    ///
    /// See [`Exchange::clock`].
    pub fn current_round(&self, now: DateTime<Utc>) -> Result<u32, GameError> {
        Ok(self.clock()?.current_round(now))
    }

    /// Round number, remaining seconds and freeze state at `now`.
    ///
    /// # Errors
    ///
    /// See [`Exchange::clock`].
    pub fn round_status(&self, now: DateTime<Utc>) -> Result<RoundStatus, GameError> {
        Ok(self.clock()?.status(now))
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The rate for `(city, round, item)`.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotFound`] if no such rate exists.
    pub fn rate(&self, city: &str, round: u32, item: &str) -> Result<&ExchangeRate, GameError> {
        self.prices.rate(city, round, item)
    }

    /// The rates of `city` in the round in progress at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotFound`] if the city is unknown.
    pub fn current_rates(
        &self,
        city: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<&ExchangeRate>, GameError> {
        let round = self.current_round(now)?;
        self.prices.city_rates(city, round)
    }

    /// Derived balances of a player.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotFound`] if no such player exists.
    pub fn balances(&self, code: &str) -> Result<Balances, GameError> {
        let player = self.player(code)?;
        Ok(self.ledger.balances(&player))
    }

    /// Balances of every player, including players with no activity.
    pub fn all_balances(&self) -> BTreeMap<PlayerCode, Balances> {
        let mut all = self.ledger.all_balances();
        for player in &self.players {
            all.entry(player.clone()).or_insert_with(Balances::opening);
        }
        all
    }

    /// Players ordered by money (richest first), ties broken by code.
    pub fn leaderboard(&self) -> Vec<Standing> {
        let mut rows: Vec<(PlayerCode, Balances)> = self.all_balances().into_iter().collect();
        rows.sort_by(|(a_code, a), (b_code, b)| {
            b.money.cmp(&a.money).then_with(|| a_code.cmp(b_code))
        });
        rows.into_iter()
            .zip(1_usize..)
            .map(|((player, balances), rank)| Standing {
                rank,
                player,
                money: balances.money,
                items: balances.items,
            })
            .collect()
    }

    /// The loan `code` would receive if it borrowed now.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotFound`] for an unknown player.
    pub fn loan_quote(&self, code: &str, now: DateTime<Utc>) -> Result<LoanQuote, GameError> {
        let player = self.player(code)?;
        let round = self.current_round(now)?;
        Ok(LoanQuote {
            round,
            amount: loan_amount(&self.game, round)?,
            taken: self.ledger.loan_for_round(&player, round).is_some(),
        })
    }

    /// Settlement state of one loan at `now`.
    fn loan_status(&self, loan: &Loan, round: u32) -> Result<LoanStatus, GameError> {
        let payback = self.ledger.payback_for(loan.id).cloned();
        let amount_due = match payback {
            Some(_) => None,
            None => Some(payback_amount(loan, self.game.loan_interest, round)?),
        };
        Ok(LoanStatus {
            loan: loan.clone(),
            payback,
            amount_due,
        })
    }

    /// Loans of a player with the amount due if repaid now.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotFound`] for an unknown player.
    pub fn loans_for(&self, code: &str, now: DateTime<Utc>) -> Result<Vec<LoanStatus>, GameError> {
        let player = self.player(code)?;
        let round = self.current_round(now)?;
        self.ledger
            .loans_for(&player)
            .into_iter()
            .map(|loan| self.loan_status(loan, round))
            .collect()
    }

    /// Every unpaid loan with the amount due if repaid now.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Overflow`] if an amount cannot be computed.
    pub fn outstanding_loans(&self, now: DateTime<Utc>) -> Result<Vec<LoanStatus>, GameError> {
        let round = self.current_round(now)?;
        self.ledger
            .outstanding_loans()
            .into_iter()
            .map(|loan| self.loan_status(loan, round))
            .collect()
    }

    /// Balances and history of one player.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotFound`] for an unknown player.
    pub fn player_report(&self, code: &str, now: DateTime<Utc>) -> Result<PlayerReport, GameError> {
        let player = self.player(code)?;
        Ok(PlayerReport {
            balances: self.ledger.balances(&player),
            transactions: self
                .ledger
                .transactions_for(&player)
                .into_iter()
                .cloned()
                .collect(),
            transfers: self
                .ledger
                .transfers_for(&player)
                .into_iter()
                .cloned()
                .collect(),
            loans: self.loans_for(player.as_str(), now)?,
            player,
        })
    }

    /// Verify the ledger's solvency and uniqueness invariants.
    pub fn audit(&self) -> AuditResult {
        self.ledger.audit()
    }

    /// Whether the game has ended.
    pub const fn is_ended(&self) -> bool {
        self.ledger.is_ended()
    }

    // -----------------------------------------------------------------------
    // Plan
    // -----------------------------------------------------------------------

    fn ensure_running(&self) -> Result<(), GameError> {
        if self.ledger.is_ended() {
            return Err(GameError::GameEnded);
        }
        Ok(())
    }

    /// Check that `player` stays solvent once `commit` is appended.
    fn ensure_solvent(&self, player: &PlayerCode, commit: &Commit) -> Result<(), GameError> {
        let current = self.ledger.balances(player);
        let projected = self.ledger.projected_balances(player, commit);

        if projected.money < 0 {
            return Err(GameError::InsufficientFunds {
                player: player.clone(),
                available: current.money,
                required: current.money.saturating_sub(projected.money),
            });
        }
        if let Some((item, amount)) = projected.first_negative_item() {
            let available = current.item(item.as_str());
            return Err(GameError::InsufficientItems {
                player: player.clone(),
                item: item.clone(),
                available,
                required: available.saturating_sub(amount),
            });
        }
        Ok(())
    }

    fn plan_trade(
        &self,
        code: &str,
        city: &str,
        item: &str,
        item_amount: i64,
        now: DateTime<Utc>,
    ) -> Result<Planned<Transaction>, GameError> {
        self.ensure_running()?;
        let player = self.player(code)?;
        let round = self.current_round(now)?;
        let rate = self.prices.rate(city, round, item)?;

        let trade = TradeBuilder::new(rate)
            .player(player.clone())
            .item_amount(item_amount)
            .created_at(now)
            .build()?;
        let commit = Commit::from(LedgerEvent::Trade(trade.clone()));
        self.ensure_solvent(&player, &commit)?;
        Ok(Planned::new(trade, commit))
    }

    /// Plan buying `amount` units of `item` in `city` at the current
    /// round's buy price.
    ///
    /// # Errors
    ///
    /// [`GameError::InvalidAmount`] for a non-positive amount,
    /// [`GameError::NotFound`], [`GameError::MarketClosed`],
    /// [`GameError::InsufficientFunds`] or [`GameError::GameEnded`].
    pub fn plan_buy(
        &self,
        code: &str,
        city: &str,
        item: &str,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<Planned<Transaction>, GameError> {
        if amount <= 0 {
            return Err(GameError::invalid_amount("amount", "must be positive"));
        }
        self.plan_trade(code, city, item, amount, now)
    }

    /// Plan selling `amount` units of `item` in `city` at the current
    /// round's sell price.
    ///
    /// # Errors
    ///
    /// [`GameError::InvalidAmount`] for a non-positive amount,
    /// [`GameError::NotFound`], [`GameError::MarketClosed`],
    /// [`GameError::InsufficientItems`] or [`GameError::GameEnded`].
    pub fn plan_sell(
        &self,
        code: &str,
        city: &str,
        item: &str,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<Planned<Transaction>, GameError> {
        if amount <= 0 {
            return Err(GameError::invalid_amount("amount", "must be positive"));
        }
        let item_amount = amount
            .checked_neg()
            .ok_or(GameError::Overflow("sell amount"))?;
        self.plan_trade(code, city, item, item_amount, now)
    }

    /// Plan a voluntary transfer of `money` and `items` from `giver` to
    /// `taker`.
    ///
    /// Every amount must be non-negative and covered by the giver's
    /// holdings, and the gift must move something.
    ///
    /// # Errors
    ///
    /// [`GameError::InvalidAmount`], [`GameError::NotFound`],
    /// [`GameError::SelfTransfer`] or [`GameError::GameEnded`].
    pub fn plan_gift(
        &self,
        giver: &str,
        taker: &str,
        money: i64,
        items: &BTreeMap<String, i64>,
        now: DateTime<Utc>,
    ) -> Result<Planned<PlayerTransaction>, GameError> {
        self.ensure_running()?;
        let giver = self.player(giver)?;
        let taker = self.player(taker)?;
        if giver == taker {
            return Err(GameError::SelfTransfer(giver));
        }

        let held = self.ledger.balances(&giver);
        if money < 0 {
            return Err(GameError::invalid_amount("money", "must not be negative"));
        }
        if money > held.money {
            return Err(GameError::invalid_amount(
                "money",
                format!("exceeds balance of {}", held.money),
            ));
        }

        let mut lines = BTreeMap::new();
        for (name, amount) in items {
            let item = self.prices.item(name)?;
            let field = format!("items.{}", item.name);
            if *amount < 0 {
                return Err(GameError::invalid_amount(field, "must not be negative"));
            }
            let available = held.item(item.name.as_str());
            if *amount > available {
                return Err(GameError::invalid_amount(
                    field,
                    format!("exceeds holding of {available}"),
                ));
            }
            if *amount > 0 {
                lines.insert(item.name.clone(), *amount);
            }
        }
        if money == 0 && lines.is_empty() {
            return Err(GameError::invalid_amount("gift", "moves nothing"));
        }

        let transfer = TransferBuilder::new(giver, taker)
            .money(money)
            .items(lines)
            .created_at(now)
            .build()?;
        let commit = Commit::from(LedgerEvent::Transfer(transfer.clone()));
        Ok(Planned::new(transfer, commit))
    }

    /// Plan robbing `target`: `actor` takes either all of the target's
    /// money or all of its items.
    ///
    /// # Errors
    ///
    /// [`GameError::NotFound`], [`GameError::SelfTransfer`] or
    /// [`GameError::GameEnded`].
    pub fn plan_rob(
        &self,
        actor: &str,
        target: &str,
        what: RobTarget,
        now: DateTime<Utc>,
    ) -> Result<Planned<PlayerTransaction>, GameError> {
        self.ensure_running()?;
        let actor = self.player(actor)?;
        let target = self.player(target)?;
        if actor == target {
            return Err(GameError::SelfTransfer(actor));
        }

        let held = self.ledger.balances(&target);
        let builder = TransferBuilder::new(target, actor).created_at(now);
        let builder = match what {
            RobTarget::Money => builder.money(held.money.max(0)),
            RobTarget::Items => builder.items(
                held.items
                    .into_iter()
                    .filter(|(_, amount)| *amount > 0)
                    .collect(),
            ),
        };
        let transfer = builder.build()?;
        let commit = Commit::from(LedgerEvent::Transfer(transfer.clone()));
        Ok(Planned::new(transfer, commit))
    }

    /// Plan a loan for `code` in `round` (the current round when `None`).
    ///
    /// # Errors
    ///
    /// [`GameError::NotFound`] for an unknown player or round,
    /// [`GameError::FutureRound`], [`GameError::DuplicateLoan`] or
    /// [`GameError::GameEnded`].
    pub fn plan_loan(
        &self,
        code: &str,
        round: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Planned<Loan>, GameError> {
        self.ensure_running()?;
        let player = self.player(code)?;
        let current = self.current_round(now)?;
        let round = round.unwrap_or(current);

        if !self.prices.has_round(round) {
            return Err(GameError::not_found("round", round));
        }
        if round > current {
            return Err(GameError::FutureRound {
                requested: round,
                current,
            });
        }
        if self.ledger.loan_for_round(&player, round).is_some() {
            return Err(GameError::DuplicateLoan { player, round });
        }

        let loan = Loan {
            id: LoanId::new(),
            player,
            round,
            amount: loan_amount(&self.game, round)?,
            created_at: now,
        };
        let commit = Commit::from(LedgerEvent::Loan(loan.clone()));
        Ok(Planned::new(loan, commit))
    }

    /// Plan repaying a loan in the current round.
    ///
    /// # Errors
    ///
    /// [`GameError::NotFound`] for an unknown loan,
    /// [`GameError::AlreadyRepaid`], [`GameError::InsufficientFunds`] or
    /// [`GameError::GameEnded`].
    pub fn plan_payback(
        &self,
        loan_id: LoanId,
        now: DateTime<Utc>,
    ) -> Result<Planned<LoanPayback>, GameError> {
        self.ensure_running()?;
        let loan = self
            .ledger
            .loan(loan_id)
            .ok_or_else(|| GameError::not_found("loan", loan_id))?;
        if self.ledger.payback_for(loan_id).is_some() {
            return Err(GameError::AlreadyRepaid(loan_id));
        }

        let round = self.current_round(now)?;
        let payback = LoanPayback {
            id: LoanPaybackId::new(),
            loan_id,
            player: loan.player.clone(),
            round,
            payback_amount: payback_amount(loan, self.game.loan_interest, round)?,
            created_at: now,
        };
        let commit = Commit::from(LedgerEvent::Payback(payback.clone()));
        self.ensure_solvent(&loan.player, &commit)?;
        Ok(Planned::new(payback, commit))
    }

    /// Plan the end of the game.
    ///
    /// Every held item is sold at its ending price, then every outstanding
    /// loan is repaid at the current round's payback amount, then the game
    /// is marked ended. The forced paybacks may leave a player with
    /// negative money.
    ///
    /// # Errors
    ///
    /// [`GameError::GameEnded`] if the game has already ended.
    pub fn plan_end_game(&self, now: DateTime<Utc>) -> Result<Planned<GameEnd>, GameError> {
        self.ensure_running()?;
        let round = self.current_round(now)?;
        let mut commit = Commit::new();

        for (player, balances) in self.ledger.all_balances() {
            for (item, amount) in balances.items.iter().filter(|(_, amount)| **amount > 0) {
                let ending_price = self.prices.item(item.as_str())?.ending_price;
                let proceeds = amount
                    .checked_mul(ending_price)
                    .ok_or(GameError::Overflow("liquidation proceeds"))?;
                commit.push(LedgerEvent::Liquidation(Liquidation {
                    id: LiquidationId::new(),
                    player: player.clone(),
                    item: item.clone(),
                    amount: *amount,
                    ending_price,
                    proceeds,
                    created_at: now,
                }));
            }
        }

        for loan in self.ledger.outstanding_loans() {
            commit.push(LedgerEvent::Payback(LoanPayback {
                id: LoanPaybackId::new(),
                loan_id: loan.id,
                player: loan.player.clone(),
                round,
                payback_amount: payback_amount(loan, self.game.loan_interest, round)?,
                created_at: now,
            }));
        }

        let end = GameEnd {
            round,
            ended_at: now,
        };
        commit.push(LedgerEvent::GameEnded(end.clone()));
        Ok(Planned::new(end, commit))
    }

    // -----------------------------------------------------------------------
    // Apply
    // -----------------------------------------------------------------------

    /// Append a planned commit to the ledger.
    ///
    /// # Errors
    ///
    /// Returns the ledger's rejection if the commit no longer fits (e.g. a
    /// concurrent loan in the same round was applied first).
    pub fn apply(&mut self, commit: Commit) -> Result<(), GameError> {
        let kind = commit.events().last().map_or("empty", LedgerEvent::kind);
        let events = commit.len();
        self.ledger.apply(commit)?;
        tracing::info!(kind, events, total = self.ledger.len(), "Committed game operation");
        Ok(())
    }

    /// Apply a planned operation and return its record.
    ///
    /// # Errors
    ///
    /// See [`Exchange::apply`].
    pub fn commit<T>(&mut self, planned: Planned<T>) -> Result<T, GameError> {
        self.apply(planned.commit)?;
        Ok(planned.record)
    }

    /// Pair a committed trade with the trader's current balances.
    pub fn trade_outcome(&self, transaction: Transaction) -> TradeOutcome {
        let balances = self.ledger.balances(&transaction.player);
        TradeOutcome {
            transaction,
            balances,
        }
    }

    /// Buy and apply in one step. See [`Exchange::plan_buy`].
    ///
    /// # Errors
    ///
    /// See [`Exchange::plan_buy`].
    pub fn buy(
        &mut self,
        code: &str,
        city: &str,
        item: &str,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<TradeOutcome, GameError> {
        let planned = self.plan_buy(code, city, item, amount, now)?;
        let transaction = self.commit(planned)?;
        Ok(self.trade_outcome(transaction))
    }

    /// Sell and apply in one step. See [`Exchange::plan_sell`].
    ///
    /// # Errors
    ///
    /// See [`Exchange::plan_sell`].
    pub fn sell(
        &mut self,
        code: &str,
        city: &str,
        item: &str,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<TradeOutcome, GameError> {
        let planned = self.plan_sell(code, city, item, amount, now)?;
        let transaction = self.commit(planned)?;
        Ok(self.trade_outcome(transaction))
    }

    /// Gift and apply in one step. See [`Exchange::plan_gift`].
    ///
    /// # Errors
    ///
    /// See [`Exchange::plan_gift`].
    pub fn gift(
        &mut self,
        giver: &str,
        taker: &str,
        money: i64,
        items: &BTreeMap<String, i64>,
        now: DateTime<Utc>,
    ) -> Result<PlayerTransaction, GameError> {
        let planned = self.plan_gift(giver, taker, money, items, now)?;
        self.commit(planned)
    }

    /// Rob and apply in one step. See [`Exchange::plan_rob`].
    ///
    /// # Errors
    ///
    /// See [`Exchange::plan_rob`].
    pub fn rob(
        &mut self,
        actor: &str,
        target: &str,
        what: RobTarget,
        now: DateTime<Utc>,
    ) -> Result<PlayerTransaction, GameError> {
        let planned = self.plan_rob(actor, target, what, now)?;
        self.commit(planned)
    }

    /// Borrow and apply in one step. See [`Exchange::plan_loan`].
    ///
    /// # Errors
    ///
    /// See [`Exchange::plan_loan`].
    pub fn create_loan(
        &mut self,
        code: &str,
        round: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Loan, GameError> {
        let planned = self.plan_loan(code, round, now)?;
        self.commit(planned)
    }

    /// Repay and apply in one step. See [`Exchange::plan_payback`].
    ///
    /// # Errors
    ///
    /// See [`Exchange::plan_payback`].
    pub fn pay_back(&mut self, loan_id: LoanId, now: DateTime<Utc>) -> Result<LoanPayback, GameError> {
        let planned = self.plan_payback(loan_id, now)?;
        self.commit(planned)
    }

    /// End the game and return every player's final balances.
    ///
    /// # Errors
    ///
    /// See [`Exchange::plan_end_game`].
    pub fn end_game(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<PlayerCode, Balances>, GameError> {
        let planned = self.plan_end_game(now)?;
        self.commit(planned)?;
        Ok(self.all_balances())
    }
}

/// Check loan terms and round length of game data.
///
/// # Errors
///
/// Returns [`GameError::InvalidConfig`] describing the first bad value.
pub fn validate_game_data(game: &GameData) -> Result<(), GameError> {
    if game.round_duration == 0 {
        return Err(GameError::InvalidConfig(
            "round_duration must be at least 1 minute".to_owned(),
        ));
    }
    if game.starting_loan < 0 || game.loan_increase < 0 || game.loan_interest < 0 {
        return Err(GameError::InvalidConfig(
            "loan terms must not be negative".to_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use chrono::{Duration, TimeZone};
    use merchant_types::{City, CityName, Item};

    use super::*;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 18, 0, 0).unwrap()
    }

    /// `minutes` after the game started.
    fn at(minutes: i64) -> DateTime<Utc> {
        start() + Duration::minutes(minutes)
    }

    fn rate(city: &str, round: u32, item: &str, buy: Option<i64>, sell: Option<i64>) -> ExchangeRate {
        ExchangeRate {
            city: CityName::new(city),
            round,
            item: ItemName::new(item),
            buy_price: buy,
            sell_price: sell,
        }
    }

    fn exchange() -> Exchange {
        let game = GameData {
            starting_time: start(),
            round_duration: 15,
            starting_loan: 500,
            loan_increase: 100,
            loan_interest: 10,
        };
        let prices = PriceBook::from_parts(
            vec![
                Item {
                    name: ItemName::new("gem"),
                    ending_price: 14,
                },
                Item {
                    name: ItemName::new("ore"),
                    ending_price: 11,
                },
            ],
            vec![
                City {
                    name: CityName::new("Eger"),
                },
                City {
                    name: CityName::new("Szeged"),
                },
            ],
            [1, 2, 3],
            vec![
                rate("Eger", 1, "gem", Some(10), Some(8)),
                rate("Eger", 1, "ore", Some(5), None),
                rate("Eger", 2, "gem", Some(12), Some(11)),
                rate("Eger", 2, "ore", Some(6), Some(6)),
                rate("Szeged", 1, "gem", None, Some(9)),
            ],
        )
        .unwrap();
        let players = ["AAA111", "BBB222", "CCC333"].map(PlayerCode::new);
        Exchange::new(game, prices, players, Ledger::new()).unwrap()
    }

    fn no_items() -> BTreeMap<String, i64> {
        BTreeMap::new()
    }

    #[test]
    fn untouched_player_has_starting_stake() {
        let ex = exchange();
        let balances = ex.balances("aaa111").unwrap();
        assert_eq!(balances.money, 1000);
        assert!(balances.items.is_empty());
    }

    #[test]
    fn unknown_player_is_not_found() {
        let ex = exchange();
        assert!(matches!(
            ex.balances("ZZZ999"),
            Err(GameError::NotFound { kind: "player", .. })
        ));
    }

    #[test]
    fn buy_spends_money_at_buy_price() {
        let mut ex = exchange();
        let outcome = ex.buy("AAA111", "Eger", "gem", 10, at(1)).unwrap();
        assert_eq!(outcome.transaction.price, -100);
        assert_eq!(outcome.transaction.round, 1);
        assert_eq!(outcome.balances.money, 900);
        assert_eq!(outcome.balances.item("gem"), 10);

        assert_eq!(ex.balances("AAA111").unwrap(), outcome.balances);
    }

    #[test]
    fn buy_then_sell_loses_the_spread() {
        let mut ex = exchange();
        ex.buy("AAA111", "Eger", "gem", 10, at(1)).unwrap();
        ex.sell("AAA111", "Eger", "gem", 10, at(2)).unwrap();
        let balances = ex.balances("AAA111").unwrap();
        assert_eq!(balances.money, 1000 - 100 + 80);
        assert_eq!(balances.item("gem"), 0);
    }

    #[test]
    fn equal_prices_round_trip_exactly() {
        let mut ex = exchange();
        ex.buy("AAA111", "Eger", "ore", 10, at(20)).unwrap();
        ex.sell("AAA111", "Eger", "ore", 10, at(21)).unwrap();
        assert_eq!(ex.balances("AAA111").unwrap().money, 1000);
    }

    #[test]
    fn overspending_fails_without_appending() {
        let mut ex = exchange();
        let result = ex.buy("AAA111", "Eger", "gem", 101, at(1));
        assert!(matches!(
            result,
            Err(GameError::InsufficientFunds {
                available: 1000,
                required: 1010,
                ..
            })
        ));
        assert!(ex.ledger().is_empty());
    }

    #[test]
    fn overselling_fails_without_appending() {
        let mut ex = exchange();
        ex.buy("AAA111", "Eger", "gem", 3, at(1)).unwrap();
        let before = ex.ledger().len();
        let result = ex.sell("AAA111", "Eger", "gem", 4, at(1));
        assert!(matches!(
            result,
            Err(GameError::InsufficientItems {
                available: 3,
                required: 4,
                ..
            })
        ));
        assert_eq!(ex.ledger().len(), before);
    }

    #[test]
    fn closed_market_side_is_rejected() {
        let mut ex = exchange();
        assert!(matches!(
            ex.buy("AAA111", "Szeged", "gem", 1, at(1)),
            Err(GameError::MarketClosed { .. })
        ));
        ex.buy("AAA111", "Eger", "ore", 1, at(1)).unwrap();
        assert!(matches!(
            ex.sell("AAA111", "Eger", "ore", 1, at(1)),
            Err(GameError::MarketClosed { .. })
        ));
    }

    #[test]
    fn missing_rate_is_not_found() {
        let mut ex = exchange();
        assert!(matches!(
            ex.buy("AAA111", "Szeged", "ore", 1, at(1)),
            Err(GameError::NotFound { .. })
        ));
    }

    #[test]
    fn zero_amount_is_invalid() {
        let mut ex = exchange();
        assert!(matches!(
            ex.buy("AAA111", "Eger", "gem", 0, at(1)),
            Err(GameError::InvalidAmount { .. })
        ));
        assert!(matches!(
            ex.sell("AAA111", "Eger", "gem", -2, at(1)),
            Err(GameError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn gift_moves_money_between_players() {
        let mut ex = exchange();
        // Bring B down to 500 first.
        ex.gift("BBB222", "CCC333", 500, &no_items(), at(1)).unwrap();

        ex.gift("AAA111", "BBB222", 100, &no_items(), at(2)).unwrap();
        assert_eq!(ex.balances("AAA111").unwrap().money, 900);
        assert_eq!(ex.balances("BBB222").unwrap().money, 600);
    }

    #[test]
    fn gift_beyond_balance_is_invalid() {
        let mut ex = exchange();
        let before = ex.ledger().len();
        let result = ex.gift("AAA111", "BBB222", 1001, &no_items(), at(1));
        assert!(matches!(
            result,
            Err(GameError::InvalidAmount { ref field, .. }) if field == "money"
        ));
        assert_eq!(ex.ledger().len(), before);
        assert_eq!(ex.balances("AAA111").unwrap().money, 1000);
        assert_eq!(ex.balances("BBB222").unwrap().money, 1000);
    }

    #[test]
    fn gift_of_items_checks_holdings() {
        let mut ex = exchange();
        ex.buy("AAA111", "Eger", "gem", 5, at(1)).unwrap();
        let mut items = BTreeMap::new();
        items.insert("gem".to_owned(), 6);
        assert!(matches!(
            ex.gift("AAA111", "BBB222", 0, &items, at(1)),
            Err(GameError::InvalidAmount { ref field, .. }) if field == "items.gem"
        ));

        items.insert("gem".to_owned(), 5);
        let transfer = ex.gift("AAA111", "BBB222", 0, &items, at(1)).unwrap();
        assert_eq!(transfer.items.len(), 1);
        assert_eq!(ex.balances("BBB222").unwrap().item("gem"), 5);
        assert_eq!(ex.balances("AAA111").unwrap().item("gem"), 0);
    }

    #[test]
    fn empty_gift_is_invalid() {
        let ex = exchange();
        let mut items = BTreeMap::new();
        items.insert("ore".to_owned(), 0);
        assert!(matches!(
            ex.plan_gift("AAA111", "BBB222", 0, &items, at(1)),
            Err(GameError::InvalidAmount { ref field, .. }) if field == "gift"
        ));
    }

    #[test]
    fn gift_to_self_is_rejected() {
        let ex = exchange();
        assert!(matches!(
            ex.plan_gift("AAA111", "aaa111", 10, &no_items(), at(1)),
            Err(GameError::SelfTransfer(_))
        ));
    }

    #[test]
    fn rob_money_takes_everything() {
        let mut ex = exchange();
        ex.buy("BBB222", "Eger", "gem", 20, at(1)).unwrap();
        let transfer = ex.rob("AAA111", "BBB222", RobTarget::Money, at(2)).unwrap();
        assert_eq!(transfer.money, 800);
        assert!(transfer.items.is_empty());
        assert_eq!(ex.balances("BBB222").unwrap().money, 0);
        assert_eq!(ex.balances("BBB222").unwrap().item("gem"), 20);
        assert_eq!(ex.balances("AAA111").unwrap().money, 1800);
    }

    #[test]
    fn rob_items_takes_every_holding() {
        let mut ex = exchange();
        ex.buy("BBB222", "Eger", "gem", 2, at(1)).unwrap();
        ex.buy("BBB222", "Eger", "ore", 3, at(1)).unwrap();
        let transfer = ex.rob("AAA111", "BBB222", RobTarget::Items, at(2)).unwrap();
        assert_eq!(transfer.money, 0);
        assert_eq!(transfer.items.len(), 2);

        let robbed = ex.balances("BBB222").unwrap();
        assert!(robbed.items.is_empty());
        assert_eq!(robbed.money, 1000 - 20 - 15);
        let actor = ex.balances("AAA111").unwrap();
        assert_eq!(actor.item("gem"), 2);
        assert_eq!(actor.item("ore"), 3);
    }

    #[test]
    fn rob_of_empty_target_still_succeeds() {
        let mut ex = exchange();
        ex.rob("AAA111", "BBB222", RobTarget::Money, at(1)).unwrap();
        let transfer = ex.rob("CCC333", "BBB222", RobTarget::Money, at(2)).unwrap();
        assert_eq!(transfer.money, 0);
        assert_eq!(ex.balances("CCC333").unwrap().money, 1000);
    }

    #[test]
    fn loan_amount_depends_on_round() {
        let mut ex = exchange();
        let first = ex.create_loan("AAA111", Some(1), at(20)).unwrap();
        let second = ex.create_loan("AAA111", None, at(20)).unwrap();
        assert_eq!(first.amount, 500);
        assert_eq!(second.round, 2);
        assert_eq!(second.amount, 600);
        assert_eq!(ex.balances("AAA111").unwrap().money, 2100);
    }

    #[test]
    fn second_loan_in_a_round_is_duplicate() {
        let mut ex = exchange();
        ex.create_loan("AAA111", None, at(1)).unwrap();
        assert!(matches!(
            ex.create_loan("AAA111", Some(1), at(2)),
            Err(GameError::DuplicateLoan { round: 1, .. })
        ));
    }

    #[test]
    fn loan_for_future_round_is_rejected() {
        let ex = exchange();
        assert_eq!(
            ex.plan_loan("AAA111", Some(3), at(1)).map(|p| p.record.round),
            Err(GameError::FutureRound {
                requested: 3,
                current: 1
            })
        );
        assert!(matches!(
            ex.plan_loan("AAA111", Some(9), at(1)),
            Err(GameError::NotFound { kind: "round", .. })
        ));
    }

    #[test]
    fn payback_charges_interest_per_round() {
        let mut ex = exchange();
        let loan = ex.create_loan("AAA111", None, at(1)).unwrap();
        let payback = ex.pay_back(loan.id, at(35)).unwrap();
        assert_eq!(payback.round, 3);
        assert_eq!(payback.payback_amount, 500 + 2 * 50);
        assert_eq!(ex.balances("AAA111").unwrap().money, 1000 + 500 - 600);
    }

    #[test]
    fn same_round_payback_costs_principal() {
        let mut ex = exchange();
        let loan = ex.create_loan("AAA111", None, at(1)).unwrap();
        let payback = ex.pay_back(loan.id, at(2)).unwrap();
        assert_eq!(payback.payback_amount, 500);
    }

    #[test]
    fn second_payback_is_already_repaid() {
        let mut ex = exchange();
        let loan = ex.create_loan("AAA111", None, at(1)).unwrap();
        ex.pay_back(loan.id, at(2)).unwrap();
        assert_eq!(
            ex.pay_back(loan.id, at(3)),
            Err(GameError::AlreadyRepaid(loan.id))
        );
    }

    #[test]
    fn payback_without_funds_is_rejected() {
        let mut ex = exchange();
        let loan = ex.create_loan("AAA111", None, at(1)).unwrap();
        ex.gift("AAA111", "BBB222", 1500, &no_items(), at(2)).unwrap();
        let before = ex.ledger().len();
        assert!(matches!(
            ex.pay_back(loan.id, at(3)),
            Err(GameError::InsufficientFunds { .. })
        ));
        assert_eq!(ex.ledger().len(), before);
    }

    #[test]
    fn unknown_loan_is_not_found() {
        let ex = exchange();
        assert!(matches!(
            ex.plan_payback(LoanId::new(), at(1)),
            Err(GameError::NotFound { kind: "loan", .. })
        ));
    }

    #[test]
    fn loan_listing_quotes_amount_due() {
        let mut ex = exchange();
        let loan = ex.create_loan("AAA111", None, at(1)).unwrap();
        let listing = ex.loans_for("AAA111", at(31)).unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].amount_due, Some(600));

        ex.pay_back(loan.id, at(31)).unwrap();
        let listing = ex.loans_for("AAA111", at(32)).unwrap();
        assert_eq!(listing[0].amount_due, None);
        assert!(listing[0].payback.is_some());
        assert!(ex.outstanding_loans(at(32)).unwrap().is_empty());
    }

    #[test]
    fn loan_quote_reports_current_round() {
        let mut ex = exchange();
        let quote = ex.loan_quote("AAA111", at(16)).unwrap();
        assert_eq!(quote.round, 2);
        assert_eq!(quote.amount, 600);
        assert!(!quote.taken);

        ex.create_loan("AAA111", None, at(16)).unwrap();
        assert!(ex.loan_quote("AAA111", at(17)).unwrap().taken);
    }

    #[test]
    fn end_game_liquidates_then_repays() {
        let mut ex = exchange();
        ex.buy("AAA111", "Eger", "gem", 10, at(1)).unwrap();
        let loan = ex.create_loan("BBB222", None, at(1)).unwrap();
        ex.gift("BBB222", "CCC333", 1500, &no_items(), at(2)).unwrap();

        let finals = ex.end_game(at(40)).unwrap();

        // A: 900 money + 10 gem at 14.
        assert_eq!(finals[&PlayerCode::new("AAA111")].money, 1040);
        assert!(finals[&PlayerCode::new("AAA111")].items.is_empty());
        // B: 0 money, forced payback of 500 + 2 * 50 leaves debt.
        assert_eq!(finals[&PlayerCode::new("BBB222")].money, -600);
        assert_eq!(finals[&PlayerCode::new("CCC333")].money, 2500);

        assert!(ex.is_ended());
        assert!(ex.ledger().payback_for(loan.id).is_some());
        assert!(ex.audit().is_clean());
    }

    #[test]
    fn end_game_runs_once() {
        let mut ex = exchange();
        ex.end_game(at(1)).unwrap();
        assert_eq!(ex.end_game(at(2)), Err(GameError::GameEnded));
        assert_eq!(
            ex.buy("AAA111", "Eger", "gem", 1, at(2)).map(|t| t.transaction.price),
            Err(GameError::GameEnded)
        );
        assert!(matches!(
            ex.create_loan("AAA111", None, at(2)),
            Err(GameError::GameEnded)
        ));
    }

    #[test]
    fn leaderboard_orders_by_money() {
        let mut ex = exchange();
        ex.gift("CCC333", "BBB222", 300, &no_items(), at(1)).unwrap();
        let board = ex.leaderboard();
        let order: Vec<&str> = board.iter().map(|s| s.player.as_str()).collect();
        assert_eq!(order, vec!["BBB222", "AAA111", "CCC333"]);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].money, 1300);
        assert_eq!(board[2].rank, 3);
    }

    #[test]
    fn current_rates_follow_the_clock() {
        let ex = exchange();
        assert_eq!(ex.current_rates("Eger", at(1)).unwrap().len(), 2);
        let later = ex.current_rates("Eger", at(16)).unwrap();
        assert_eq!(later[0].round, 2);
        assert!(ex.current_rates("Szeged", at(16)).unwrap().is_empty());
    }

    #[test]
    fn player_report_collects_history() {
        let mut ex = exchange();
        ex.buy("AAA111", "Eger", "gem", 1, at(1)).unwrap();
        ex.gift("BBB222", "AAA111", 5, &no_items(), at(1)).unwrap();
        ex.create_loan("AAA111", None, at(1)).unwrap();
        let report = ex.player_report("aaa111", at(2)).unwrap();
        assert_eq!(report.player.as_str(), "AAA111");
        assert_eq!(report.transactions.len(), 1);
        assert_eq!(report.transfers.len(), 1);
        assert_eq!(report.loans.len(), 1);
        assert_eq!(report.balances.money, 1000 - 10 + 5 + 500);
    }

    #[test]
    fn planning_does_not_mutate() {
        let ex = exchange();
        let planned = ex.plan_buy("AAA111", "Eger", "gem", 1, at(1)).unwrap();
        assert_eq!(planned.commit.len(), 1);
        assert!(ex.ledger().is_empty());
    }

    #[test]
    fn game_data_update_is_validated() {
        let mut ex = exchange();
        let mut game = ex.game_data().clone();
        game.round_duration = 0;
        assert!(matches!(
            ex.set_game_data(game),
            Err(GameError::InvalidConfig(_))
        ));

        let mut game = ex.game_data().clone();
        game.loan_interest = 20;
        ex.set_game_data(game).unwrap();
        assert_eq!(ex.game_data().loan_interest, 20);
    }

    #[test]
    fn mixed_history_never_leaves_a_negative_balance() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut ex = exchange();
        let mut rng = StdRng::seed_from_u64(7);
        let players = ["AAA111", "BBB222", "CCC333"];
        let cities = ["Eger", "Szeged"];
        let items = ["gem", "ore"];
        let mut applied = 0_usize;

        for step in 0..400_i64 {
            // Minutes 0..=28: rounds 1 and 2.
            let now = at(step / 14);
            let who = players[rng.random_range(0..players.len())];
            let other = players[rng.random_range(0..players.len())];
            let city = cities[rng.random_range(0..cities.len())];
            let item = items[rng.random_range(0..items.len())];
            let amount = rng.random_range(1..=40);

            let result = match rng.random_range(0..7) {
                0 => ex.buy(who, city, item, amount, now).map(drop),
                1 => ex.sell(who, city, item, amount, now).map(drop),
                2 => {
                    let mut gift = BTreeMap::new();
                    gift.insert(item.to_owned(), rng.random_range(0..=5));
                    ex.gift(who, other, amount * 10, &gift, now).map(drop)
                }
                3 => {
                    let what = RobTarget::from_rob_money(rng.random_bool(0.5));
                    ex.rob(who, other, what, now).map(drop)
                }
                4 => ex.create_loan(who, None, now).map(drop),
                _ => {
                    let Some(loan_id) = ex.ledger().outstanding_loans().first().map(|l| l.id)
                    else {
                        continue;
                    };
                    ex.pay_back(loan_id, now).map(drop)
                }
            };
            if result.is_ok() {
                applied += 1;
            }

            for (player, balances) in ex.all_balances() {
                assert!(
                    balances.is_solvent(),
                    "{player} went negative at step {step}: {balances:?}"
                );
            }
        }

        assert!(applied > 50, "only {applied} operations succeeded");
        assert!(ex.audit().is_clean());
    }
}
