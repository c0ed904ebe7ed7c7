//! Ledger events and the commit unit.
//!
//! A [`LedgerEvent`] wraps one immutable record. A [`Commit`] groups the
//! events produced by a single validated operation so they can be
//! persisted and appended as one atomic unit.

use serde::Serialize;

use merchant_types::{
    GameEnd, Liquidation, Loan, LoanPayback, PlayerCode, PlayerTransaction, Transaction,
};

/// One immutable entry in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Market trade.
    Trade(Transaction),
    /// Player-to-player transfer (gift or rob).
    Transfer(PlayerTransaction),
    /// Loan issued.
    Loan(Loan),
    /// Loan repaid.
    Payback(LoanPayback),
    /// End-of-game stock liquidation.
    Liquidation(Liquidation),
    /// The game has ended.
    GameEnded(GameEnd),
}

impl LedgerEvent {
    /// Whether this event changes the balances of `player`.
    pub fn involves(&self, player: &PlayerCode) -> bool {
        match self {
            Self::Trade(t) => &t.player == player,
            Self::Transfer(t) => &t.giver == player || &t.taker == player,
            Self::Loan(l) => &l.player == player,
            Self::Payback(p) => &p.player == player,
            Self::Liquidation(l) => &l.player == player,
            Self::GameEnded(_) => false,
        }
    }

    /// Short name of the event kind, used in log lines.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Trade(_) => "trade",
            Self::Transfer(_) => "transfer",
            Self::Loan(_) => "loan",
            Self::Payback(_) => "payback",
            Self::Liquidation(_) => "liquidation",
            Self::GameEnded(_) => "game_ended",
        }
    }
}

/// The events produced by one validated operation.
///
/// Built by the game engine against a read of the current ledger, then
/// persisted and applied as a unit. An empty commit is valid and changes
/// nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Commit {
    events: Vec<LedgerEvent>,
}

impl Commit {
    /// Create an empty commit.
    pub const fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Wrap an existing list of events.
    pub const fn from_events(events: Vec<LedgerEvent>) -> Self {
        Self { events }
    }

    /// Add an event.
    pub fn push(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    /// Events in the order they will be appended.
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Number of events.
    pub const fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the commit carries no events.
    pub const fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Consume the commit, returning its events.
    pub fn into_events(self) -> Vec<LedgerEvent> {
        self.events
    }

    /// The first market trade in the commit.
    pub fn trade(&self) -> Option<&Transaction> {
        self.events.iter().find_map(|e| match e {
            LedgerEvent::Trade(t) => Some(t),
            _ => None,
        })
    }

    /// The first player transfer in the commit.
    pub fn transfer(&self) -> Option<&PlayerTransaction> {
        self.events.iter().find_map(|e| match e {
            LedgerEvent::Transfer(t) => Some(t),
            _ => None,
        })
    }

    /// The first loan in the commit.
    pub fn loan(&self) -> Option<&Loan> {
        self.events.iter().find_map(|e| match e {
            LedgerEvent::Loan(l) => Some(l),
            _ => None,
        })
    }

    /// The first payback in the commit.
    pub fn payback(&self) -> Option<&LoanPayback> {
        self.events.iter().find_map(|e| match e {
            LedgerEvent::Payback(p) => Some(p),
            _ => None,
        })
    }
}

impl From<LedgerEvent> for Commit {
    fn from(event: LedgerEvent) -> Self {
        Self {
            events: vec![event],
        }
    }
}
