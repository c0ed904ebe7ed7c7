//! Integrity audit over a complete event log.
//!
//! The game engine refuses any operation that would leave a player with
//! negative money or stock, and the ledger refuses duplicate loans and
//! paybacks. The audit re-checks both properties over a raw list of events,
//! so a log loaded from storage can be verified before it is replayed.
//!
//! Negative money is only an anomaly while the game is running: the forced
//! end-game paybacks may legitimately leave a player in debt.
//!
//! A failed audit produces a [`LedgerAnomaly`].

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use merchant_types::{ItemName, LoanId, PlayerCode};

use crate::event::LedgerEvent;
use crate::ledger::Ledger;

/// The result of auditing an event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "anomaly", rename_all = "snake_case")]
pub enum AuditResult {
    /// No anomaly found.
    Clean,
    /// At least one invariant is violated.
    Anomaly(LedgerAnomaly),
}

impl AuditResult {
    /// Whether the audit found nothing.
    pub const fn is_clean(&self) -> bool {
        matches!(self, Self::Clean)
    }
}

/// A negative derived balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NegativeBalance {
    /// The player holding the balance.
    pub player: PlayerCode,
    /// The item, or `None` for money.
    pub item: Option<ItemName>,
    /// The negative amount.
    pub amount: i64,
}

/// Details of a failed audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerAnomaly {
    /// Balances below zero.
    pub negative_balances: Vec<NegativeBalance>,
    /// (player, round) pairs with more than one loan.
    pub duplicate_loans: Vec<(PlayerCode, u32)>,
    /// Loans with more than one payback.
    pub duplicate_paybacks: Vec<LoanId>,
    /// Paybacks referring to a loan not in the log.
    pub orphan_paybacks: Vec<LoanId>,
    /// Human-readable summary.
    pub message: String,
}

/// Audit a raw event log.
pub fn audit(events: &[LedgerEvent]) -> AuditResult {
    let ended = events
        .iter()
        .any(|e| matches!(e, LedgerEvent::GameEnded(_)));

    let mut loan_keys: BTreeMap<(PlayerCode, u32), usize> = BTreeMap::new();
    let mut loan_ids: BTreeSet<LoanId> = BTreeSet::new();
    let mut payback_counts: BTreeMap<LoanId, usize> = BTreeMap::new();

    for event in events {
        match event {
            LedgerEvent::Loan(loan) => {
                let count = loan_keys
                    .entry((loan.player.clone(), loan.round))
                    .or_insert(0);
                *count = count.saturating_add(1);
                loan_ids.insert(loan.id);
            }
            LedgerEvent::Payback(payback) => {
                let count = payback_counts.entry(payback.loan_id).or_insert(0);
                *count = count.saturating_add(1);
            }
            _ => {}
        }
    }

    let duplicate_loans: Vec<(PlayerCode, u32)> = loan_keys
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(key, _)| key)
        .collect();
    let duplicate_paybacks: Vec<LoanId> = payback_counts
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(id, _)| *id)
        .collect();
    let orphan_paybacks: Vec<LoanId> = payback_counts
        .keys()
        .filter(|id| !loan_ids.contains(id))
        .copied()
        .collect();

    let mut negative_balances = Vec::new();
    for (player, balances) in fold_all(events) {
        if !ended && balances.money < 0 {
            negative_balances.push(NegativeBalance {
                player: player.clone(),
                item: None,
                amount: balances.money,
            });
        }
        for (item, amount) in &balances.items {
            if *amount < 0 {
                negative_balances.push(NegativeBalance {
                    player: player.clone(),
                    item: Some(item.clone()),
                    amount: *amount,
                });
            }
        }
    }

    if negative_balances.is_empty()
        && duplicate_loans.is_empty()
        && duplicate_paybacks.is_empty()
        && orphan_paybacks.is_empty()
    {
        return AuditResult::Clean;
    }

    let message = format!(
        "{} negative balance(s), {} duplicate loan(s), {} duplicate payback(s), {} orphan payback(s)",
        negative_balances.len(),
        duplicate_loans.len(),
        duplicate_paybacks.len(),
        orphan_paybacks.len(),
    );
    tracing::warn!(%message, "Ledger audit found anomalies");

    AuditResult::Anomaly(LedgerAnomaly {
        negative_balances,
        duplicate_loans,
        duplicate_paybacks,
        orphan_paybacks,
        message,
    })
}

/// Fold balances for every player without the ledger's append checks.
fn fold_all(events: &[LedgerEvent]) -> BTreeMap<PlayerCode, merchant_types::Balances> {
    let mut ledger = Ledger::new();
    ledger.extend_unchecked(events.iter().cloned());
    ledger.all_balances()
}

impl Ledger {
    /// Audit the events currently in the ledger.
    pub fn audit(&self) -> AuditResult {
        audit(self.events())
    }
}
