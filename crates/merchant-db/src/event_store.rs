//! Ledger event persistence.
//!
//! Each [`Commit`] is written inside one SQL transaction: either every
//! event of the operation is stored or none is. Unique constraints on
//! `loans (player, round)` and `loan_paybacks (loan_id)` back the ledger's
//! own uniqueness checks and surface as [`DbError::Conflict`].
//!
//! Loading returns the events grouped by table in an order the ledger can
//! replay: trades, transfers, loans, paybacks, liquidations, then the
//! game-ended marker.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction as SqlTransaction};
use uuid::Uuid;

use merchant_ledger::{Commit, LedgerEvent};
use merchant_types::{
    CityName, GameEnd, ItemName, Liquidation, LiquidationId, Loan, LoanId, LoanPayback,
    LoanPaybackId, PlayerCode, PlayerTransaction, PlayerTransactionId,
    PlayerTransactionItemAmount, Transaction, TransactionId,
};

use crate::error::{DbError, round_from_db, round_to_db};

/// Operations on the ledger event tables.
#[derive(Debug, Clone, Copy)]
pub struct EventStore<'a> {
    pool: &'a PgPool,
}

impl<'a> EventStore<'a> {
    /// Create a new event store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Store every event of `commit` in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Conflict`] if an event collides with a stored
    /// one (duplicate loan, second payback, second game end), or
    /// [`DbError::Postgres`] for other failures. Nothing is written on
    /// failure.
    pub async fn persist(&self, commit: &Commit) -> Result<(), DbError> {
        if commit.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for event in commit.events() {
            insert_event(&mut tx, event).await?;
        }
        tx.commit().await?;
        tracing::debug!(count = commit.len(), "Persisted ledger commit");
        Ok(())
    }

    /// Load every stored event in replay order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if a query fails, or
    /// [`DbError::Corrupt`] for an unrepresentable row.
    pub async fn load_all(&self) -> Result<Vec<LedgerEvent>, DbError> {
        let mut events = Vec::new();

        for row in sqlx::query_as::<_, TransactionRow>(
            r"SELECT id, player, city, round, item, item_amount, unit_price, price, created_at
              FROM transactions ORDER BY seq",
        )
        .fetch_all(self.pool)
        .await?
        {
            events.push(LedgerEvent::Trade(row.into_record()?));
        }

        let mut lines: BTreeMap<Uuid, Vec<PlayerTransactionItemAmount>> = BTreeMap::new();
        for (id, item, amount) in sqlx::query_as::<_, (Uuid, String, i64)>(
            r"SELECT player_transaction_id, item, amount
              FROM player_transaction_items ORDER BY player_transaction_id, item",
        )
        .fetch_all(self.pool)
        .await?
        {
            lines.entry(id).or_default().push(PlayerTransactionItemAmount {
                item: ItemName::new(item),
                amount,
            });
        }
        for (id, giver, taker, money, created_at) in
            sqlx::query_as::<_, (Uuid, String, String, i64, DateTime<Utc>)>(
                r"SELECT id, giver, taker, money, created_at
                  FROM player_transactions ORDER BY seq",
            )
            .fetch_all(self.pool)
            .await?
        {
            events.push(LedgerEvent::Transfer(PlayerTransaction {
                id: PlayerTransactionId::from(id),
                giver: PlayerCode::new(&giver),
                taker: PlayerCode::new(&taker),
                money,
                items: lines.remove(&id).unwrap_or_default(),
                created_at,
            }));
        }

        for (id, player, round, amount, created_at) in
            sqlx::query_as::<_, (Uuid, String, i32, i64, DateTime<Utc>)>(
                "SELECT id, player, round, amount, created_at FROM loans ORDER BY seq",
            )
            .fetch_all(self.pool)
            .await?
        {
            events.push(LedgerEvent::Loan(Loan {
                id: LoanId::from(id),
                player: PlayerCode::new(&player),
                round: round_from_db("loans", round)?,
                amount,
                created_at,
            }));
        }

        for (id, loan_id, player, round, payback_amount, created_at) in
            sqlx::query_as::<_, (Uuid, Uuid, String, i32, i64, DateTime<Utc>)>(
                r"SELECT id, loan_id, player, round, payback_amount, created_at
                  FROM loan_paybacks ORDER BY seq",
            )
            .fetch_all(self.pool)
            .await?
        {
            events.push(LedgerEvent::Payback(LoanPayback {
                id: LoanPaybackId::from(id),
                loan_id: LoanId::from(loan_id),
                player: PlayerCode::new(&player),
                round: round_from_db("loan_paybacks", round)?,
                payback_amount,
                created_at,
            }));
        }

        for (id, player, item, amount, ending_price, proceeds, created_at) in
            sqlx::query_as::<_, (Uuid, String, String, i64, i64, i64, DateTime<Utc>)>(
                r"SELECT id, player, item, amount, ending_price, proceeds, created_at
                  FROM liquidations ORDER BY seq",
            )
            .fetch_all(self.pool)
            .await?
        {
            events.push(LedgerEvent::Liquidation(Liquidation {
                id: LiquidationId::from(id),
                player: PlayerCode::new(&player),
                item: ItemName::new(item),
                amount,
                ending_price,
                proceeds,
                created_at,
            }));
        }

        if let Some((round, ended_at)) = sqlx::query_as::<_, (i32, DateTime<Utc>)>(
            "SELECT round, ended_at FROM game_end WHERE id = 1",
        )
        .fetch_optional(self.pool)
        .await?
        {
            events.push(LedgerEvent::GameEnded(GameEnd {
                round: round_from_db("game_end", round)?,
                ended_at,
            }));
        }

        tracing::info!(count = events.len(), "Loaded ledger events");
        Ok(events)
    }
}

/// Insert one event inside an open transaction.
async fn insert_event(
    tx: &mut SqlTransaction<'_, Postgres>,
    event: &LedgerEvent,
) -> Result<(), DbError> {
    match event {
        LedgerEvent::Trade(t) => {
            sqlx::query(
                r"INSERT INTO transactions (id, player, city, round, item, item_amount, unit_price, price, created_at)
                  VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(t.id.into_inner())
            .bind(t.player.as_str())
            .bind(t.city.as_str())
            .bind(round_to_db(t.round)?)
            .bind(t.item.as_str())
            .bind(t.item_amount)
            .bind(t.unit_price)
            .bind(t.price)
            .bind(t.created_at)
            .execute(&mut **tx)
            .await
            .map_err(DbError::from_insert)?;
        }
        LedgerEvent::Transfer(t) => {
            sqlx::query(
                r"INSERT INTO player_transactions (id, giver, taker, money, created_at)
                  VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(t.id.into_inner())
            .bind(t.giver.as_str())
            .bind(t.taker.as_str())
            .bind(t.money)
            .bind(t.created_at)
            .execute(&mut **tx)
            .await
            .map_err(DbError::from_insert)?;
            for line in &t.items {
                sqlx::query(
                    r"INSERT INTO player_transaction_items (player_transaction_id, item, amount)
                      VALUES ($1, $2, $3)",
                )
                .bind(t.id.into_inner())
                .bind(line.item.as_str())
                .bind(line.amount)
                .execute(&mut **tx)
                .await
                .map_err(DbError::from_insert)?;
            }
        }
        LedgerEvent::Loan(l) => {
            sqlx::query(
                r"INSERT INTO loans (id, player, round, amount, created_at)
                  VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(l.id.into_inner())
            .bind(l.player.as_str())
            .bind(round_to_db(l.round)?)
            .bind(l.amount)
            .bind(l.created_at)
            .execute(&mut **tx)
            .await
            .map_err(DbError::from_insert)?;
        }
        LedgerEvent::Payback(p) => {
            sqlx::query(
                r"INSERT INTO loan_paybacks (id, loan_id, player, round, payback_amount, created_at)
                  VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(p.id.into_inner())
            .bind(p.loan_id.into_inner())
            .bind(p.player.as_str())
            .bind(round_to_db(p.round)?)
            .bind(p.payback_amount)
            .bind(p.created_at)
            .execute(&mut **tx)
            .await
            .map_err(DbError::from_insert)?;
        }
        LedgerEvent::Liquidation(l) => {
            sqlx::query(
                r"INSERT INTO liquidations (id, player, item, amount, ending_price, proceeds, created_at)
                  VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(l.id.into_inner())
            .bind(l.player.as_str())
            .bind(l.item.as_str())
            .bind(l.amount)
            .bind(l.ending_price)
            .bind(l.proceeds)
            .bind(l.created_at)
            .execute(&mut **tx)
            .await
            .map_err(DbError::from_insert)?;
        }
        LedgerEvent::GameEnded(end) => {
            sqlx::query("INSERT INTO game_end (id, round, ended_at) VALUES (1, $1, $2)")
                .bind(round_to_db(end.round)?)
                .bind(end.ended_at)
                .execute(&mut **tx)
                .await
                .map_err(DbError::from_insert)?;
        }
    }
    Ok(())
}

/// A row from the `transactions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    player: String,
    city: String,
    round: i32,
    item: String,
    item_amount: i64,
    unit_price: i64,
    price: i64,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_record(self) -> Result<Transaction, DbError> {
        Ok(Transaction {
            id: TransactionId::from(self.id),
            player: PlayerCode::new(&self.player),
            city: CityName::new(self.city),
            round: round_from_db("transactions", self.round)?,
            item: ItemName::new(self.item),
            item_amount: self.item_amount,
            unit_price: self.unit_price,
            price: self.price,
            created_at: self.created_at,
        })
    }
}
