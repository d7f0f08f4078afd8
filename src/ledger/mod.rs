//! Point balances and the append-only point history.
//!
//! Every balance change goes through [`adjust`], which writes the history row
//! in the same statement sequence, so `balance == sum(history.delta)` holds
//! for every account. The free functions take a connection the caller has
//! already placed inside a transaction.

pub mod draw;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::config::DrawConfig;
use crate::db::models::{PointHistoryEntry, PointType};
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

pub use draw::{Cooldown, DrawResult};

/// Create the zero-balance account every user gets at registration.
pub fn open_account(conn: &Connection, user_id: i64) -> AppResult<()> {
    conn.execute(
        "INSERT INTO points (user_id, balance) VALUES (?1, 0)",
        params![user_id],
    )?;
    Ok(())
}

pub fn balance(conn: &Connection, user_id: i64) -> AppResult<i64> {
    conn.query_row(
        "SELECT balance FROM points WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound(format!("point account for user {}", user_id)))
}

/// Apply `balance += delta` and append the matching history entry.
/// Returns the new balance.
///
/// The guard lives in the UPDATE itself, so there is no window between
/// checking the balance and writing it.
pub fn adjust(
    conn: &Connection,
    user_id: i64,
    delta: i64,
    point_type: PointType,
) -> AppResult<i64> {
    let updated = conn.execute(
        "UPDATE points SET balance = balance + ?2, updated_at = datetime('now')
         WHERE user_id = ?1 AND balance + ?2 >= 0",
        params![user_id, delta],
    )?;

    if updated == 0 {
        let available = balance(conn, user_id)?;
        return Err(AppError::InsufficientFunds {
            user_id,
            required: -delta,
            available,
        });
    }

    conn.execute(
        "INSERT INTO point_history (user_id, delta, point_type) VALUES (?1, ?2, ?3)",
        params![user_id, delta, point_type],
    )?;

    let new_balance = balance(conn, user_id)?;
    tracing::debug!(user_id, delta, %point_type, new_balance, "Ledger adjusted");
    Ok(new_balance)
}

/// Newest first.
pub fn history(conn: &Connection, user_id: i64) -> AppResult<Vec<PointHistoryEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM point_history WHERE user_id = ?1 ORDER BY id DESC",
        PointHistoryEntry::COLUMNS
    ))?;
    let entries = stmt
        .query_map(params![user_id], PointHistoryEntry::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub user_id: i64,
    pub balance: i64,
    pub history_total: i64,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.balance == self.history_total
    }
}

pub fn reconcile(conn: &Connection, user_id: i64) -> AppResult<Reconciliation> {
    let balance = balance(conn, user_id)?;
    let history_total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(delta), 0) FROM point_history WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(Reconciliation {
        user_id,
        balance,
        history_total,
    })
}

/// Read side of the ledger plus the points-draw minigame.
#[derive(Clone)]
pub struct Ledger {
    pool: DbPool,
    draw: DrawConfig,
}

impl Ledger {
    pub fn new(pool: DbPool, draw: DrawConfig) -> Self {
        Self { pool, draw }
    }

    pub fn balance(&self, user_id: i64) -> AppResult<i64> {
        let conn = self.pool.get()?;
        balance(&conn, user_id)
    }

    pub fn history(&self, user_id: i64) -> AppResult<Vec<PointHistoryEntry>> {
        let conn = self.pool.get()?;
        balance(&conn, user_id)?;
        history(&conn, user_id)
    }

    pub fn reconcile(&self, user_id: i64) -> AppResult<Reconciliation> {
        let conn = self.pool.get()?;
        reconcile(&conn, user_id)
    }
}
