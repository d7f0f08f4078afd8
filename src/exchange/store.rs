// Exchange rows. Callers own the transaction.
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::{Exchange, ExchangeStatus};
use crate::error::{AppError, AppResult};

pub fn insert(
    conn: &Connection,
    proposer_id: i64,
    request_card_id: i64,
    target_card_id: i64,
    shop_listing_id: i64,
    description: &str,
) -> AppResult<Exchange> {
    conn.execute(
        "INSERT INTO exchanges
             (proposer_id, request_card_id, target_card_id, shop_listing_id, description, status)
         VALUES (?1, ?2, ?3, ?4, ?5, 'REQUESTED')",
        params![
            proposer_id,
            request_card_id,
            target_card_id,
            shop_listing_id,
            description
        ],
    )?;
    find(conn, conn.last_insert_rowid())
}

pub fn find(conn: &Connection, exchange_id: i64) -> AppResult<Exchange> {
    conn.query_row(
        &format!("SELECT {} FROM exchanges WHERE id = ?1", Exchange::COLUMNS),
        params![exchange_id],
        Exchange::from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound(format!("exchange {}", exchange_id)))
}

fn query(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> AppResult<Vec<Exchange>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, Exchange::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Move a REQUESTED proposal to `status`. Fails with Conflict if someone
/// else decided it first.
pub fn set_status(conn: &Connection, exchange_id: i64, status: ExchangeStatus) -> AppResult<()> {
    let updated = conn.execute(
        "UPDATE exchanges SET status = ?2, updated_at = datetime('now')
         WHERE id = ?1 AND status = 'REQUESTED'",
        params![exchange_id, status],
    )?;
    if updated == 0 {
        return Err(AppError::Conflict(format!(
            "exchange {} is no longer pending",
            exchange_id
        )));
    }
    Ok(())
}

/// Point the proposal at another unit of the same listing.
pub fn retarget(conn: &Connection, exchange_id: i64, target_card_id: i64) -> AppResult<()> {
    conn.execute(
        "UPDATE exchanges SET target_card_id = ?2, updated_at = datetime('now') WHERE id = ?1",
        params![exchange_id, target_card_id],
    )?;
    Ok(())
}

/// Whether `request_card_id` is already offered against the listing in any
/// proposal the seller has not rejected. Cancelled proposals still count.
pub fn already_offered(
    conn: &Connection,
    request_card_id: i64,
    shop_listing_id: i64,
) -> AppResult<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM exchanges
             WHERE request_card_id = ?1 AND shop_listing_id = ?2
               AND status != 'REJECTED')",
        params![request_card_id, shop_listing_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn reject_all(conn: &Connection, pending: Vec<Exchange>) -> AppResult<Vec<Exchange>> {
    let mut rejected = Vec::with_capacity(pending.len());
    for exchange in pending {
        set_status(conn, exchange.id, ExchangeStatus::Rejected)?;
        rejected.push(find(conn, exchange.id)?);
    }
    Ok(rejected)
}

/// Reject every pending proposal against the listing. Returns the rejected rows.
pub fn reject_pending_for_listing(
    conn: &Connection,
    shop_listing_id: i64,
) -> AppResult<Vec<Exchange>> {
    let pending = query(
        conn,
        &format!(
            "SELECT {} FROM exchanges
             WHERE shop_listing_id = ?1 AND status = 'REQUESTED'
             ORDER BY id",
            Exchange::COLUMNS
        ),
        params![shop_listing_id],
    )?;
    reject_all(conn, pending)
}

/// Reject every pending proposal that offers one of `card_ids`.
pub fn reject_pending_offering(conn: &Connection, card_ids: &[i64]) -> AppResult<Vec<Exchange>> {
    let mut pending = Vec::new();
    for &card_id in card_ids {
        pending.extend(query(
            conn,
            &format!(
                "SELECT {} FROM exchanges
                 WHERE request_card_id = ?1 AND status = 'REQUESTED'
                 ORDER BY id",
                Exchange::COLUMNS
            ),
            params![card_id],
        )?);
    }
    reject_all(conn, pending)
}

/// Proposals recorded against the listing, newest first, optionally only
/// those made by `proposer_id`.
pub fn for_listing(
    conn: &Connection,
    shop_listing_id: i64,
    proposer_id: Option<i64>,
) -> AppResult<Vec<Exchange>> {
    query(
        conn,
        &format!(
            "SELECT {} FROM exchanges
             WHERE shop_listing_id = ?1 AND (?2 IS NULL OR proposer_id = ?2)
             ORDER BY id DESC",
            Exchange::COLUMNS
        ),
        params![shop_listing_id, proposer_id],
    )
}
