// Card inventory - the IDLE <-> LISTED state machine of physical card units.
//
// All functions take a connection already inside the caller's transaction.
// Every write is guarded by the state it expects, so a unit that moved
// underneath us fails the statement instead of being silently overwritten.

pub mod catalog;

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::UserCard;
use crate::error::{AppError, AppResult};

pub use catalog::{GalleryEntry, MintedCard, NewPhotoCard};

/// Ordering that puts units no pending proposal points at ahead of the rest.
const UNTARGETED_FIRST: &str = "EXISTS (SELECT 1 FROM exchanges
     WHERE exchanges.target_card_id = user_cards.id AND exchanges.status = 'REQUESTED')";

pub fn find(conn: &Connection, card_id: i64) -> AppResult<UserCard> {
    conn.query_row(
        &format!("SELECT {} FROM user_cards WHERE id = ?1", UserCard::COLUMNS),
        params![card_id],
        UserCard::from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound(format!("user card {}", card_id)))
}

fn query_cards(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> AppResult<Vec<UserCard>> {
    let mut stmt = conn.prepare(sql)?;
    let cards = stmt
        .query_map(params, UserCard::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cards)
}

/// Up to `limit` IDLE units of one template owned by `owner_id`, lowest id first.
pub fn idle_cards(
    conn: &Connection,
    owner_id: i64,
    photo_card_id: i64,
    limit: i64,
) -> AppResult<Vec<UserCard>> {
    query_cards(
        conn,
        &format!(
            "SELECT {} FROM user_cards
             WHERE owner_id = ?1 AND photo_card_id = ?2 AND status = 'IDLE'
             ORDER BY id LIMIT ?3",
            UserCard::COLUMNS
        ),
        params![owner_id, photo_card_id, limit],
    )
}

pub fn count_idle(conn: &Connection, owner_id: i64, photo_card_id: i64) -> AppResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM user_cards
         WHERE owner_id = ?1 AND photo_card_id = ?2 AND status = 'IDLE'",
        params![owner_id, photo_card_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Every unit currently LISTED under the listing, lowest id first.
pub fn listed_cards(conn: &Connection, shop_listing_id: i64) -> AppResult<Vec<UserCard>> {
    query_cards(
        conn,
        &format!(
            "SELECT {} FROM user_cards
             WHERE shop_listing_id = ?1 AND status = 'LISTED'
             ORDER BY id",
            UserCard::COLUMNS
        ),
        params![shop_listing_id],
    )
}

/// The live count the listing's `remaining_quantity` must always equal.
pub fn count_listed(conn: &Connection, shop_listing_id: i64) -> AppResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM user_cards WHERE shop_listing_id = ?1 AND status = 'LISTED'",
        params![shop_listing_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Units to hand over when the listing sells: untargeted ones first, then
/// lowest id.
pub fn units_to_sell(conn: &Connection, shop_listing_id: i64, limit: i64) -> AppResult<Vec<UserCard>> {
    query_cards(
        conn,
        &format!(
            "SELECT {} FROM user_cards
             WHERE shop_listing_id = ?1 AND status = 'LISTED'
             ORDER BY {}, id LIMIT ?2",
            UserCard::COLUMNS,
            UNTARGETED_FIRST
        ),
        params![shop_listing_id, limit],
    )
}

/// Units to take back when the listing shrinks: untargeted ones first, then
/// highest id.
pub fn units_to_release(
    conn: &Connection,
    shop_listing_id: i64,
    limit: i64,
) -> AppResult<Vec<UserCard>> {
    query_cards(
        conn,
        &format!(
            "SELECT {} FROM user_cards
             WHERE shop_listing_id = ?1 AND status = 'LISTED'
             ORDER BY {}, id DESC LIMIT ?2",
            UserCard::COLUMNS,
            UNTARGETED_FIRST
        ),
        params![shop_listing_id, limit],
    )
}

/// IDLE -> LISTED. Each unit must be an idle unit of the listing's template
/// owned by the listing's seller.
pub fn mark_listed(conn: &Connection, card_ids: &[i64], shop_listing_id: i64) -> AppResult<()> {
    for &card_id in card_ids {
        let updated = conn.execute(
            "UPDATE user_cards
             SET status = 'LISTED', shop_listing_id = ?2, updated_at = datetime('now')
             WHERE id = ?1 AND status = 'IDLE'
               AND (owner_id, photo_card_id) =
                   (SELECT seller_id, photo_card_id FROM shop_listings WHERE id = ?2)",
            params![card_id, shop_listing_id],
        )?;
        if updated == 0 {
            return Err(AppError::Conflict(format!(
                "card {} is not an idle card of listing {}'s seller",
                card_id, shop_listing_id
            )));
        }
    }
    Ok(())
}

/// LISTED -> IDLE, owner unchanged.
pub fn mark_idle(conn: &Connection, card_ids: &[i64]) -> AppResult<()> {
    for &card_id in card_ids {
        let updated = conn.execute(
            "UPDATE user_cards
             SET status = 'IDLE', shop_listing_id = NULL, updated_at = datetime('now')
             WHERE id = ?1 AND status = 'LISTED'",
            params![card_id],
        )?;
        if updated == 0 {
            return Err(AppError::Conflict(format!("card {} is not listed", card_id)));
        }
    }
    Ok(())
}

/// Hand a unit to `new_owner_id`. It lands IDLE and unlisted, ready to be
/// traded again.
pub fn transfer_ownership(conn: &Connection, card_id: i64, new_owner_id: i64) -> AppResult<()> {
    let updated = conn.execute(
        "UPDATE user_cards
         SET owner_id = ?2, status = 'IDLE', shop_listing_id = NULL, updated_at = datetime('now')
         WHERE id = ?1",
        params![card_id, new_owner_id],
    )?;
    if updated == 0 {
        return Err(AppError::NotFound(format!("user card {}", card_id)));
    }
    tracing::debug!(card_id, new_owner_id, "Card ownership transferred");
    Ok(())
}
