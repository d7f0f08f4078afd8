//! Shop listings: a seller's offer of N units of one photo card.
//!
//! A listing's `remaining_quantity` always equals the number of units LISTED
//! under it. Every write in this module keeps the two in step inside the
//! same transaction, and [`reconcile_remaining`] repairs drift caused by
//! writes from outside this crate.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db;
use crate::db::models::{Exchange, ExchangePrefs, ListingType, PhotoCard, ShopListing};
use crate::error::{AppError, AppResult};
use crate::events::{EventBus, MarketEvent};
use crate::exchange::{self, RejectReason};
use crate::inventory::{self, catalog};
use crate::state::DbPool;
use crate::users;

#[derive(Debug, Clone, Deserialize)]
pub struct NewListing {
    pub photo_card_id: i64,
    pub quantity: i64,
    pub price: i64,
    pub listing_type: ListingType,
    #[serde(default)]
    pub exchange_prefs: Option<ExchangePrefs>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingUpdate {
    pub price: Option<i64>,
    pub listing_type: Option<ListingType>,
    pub exchange_prefs: Option<ExchangePrefs>,
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingDetail {
    pub listing: ShopListing,
    pub photo_card: PhotoCard,
    pub seller_nickname: String,
    pub listed_card_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelledListing {
    pub listing_id: i64,
    pub released_card_ids: Vec<i64>,
    pub rejected_exchange_ids: Vec<i64>,
}

/// Result of [`decrement_remaining`]: the updated listing plus the proposals
/// rejected because it sold out.
#[derive(Debug)]
pub struct Decrement {
    pub listing: ShopListing,
    pub rejected: Vec<Exchange>,
}

pub fn find(conn: &Connection, listing_id: i64) -> AppResult<ShopListing> {
    conn.query_row(
        &format!(
            "SELECT {} FROM shop_listings WHERE id = ?1",
            ShopListing::COLUMNS
        ),
        params![listing_id],
        ShopListing::from_row,
    )
    .optional()?
    .ok_or_else(|| AppError::NotFound(format!("shop listing {}", listing_id)))
}

fn query(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> AppResult<Vec<ShopListing>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, ShopListing::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn require_seller(listing: &ShopListing, seller_id: i64) -> AppResult<()> {
    if listing.seller_id != seller_id {
        return Err(AppError::BadRequest(format!(
            "Only the seller can modify listing {}",
            listing.id
        )));
    }
    Ok(())
}

/// Bring `remaining_quantity` back to the live LISTED count. `initial_quantity`
/// is raised if needed so the counter CHECK still holds.
pub fn reconcile_remaining(conn: &Connection, listing: &ShopListing) -> AppResult<ShopListing> {
    let live = inventory::count_listed(conn, listing.id)?;
    if live == listing.remaining_quantity {
        return Ok(listing.clone());
    }

    tracing::warn!(
        listing_id = listing.id,
        stored = listing.remaining_quantity,
        live,
        "Repairing drifted remaining quantity"
    );
    conn.execute(
        "UPDATE shop_listings
         SET remaining_quantity = ?2, initial_quantity = MAX(initial_quantity, ?2),
             updated_at = datetime('now')
         WHERE id = ?1",
        params![listing.id, live],
    )?;
    find(conn, listing.id)
}

/// Take `by` units off the counter after the caller moved that many units out
/// of the listing. Selling the last unit rejects whatever proposals are still
/// pending against it.
pub fn decrement_remaining(conn: &Connection, listing_id: i64, by: i64) -> AppResult<Decrement> {
    let updated = conn.execute(
        "UPDATE shop_listings
         SET remaining_quantity = remaining_quantity - ?2, updated_at = datetime('now')
         WHERE id = ?1 AND remaining_quantity >= ?2",
        params![listing_id, by],
    )?;
    if updated == 0 {
        let listing = find(conn, listing_id)?;
        return Err(AppError::Conflict(format!(
            "listing {} has {} remaining, cannot take {}",
            listing_id, listing.remaining_quantity, by
        )));
    }

    let listing = find(conn, listing_id)?;
    let rejected = if listing.is_sold_out() {
        exchange::store::reject_pending_for_listing(conn, listing_id)?
    } else {
        Vec::new()
    };
    Ok(Decrement { listing, rejected })
}

/// Put idle units under a listing. A listed card can no longer be handed over
/// in a swap, so pending proposals offering any of them are rejected.
fn list_units(conn: &Connection, card_ids: &[i64], listing_id: i64) -> AppResult<Vec<Exchange>> {
    inventory::mark_listed(conn, card_ids, listing_id)?;
    exchange::store::reject_pending_offering(conn, card_ids)
}

fn emit_offer_unavailable(events: &EventBus, rejected: &[Exchange]) {
    events.emit_all(
        rejected
            .iter()
            .map(|e| MarketEvent::rejected(e, RejectReason::OfferUnavailable)),
    );
}

/// Change the number of listed units to `new_quantity`, keeping the count of
/// units already sold. Returns the proposals rejected because a unit they
/// offered got listed.
fn resize_in(
    conn: &Connection,
    listing: &ShopListing,
    new_quantity: i64,
) -> AppResult<(ShopListing, Vec<Exchange>)> {
    if new_quantity < 1 {
        return Err(AppError::BadRequest(
            "Quantity must be at least 1, cancel the listing to withdraw it".into(),
        ));
    }

    let listing = reconcile_remaining(conn, listing)?;
    let current = listing.remaining_quantity;
    let mut rejected = Vec::new();

    if new_quantity < current {
        let release: Vec<i64> = inventory::units_to_release(conn, listing.id, current - new_quantity)?
            .into_iter()
            .map(|card| card.id)
            .collect();
        inventory::mark_idle(conn, &release)?;
    } else if new_quantity > current {
        let needed = new_quantity - current;
        let idle = inventory::idle_cards(conn, listing.seller_id, listing.photo_card_id, needed)?;
        if (idle.len() as i64) < needed {
            return Err(AppError::InsufficientInventory {
                requested: needed,
                available: idle.len() as i64,
            });
        }
        let ids: Vec<i64> = idle.into_iter().map(|card| card.id).collect();
        rejected = list_units(conn, &ids, listing.id)?;
    }

    conn.execute(
        "UPDATE shop_listings
         SET initial_quantity = ?2, remaining_quantity = ?3, updated_at = datetime('now')
         WHERE id = ?1",
        params![
            listing.id,
            listing.sold_quantity() + new_quantity,
            new_quantity
        ],
    )?;
    Ok((find(conn, listing.id)?, rejected))
}

/// Listing operations that are not part of a purchase or exchange.
#[derive(Clone)]
pub struct ShopService {
    pool: DbPool,
    events: EventBus,
}

impl ShopService {
    pub fn new(pool: DbPool, events: EventBus) -> Self {
        Self { pool, events }
    }

    /// List `quantity` of the seller's idle units of a photo card, lowest
    /// unit id first.
    pub fn create(&self, seller_id: i64, new_listing: NewListing) -> AppResult<ShopListing> {
        if new_listing.quantity < 1 {
            return Err(AppError::BadRequest("Quantity must be at least 1".into()));
        }
        if new_listing.price < 0 {
            return Err(AppError::BadRequest("Price cannot be negative".into()));
        }
        let prefs = if new_listing.listing_type.permits_trade() {
            new_listing.exchange_prefs.unwrap_or_default()
        } else {
            ExchangePrefs::default()
        };

        let (listing, rejected) =
            db::immediate(&self.pool, |conn| -> AppResult<(ShopListing, Vec<Exchange>)> {
                users::find(conn, seller_id)?;
                catalog::find_photo_card(conn, new_listing.photo_card_id)?;

                let idle = inventory::idle_cards(
                    conn,
                    seller_id,
                    new_listing.photo_card_id,
                    new_listing.quantity,
                )?;
                if (idle.len() as i64) < new_listing.quantity {
                    return Err(AppError::InsufficientInventory {
                        requested: new_listing.quantity,
                        available: idle.len() as i64,
                    });
                }

                conn.execute(
                    "INSERT INTO shop_listings
                         (seller_id, photo_card_id, price, listing_type, initial_quantity,
                          remaining_quantity, exchange_grade, exchange_genre, exchange_description)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, ?7, ?8)",
                    params![
                        seller_id,
                        new_listing.photo_card_id,
                        new_listing.price,
                        new_listing.listing_type,
                        new_listing.quantity,
                        prefs.grade,
                        prefs.genre,
                        prefs.description,
                    ],
                )?;
                let listing_id = conn.last_insert_rowid();

                let ids: Vec<i64> = idle.into_iter().map(|card| card.id).collect();
                let rejected = list_units(conn, &ids, listing_id)?;
                Ok((find(conn, listing_id)?, rejected))
            })?;

        tracing::info!(
            listing_id = listing.id,
            seller_id,
            photo_card_id = listing.photo_card_id,
            quantity = listing.remaining_quantity,
            listing_type = %listing.listing_type,
            rejected = rejected.len(),
            "Listing created"
        );
        emit_offer_unavailable(&self.events, &rejected);
        Ok(listing)
    }

    pub fn resize(&self, seller_id: i64, listing_id: i64, new_quantity: i64) -> AppResult<ShopListing> {
        let (listing, rejected) =
            db::immediate(&self.pool, |conn| -> AppResult<(ShopListing, Vec<Exchange>)> {
                let listing = find(conn, listing_id)?;
                require_seller(&listing, seller_id)?;
                resize_in(conn, &listing, new_quantity)
            })?;

        tracing::info!(
            listing_id,
            remaining = listing.remaining_quantity,
            initial = listing.initial_quantity,
            "Listing resized"
        );
        emit_offer_unavailable(&self.events, &rejected);
        Ok(listing)
    }

    /// Change price, type, preferences and/or quantity in one transaction.
    /// Turning trading off rejects the proposals still pending.
    pub fn update(
        &self,
        seller_id: i64,
        listing_id: i64,
        update: ListingUpdate,
    ) -> AppResult<ShopListing> {
        if matches!(update.price, Some(price) if price < 0) {
            return Err(AppError::BadRequest("Price cannot be negative".into()));
        }

        let (listing, unavailable, rejected) = db::immediate(
            &self.pool,
            |conn| -> AppResult<(ShopListing, Vec<Exchange>, Vec<Exchange>)> {
                let mut listing = find(conn, listing_id)?;
                require_seller(&listing, seller_id)?;

                let mut unavailable = Vec::new();
                if let Some(quantity) = update.quantity {
                    (listing, unavailable) = resize_in(conn, &listing, quantity)?;
                }

                let listing_type = update.listing_type.unwrap_or(listing.listing_type);
                let prefs = if listing_type.permits_trade() {
                    update
                        .exchange_prefs
                        .clone()
                        .or_else(|| listing.exchange_prefs.clone())
                        .unwrap_or_default()
                } else {
                    ExchangePrefs::default()
                };

                conn.execute(
                    "UPDATE shop_listings
                     SET price = ?2, listing_type = ?3, exchange_grade = ?4,
                         exchange_genre = ?5, exchange_description = ?6,
                         updated_at = datetime('now')
                     WHERE id = ?1",
                    params![
                        listing_id,
                        update.price.unwrap_or(listing.price),
                        listing_type,
                        prefs.grade,
                        prefs.genre,
                        prefs.description,
                    ],
                )?;

                let rejected = if !listing_type.permits_trade() {
                    exchange::store::reject_pending_for_listing(conn, listing_id)?
                } else {
                    Vec::new()
                };
                Ok((find(conn, listing_id)?, unavailable, rejected))
            },
        )?;

        tracing::info!(listing_id, seller_id, rejected = rejected.len(), "Listing updated");
        emit_offer_unavailable(&self.events, &unavailable);
        self.events.emit_all(
            rejected
                .iter()
                .map(|e| MarketEvent::rejected(e, RejectReason::ListingWithdrawn)),
        );
        Ok(listing)
    }

    /// Release every listed unit back to the seller, reject pending proposals
    /// and delete the listing.
    pub fn cancel(&self, seller_id: i64, listing_id: i64) -> AppResult<CancelledListing> {
        let (cancelled, rejected) =
            db::immediate(&self.pool, |conn| -> AppResult<(CancelledListing, Vec<Exchange>)> {
                let listing = find(conn, listing_id)?;
                require_seller(&listing, seller_id)?;

                let released: Vec<i64> = inventory::listed_cards(conn, listing_id)?
                    .into_iter()
                    .map(|card| card.id)
                    .collect();
                inventory::mark_idle(conn, &released)?;
                let rejected = exchange::store::reject_pending_for_listing(conn, listing_id)?;

                conn.execute("DELETE FROM shop_listings WHERE id = ?1", params![listing_id])?;

                let cancelled = CancelledListing {
                    listing_id,
                    released_card_ids: released,
                    rejected_exchange_ids: rejected.iter().map(|e| e.id).collect(),
                };
                Ok((cancelled, rejected))
            })?;

        tracing::info!(
            listing_id,
            seller_id,
            released = cancelled.released_card_ids.len(),
            rejected = rejected.len(),
            "Listing cancelled"
        );
        self.events.emit_all(
            rejected
                .iter()
                .map(|e| MarketEvent::rejected(e, RejectReason::ListingWithdrawn)),
        );
        Ok(cancelled)
    }

    pub fn detail(&self, listing_id: i64) -> AppResult<ListingDetail> {
        let conn = self.pool.get()?;
        let listing = find(&conn, listing_id)?;
        let photo_card = catalog::find_photo_card(&conn, listing.photo_card_id)?;
        let seller = users::find(&conn, listing.seller_id)?;
        let listed_card_ids = inventory::listed_cards(&conn, listing_id)?
            .into_iter()
            .map(|card| card.id)
            .collect();

        Ok(ListingDetail {
            listing,
            photo_card,
            seller_nickname: seller.nickname,
            listed_card_ids,
        })
    }

    /// Every listing of one photo card, newest first.
    pub fn listings_for_card(&self, photo_card_id: i64) -> AppResult<Vec<ShopListing>> {
        let conn = self.pool.get()?;
        catalog::find_photo_card(&conn, photo_card_id)?;
        query(
            &conn,
            &format!(
                "SELECT {} FROM shop_listings WHERE photo_card_id = ?1 ORDER BY id DESC",
                ShopListing::COLUMNS
            ),
            params![photo_card_id],
        )
    }

    pub fn listings_by_seller(&self, seller_id: i64) -> AppResult<Vec<ShopListing>> {
        let conn = self.pool.get()?;
        query(
            &conn,
            &format!(
                "SELECT {} FROM shop_listings WHERE seller_id = ?1 ORDER BY id DESC",
                ShopListing::COLUMNS
            ),
            params![seller_id],
        )
    }

    /// Repair the listing's counter from its live units.
    pub fn reconcile(&self, listing_id: i64) -> AppResult<ShopListing> {
        db::immediate(&self.pool, |conn| -> AppResult<ShopListing> {
            let listing = find(conn, listing_id)?;
            reconcile_remaining(conn, &listing)
        })
    }
}
