//! Buying units from a shop listing with points.

use serde::Serialize;

use crate::db;
use crate::db::models::PointType;
use crate::error::{AppError, AppResult};
use crate::events::{EventBus, MarketEvent};
use crate::exchange::RejectReason;
use crate::inventory::{self, catalog};
use crate::ledger;
use crate::shop;
use crate::state::DbPool;
use crate::users;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseReceipt {
    pub listing_id: i64,
    pub photo_card_id: i64,
    pub seller_id: i64,
    pub buyer_id: i64,
    pub quantity: i64,
    pub unit_price: i64,
    pub total_price: i64,
    /// Units now owned by the buyer.
    pub card_ids: Vec<i64>,
    pub remaining_quantity: i64,
    pub buyer_balance: i64,
}

#[derive(Clone)]
pub struct PurchaseEngine {
    pool: DbPool,
    events: EventBus,
}

impl PurchaseEngine {
    pub fn new(pool: DbPool, events: EventBus) -> Self {
        Self { pool, events }
    }

    /// Move `quantity` units from the listing to the buyer and the points the
    /// other way, all in one transaction.
    ///
    /// A drifted listing counter is repaired before the stock check, and the
    /// repair is committed even when the purchase itself is refused.
    pub fn purchase(
        &self,
        buyer_id: i64,
        listing_id: i64,
        quantity: i64,
    ) -> AppResult<PurchaseReceipt> {
        if quantity < 1 {
            return Err(AppError::BadRequest("Quantity must be at least 1".into()));
        }

        // Outer error rolls back, inner error commits the counter repair.
        let outcome = db::immediate(
            &self.pool,
            |conn| -> AppResult<AppResult<(PurchaseReceipt, Vec<MarketEvent>)>> {
                users::find(conn, buyer_id)?;
                let listing = shop::find(conn, listing_id)?;
                if listing.seller_id == buyer_id {
                    return Err(AppError::BadRequest("Cannot buy your own listing".into()));
                }
                if !listing.listing_type.permits_purchase() {
                    return Err(AppError::BadRequest(format!(
                        "Listing {} is not for sale",
                        listing_id
                    )));
                }

                let listing = shop::reconcile_remaining(conn, &listing)?;
                if listing.remaining_quantity < quantity {
                    return Ok(Err(AppError::InsufficientInventory {
                        requested: quantity,
                        available: listing.remaining_quantity,
                    }));
                }

                let total = match listing.price.checked_mul(quantity) {
                    Some(total) => total,
                    None => return Err(AppError::BadRequest("Purchase total overflows".into())),
                };
                let available = ledger::balance(conn, buyer_id)?;
                if available < total {
                    return Ok(Err(AppError::InsufficientFunds {
                        user_id: buyer_id,
                        required: total,
                        available,
                    }));
                }

                let units = inventory::units_to_sell(conn, listing_id, quantity)?;
                let buyer_balance = ledger::adjust(conn, buyer_id, -total, PointType::Purchase)?;
                ledger::adjust(conn, listing.seller_id, total, PointType::Sale)?;
                for unit in &units {
                    inventory::transfer_ownership(conn, unit.id, buyer_id)?;
                }
                let decrement = shop::decrement_remaining(conn, listing_id, quantity)?;
                let photo_card = catalog::find_photo_card(conn, listing.photo_card_id)?;

                let receipt = PurchaseReceipt {
                    listing_id,
                    photo_card_id: listing.photo_card_id,
                    seller_id: listing.seller_id,
                    buyer_id,
                    quantity,
                    unit_price: listing.price,
                    total_price: total,
                    card_ids: units.iter().map(|unit| unit.id).collect(),
                    remaining_quantity: decrement.listing.remaining_quantity,
                    buyer_balance,
                };

                let mut events = vec![MarketEvent::CardsPurchased {
                    seller_id: listing.seller_id,
                    buyer_id,
                    shop_listing_id: listing_id,
                    photo_card_id: listing.photo_card_id,
                    card_name: photo_card.name,
                    quantity,
                    total_price: total,
                }];
                events.extend(
                    decrement
                        .rejected
                        .iter()
                        .map(|e| MarketEvent::rejected(e, RejectReason::ListingExhausted)),
                );
                Ok(Ok((receipt, events)))
            },
        )?;

        let (receipt, events) = match outcome {
            Ok(done) => done,
            Err(e) => {
                tracing::info!(buyer_id, listing_id, quantity, error = %e, "Purchase refused");
                return Err(e);
            }
        };

        tracing::info!(
            listing_id,
            buyer_id,
            seller_id = receipt.seller_id,
            quantity,
            total_price = receipt.total_price,
            remaining = receipt.remaining_quantity,
            "Purchase completed"
        );
        self.events.emit_all(events);
        Ok(receipt)
    }
}
