use rusqlite::Connection;
use serde::Serialize;

use super::domain::{decide, Decision, RejectReason};
use super::store;
use crate::db;
use crate::db::models::{CardStatus, Exchange, PhotoCard, ShopListing};
use crate::error::{AppError, AppResult};
use crate::events::{EventBus, MarketEvent};
use crate::inventory::{self, catalog};
use crate::shop;
use crate::state::DbPool;
use crate::users;

/// A proposal as shown to the listing's seller or to its proposer.
#[derive(Debug, Clone, Serialize)]
pub struct ProposalView {
    #[serde(flatten)]
    pub exchange: Exchange,
    pub offered_card: PhotoCard,
    pub proposer_nickname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceptedExchange {
    pub exchange: Exchange,
    /// Listed unit that went to the proposer.
    pub listed_card_id: i64,
    /// Offered unit that went to the seller.
    pub offered_card_id: i64,
    pub remaining_quantity: i64,
    pub rejected_exchange_ids: Vec<i64>,
}

#[derive(Clone)]
pub struct ExchangeEngine {
    pool: DbPool,
    events: EventBus,
}

impl ExchangeEngine {
    pub fn new(pool: DbPool, events: EventBus) -> Self {
        Self { pool, events }
    }

    /// Offer one of the proposer's idle cards for a unit listed for trade.
    pub fn propose(
        &self,
        proposer_id: i64,
        target_card_id: i64,
        request_card_id: i64,
        description: &str,
    ) -> AppResult<Exchange> {
        let (exchange, listing) = db::immediate(&self.pool, |conn| -> AppResult<(Exchange, ShopListing)> {
            let offered = inventory::find(conn, request_card_id)?;
            let target = inventory::find(conn, target_card_id)?;

            if offered.owner_id != proposer_id {
                return Err(AppError::BadRequest(format!(
                    "Card {} does not belong to you",
                    request_card_id
                )));
            }
            if offered.status != CardStatus::Idle {
                return Err(AppError::BadRequest(format!(
                    "Card {} is listed in the shop and cannot be offered",
                    request_card_id
                )));
            }
            let listing_id = match (target.status, target.shop_listing_id) {
                (CardStatus::Listed, Some(listing_id)) => listing_id,
                _ => {
                    return Err(AppError::BadRequest(format!(
                        "Card {} is not listed in the shop",
                        target_card_id
                    )))
                }
            };
            let listing = shop::find(conn, listing_id)?;
            if !listing.listing_type.permits_trade() {
                return Err(AppError::BadRequest(format!(
                    "Listing {} does not accept exchange proposals",
                    listing_id
                )));
            }
            if listing.seller_id == proposer_id {
                return Err(AppError::BadRequest(
                    "Cannot propose an exchange on your own listing".into(),
                ));
            }
            if store::already_offered(conn, request_card_id, listing_id)? {
                return Err(AppError::BadRequest(format!(
                    "Card {} is already offered for listing {}",
                    request_card_id, listing_id
                )));
            }

            let exchange = store::insert(
                conn,
                proposer_id,
                request_card_id,
                target_card_id,
                listing_id,
                description,
            )?;
            Ok((exchange, listing))
        })?;

        tracing::info!(
            exchange_id = exchange.id,
            proposer_id,
            seller_id = listing.seller_id,
            request_card_id,
            target_card_id,
            "Exchange proposed"
        );
        self.events.emit(MarketEvent::ExchangeProposed {
            seller_id: listing.seller_id,
            proposer_id,
            exchange_id: exchange.id,
            shop_listing_id: listing.id,
            request_card_id,
            target_card_id,
        });
        Ok(exchange)
    }

    /// Swap the two cards, take one unit off the listing, and reject the
    /// proposals this acceptance made impossible.
    pub fn accept(&self, seller_id: i64, exchange_id: i64) -> AppResult<AcceptedExchange> {
        let (accepted, events) =
            db::immediate(&self.pool, |conn| -> AppResult<(AcceptedExchange, Vec<MarketEvent>)> {
                let exchange = store::find(conn, exchange_id)?;
                let next = decide(exchange.status, Decision::Accept)?;
                let listing = owned_listing(conn, &exchange, seller_id)?;
                if listing.remaining_quantity < 1 {
                    return Err(AppError::BadRequest(format!(
                        "Listing {} has no cards left",
                        listing.id
                    )));
                }

                let offered = inventory::find(conn, exchange.request_card_id)?;
                if offered.owner_id != exchange.proposer_id || offered.status != CardStatus::Idle {
                    return Err(AppError::BadRequest(format!(
                        "Offered card {} is no longer available",
                        offered.id
                    )));
                }

                // Units of one listing are interchangeable; if the requested one
                // is gone, hand over another.
                let target = inventory::find(conn, exchange.target_card_id)?;
                let given_card_id = if target.status == CardStatus::Listed
                    && target.shop_listing_id == Some(listing.id)
                {
                    target.id
                } else {
                    let substitute = inventory::units_to_sell(conn, listing.id, 1)?
                        .into_iter()
                        .next()
                        .ok_or_else(|| {
                            AppError::Conflict(format!("listing {} has no listed units", listing.id))
                        })?;
                    store::retarget(conn, exchange_id, substitute.id)?;
                    substitute.id
                };

                store::set_status(conn, exchange_id, next)?;
                inventory::transfer_ownership(conn, offered.id, listing.seller_id)?;
                inventory::transfer_ownership(conn, given_card_id, exchange.proposer_id)?;
                let decrement = shop::decrement_remaining(conn, listing.id, 1)?;
                let unavailable = store::reject_pending_offering(conn, &[offered.id, given_card_id])?;

                let mut events = vec![MarketEvent::ExchangeAccepted {
                    proposer_id: exchange.proposer_id,
                    seller_id: listing.seller_id,
                    exchange_id,
                    received_card_id: given_card_id,
                    given_card_id: offered.id,
                }];
                events.extend(
                    decrement
                        .rejected
                        .iter()
                        .map(|e| MarketEvent::rejected(e, RejectReason::ListingExhausted)),
                );
                events.extend(
                    unavailable
                        .iter()
                        .map(|e| MarketEvent::rejected(e, RejectReason::OfferUnavailable)),
                );

                let accepted = AcceptedExchange {
                    exchange: store::find(conn, exchange_id)?,
                    listed_card_id: given_card_id,
                    offered_card_id: offered.id,
                    remaining_quantity: decrement.listing.remaining_quantity,
                    rejected_exchange_ids: decrement
                        .rejected
                        .iter()
                        .chain(unavailable.iter())
                        .map(|e| e.id)
                        .collect(),
                };
                Ok((accepted, events))
            })?;

        tracing::info!(
            exchange_id,
            seller_id,
            proposer_id = accepted.exchange.proposer_id,
            remaining = accepted.remaining_quantity,
            rejected = accepted.rejected_exchange_ids.len(),
            "Exchange accepted"
        );
        self.events.emit_all(events);
        Ok(accepted)
    }

    pub fn reject(&self, seller_id: i64, exchange_id: i64) -> AppResult<Exchange> {
        let exchange = db::immediate(&self.pool, |conn| -> AppResult<Exchange> {
            let exchange = store::find(conn, exchange_id)?;
            let next = decide(exchange.status, Decision::Reject)?;
            owned_listing(conn, &exchange, seller_id)?;
            store::set_status(conn, exchange_id, next)?;
            store::find(conn, exchange_id)
        })?;

        tracing::info!(exchange_id, seller_id, "Exchange rejected");
        self.events
            .emit(MarketEvent::rejected(&exchange, RejectReason::Declined));
        Ok(exchange)
    }

    /// Withdraw a pending proposal. Only the proposer may do this.
    pub fn cancel(&self, proposer_id: i64, exchange_id: i64) -> AppResult<Exchange> {
        let (exchange, seller_id) =
            db::immediate(&self.pool, |conn| -> AppResult<(Exchange, Option<i64>)> {
                let exchange = store::find(conn, exchange_id)?;
                if exchange.proposer_id != proposer_id {
                    return Err(AppError::BadRequest(
                        "Only the proposer can cancel this exchange".into(),
                    ));
                }
                let next = decide(exchange.status, Decision::Cancel)?;
                store::set_status(conn, exchange_id, next)?;

                let seller_id = match exchange.shop_listing_id {
                    Some(listing_id) => Some(shop::find(conn, listing_id)?.seller_id),
                    None => None,
                };
                Ok((store::find(conn, exchange_id)?, seller_id))
            })?;

        tracing::info!(exchange_id, proposer_id, "Exchange cancelled");
        if let Some(seller_id) = seller_id {
            self.events.emit(MarketEvent::ExchangeCancelled {
                seller_id,
                proposer_id,
                exchange_id,
            });
        }
        Ok(exchange)
    }

    /// The seller sees every proposal on the listing; anyone else sees only
    /// their own and is refused if they have none.
    pub fn list_proposals(&self, viewer_id: i64, listing_id: i64) -> AppResult<Vec<ProposalView>> {
        let conn = self.pool.get()?;
        let listing = shop::find(&conn, listing_id)?;

        let exchanges = if listing.seller_id == viewer_id {
            store::for_listing(&conn, listing_id, None)?
        } else {
            let own = store::for_listing(&conn, listing_id, Some(viewer_id))?;
            if own.is_empty() {
                return Err(AppError::Forbidden(format!(
                    "No access to proposals on listing {}",
                    listing_id
                )));
            }
            own
        };

        exchanges
            .into_iter()
            .map(|exchange| -> AppResult<ProposalView> {
                let offered = inventory::find(&conn, exchange.request_card_id)?;
                let offered_card = catalog::find_photo_card(&conn, offered.photo_card_id)?;
                let proposer = users::find(&conn, exchange.proposer_id)?;
                Ok(ProposalView {
                    exchange,
                    offered_card,
                    proposer_nickname: proposer.nickname,
                })
            })
            .collect()
    }
}

/// The listing the proposal was made against, provided `seller_id` owns it.
fn owned_listing(conn: &Connection, exchange: &Exchange, seller_id: i64) -> AppResult<ShopListing> {
    let listing_id = exchange.shop_listing_id.ok_or_else(|| {
        AppError::BadRequest(format!(
            "The listing for exchange {} has been withdrawn",
            exchange.id
        ))
    })?;
    let listing = shop::find(conn, listing_id)?;
    if listing.seller_id != seller_id {
        return Err(AppError::BadRequest(format!(
            "Only the seller can decide exchange {}",
            exchange.id
        )));
    }
    Ok(listing)
}
