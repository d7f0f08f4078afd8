//! Domain events emitted by the marketplace core after a transaction commits.
//!
//! Delivery, storage and formatting of notifications live outside this crate;
//! consumers subscribe to the [`EventBus`] and do whatever they need.

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::db::models::Exchange;
use crate::exchange::RejectReason;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    /// Sent to the seller.
    CardsPurchased {
        seller_id: i64,
        buyer_id: i64,
        shop_listing_id: i64,
        photo_card_id: i64,
        card_name: String,
        quantity: i64,
        total_price: i64,
    },
    /// Sent to the listing's seller.
    ExchangeProposed {
        seller_id: i64,
        proposer_id: i64,
        exchange_id: i64,
        shop_listing_id: i64,
        request_card_id: i64,
        target_card_id: i64,
    },
    /// Sent to the proposer.
    ExchangeAccepted {
        proposer_id: i64,
        seller_id: i64,
        exchange_id: i64,
        received_card_id: i64,
        given_card_id: i64,
    },
    /// Sent to the proposer.
    ExchangeRejected {
        proposer_id: i64,
        exchange_id: i64,
        reason: RejectReason,
    },
    /// Sent to the listing's seller.
    ExchangeCancelled {
        seller_id: i64,
        proposer_id: i64,
        exchange_id: i64,
    },
}

impl MarketEvent {
    pub fn rejected(exchange: &Exchange, reason: RejectReason) -> Self {
        Self::ExchangeRejected {
            proposer_id: exchange.proposer_id,
            exchange_id: exchange.id,
            reason,
        }
    }

    /// The user this event should be delivered to.
    pub fn recipient(&self) -> i64 {
        match self {
            Self::CardsPurchased { seller_id, .. } => *seller_id,
            Self::ExchangeProposed { seller_id, .. } => *seller_id,
            Self::ExchangeAccepted { proposer_id, .. } => *proposer_id,
            Self::ExchangeRejected { proposer_id, .. } => *proposer_id,
            Self::ExchangeCancelled { seller_id, .. } => *seller_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CardsPurchased { .. } => "cards_purchased",
            Self::ExchangeProposed { .. } => "exchange_proposed",
            Self::ExchangeAccepted { .. } => "exchange_accepted",
            Self::ExchangeRejected { .. } => "exchange_rejected",
            Self::ExchangeCancelled { .. } => "exchange_cancelled",
        }
    }
}

/// Fan-out channel for [`MarketEvent`]s. Cloning shares the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MarketEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.tx.subscribe()
    }

    /// Publish one event. Having no subscribers is not an error.
    pub fn emit(&self, event: MarketEvent) {
        let name = event.name();
        let recipient = event.recipient();
        match self.tx.send(event) {
            Ok(receivers) => {
                tracing::debug!(event = name, recipient, receivers, "Event emitted");
            }
            Err(_) => {
                tracing::debug!(event = name, recipient, "Event dropped, no subscribers");
            }
        }
    }

    pub fn emit_all(&self, events: impl IntoIterator<Item = MarketEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}

/// Stand-in dispatcher: logs every event until the bus is dropped.
pub fn spawn_logger(mut rx: broadcast::Receiver<MarketEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let payload = serde_json::to_string(&event).unwrap_or_default();
                    tracing::info!(
                        event = event.name(),
                        recipient = event.recipient(),
                        %payload,
                        "Notification"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Notification logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn purchase_event() -> MarketEvent {
        MarketEvent::CardsPurchased {
            seller_id: 1,
            buyer_id: 2,
            shop_listing_id: 3,
            photo_card_id: 4,
            card_name: "Sunset".into(),
            quantity: 2,
            total_price: 200,
        }
    }

    #[test]
    fn emit_without_subscribers_is_harmless() {
        let bus = EventBus::new(4);
        bus.emit(purchase_event());
    }

    #[test]
    fn subscribers_receive_events_in_order() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();

        bus.emit_all([
            purchase_event(),
            MarketEvent::ExchangeCancelled {
                seller_id: 1,
                proposer_id: 5,
                exchange_id: 9,
            },
        ]);

        assert_eq!(rx.try_recv().unwrap(), purchase_event());
        assert_eq!(rx.try_recv().unwrap().name(), "exchange_cancelled");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn recipient_follows_event_direction() {
        assert_eq!(purchase_event().recipient(), 1);
        let accepted = MarketEvent::ExchangeAccepted {
            proposer_id: 7,
            seller_id: 1,
            exchange_id: 3,
            received_card_id: 10,
            given_card_id: 11,
        };
        assert_eq!(accepted.recipient(), 7);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(MarketEvent::ExchangeRejected {
            proposer_id: 2,
            exchange_id: 8,
            reason: RejectReason::ListingExhausted,
        })
        .unwrap();
        assert_eq!(json["type"], "exchange_rejected");
        assert_eq!(json["reason"], "LISTING_EXHAUSTED");
    }
}
