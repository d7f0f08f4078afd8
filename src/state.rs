use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::events::EventBus;
use crate::exchange::ExchangeEngine;
use crate::ledger::Ledger;
use crate::purchase::PurchaseEngine;
use crate::shop::ShopService;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub events: EventBus,
    pub ledger: Ledger,
    pub shop: ShopService,
    pub purchases: PurchaseEngine,
    pub exchanges: ExchangeEngine,
}

impl AppState {
    /// Wire every service onto one pool and one event bus.
    pub fn new(db: DbPool, config: Config) -> Self {
        let events = EventBus::new(config.events.capacity);
        Self {
            ledger: Ledger::new(db.clone(), config.draw.clone()),
            shop: ShopService::new(db.clone(), events.clone()),
            purchases: PurchaseEngine::new(db.clone(), events.clone()),
            exchanges: ExchangeEngine::new(db.clone(), events.clone()),
            events,
            db,
            config,
        }
    }
}
