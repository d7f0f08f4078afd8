use photocard_market::config::Config;
use photocard_market::db;
use photocard_market::db::models::{CardStatus, ExchangeStatus, Grade, ListingType, PointType};
use photocard_market::error::AppError;
use photocard_market::inventory::{self, catalog, NewPhotoCard};
use photocard_market::ledger;
use photocard_market::shop::{self, NewListing};
use photocard_market::state::{AppState, DbPool};
use photocard_market::users::{self, NewUser};
use tempfile::TempDir;

struct Market {
    _dir: TempDir,
    state: AppState,
}

impl Market {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let pool = db::create_pool(&dir.path().join("market.db")).expect("Failed to create pool");
        db::run_migrations(&pool).expect("Failed to run migrations");
        Self {
            _dir: dir,
            state: AppState::new(pool, Config::default()),
        }
    }

    fn pool(&self) -> &DbPool {
        &self.state.db
    }

    fn user(&self, name: &str, points: i64) -> i64 {
        let user = users::register(
            self.pool(),
            NewUser {
                nickname: name.into(),
                email: format!("{}@example.com", name),
                password: None,
            },
        )
        .unwrap();
        if points > 0 {
            let conn = self.pool().get().unwrap();
            ledger::adjust(&conn, user.id, points, PointType::Draw).unwrap();
        }
        user.id
    }

    /// Returns (photo_card_id, unit ids).
    fn mint(&self, owner: i64, name: &str, quantity: i64) -> (i64, Vec<i64>) {
        let minted = catalog::mint(
            self.pool(),
            owner,
            NewPhotoCard {
                name: name.into(),
                grade: Grade::Legendary,
                genre: "idol".into(),
                image_url: Some(format!("https://img.example.com/{}.png", name)),
                description: None,
                price: 100,
                total_quantity: quantity,
            },
        )
        .unwrap();
        (minted.photo_card.id, minted.card_ids)
    }

    fn list(&self, seller: i64, photo_card_id: i64, quantity: i64, listing_type: ListingType) -> i64 {
        self.state
            .shop
            .create(
                seller,
                NewListing {
                    photo_card_id,
                    quantity,
                    price: 100,
                    listing_type,
                    exchange_prefs: None,
                },
            )
            .unwrap()
            .id
    }

    /// Every listing counter matches its live units and every balance
    /// matches its history.
    fn assert_consistent(&self) {
        let conn = self.pool().get().unwrap();
        let listings: Vec<i64> = conn
            .prepare("SELECT id FROM shop_listings")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        for id in listings {
            let listing = shop::find(&conn, id).unwrap();
            assert_eq!(
                listing.remaining_quantity,
                inventory::count_listed(&conn, id).unwrap(),
                "listing {} counter drifted",
                id
            );
            assert!(listing.remaining_quantity <= listing.initial_quantity);
        }

        let user_ids: Vec<i64> = conn
            .prepare("SELECT id FROM users")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        for id in user_ids {
            assert!(
                ledger::reconcile(&conn, id).unwrap().is_consistent(),
                "ledger for user {} does not reconcile",
                id
            );
        }
    }
}

#[test]
fn list_buy_resize_cancel_round_trip() {
    let market = Market::new();
    let alice = market.user("alice", 0);
    let bob = market.user("bob", 1000);
    let (card, units) = market.mint(alice, "stage", 4);

    let listing_id = market.list(alice, card, 3, ListingType::ForSale);
    assert_eq!(&market.state.shop.detail(listing_id).unwrap().listed_card_ids, &units[..3]);

    let receipt = market.state.purchases.purchase(bob, listing_id, 2).unwrap();
    assert_eq!(receipt.remaining_quantity, 1);
    let bought = receipt.card_ids.clone();
    market.assert_consistent();

    let resized = market.state.shop.resize(alice, listing_id, 2).unwrap();
    assert_eq!(resized.remaining_quantity, 2);
    assert_eq!(resized.initial_quantity, 4);
    market.assert_consistent();

    market.state.shop.cancel(alice, listing_id).unwrap();

    let conn = market.pool().get().unwrap();
    assert!(matches!(shop::find(&conn, listing_id), Err(AppError::NotFound(_))));
    for id in &units {
        let unit = inventory::find(&conn, *id).unwrap();
        assert_eq!(unit.status, CardStatus::Idle);
        assert_eq!(unit.shop_listing_id, None);
        let expected_owner = if bought.contains(id) { bob } else { alice };
        assert_eq!(unit.owner_id, expected_owner, "unit {}", id);
    }
    assert_eq!(ledger::balance(&conn, alice).unwrap(), 200);
    assert_eq!(ledger::balance(&conn, bob).unwrap(), 800);
    drop(conn);
    market.assert_consistent();
}

#[test]
fn bob_cannot_afford_two_units() {
    let market = Market::new();
    let alice = market.user("alice", 0);
    let bob = market.user("bob", 150);
    let (card, _) = market.mint(alice, "x", 2);
    let listing_id = market.list(alice, card, 2, ListingType::ForSale);

    let err = market.state.purchases.purchase(bob, listing_id, 2).unwrap_err();
    assert!(matches!(err, AppError::InsufficientFunds { .. }));

    let conn = market.pool().get().unwrap();
    assert_eq!(ledger::balance(&conn, bob).unwrap(), 150);
    assert_eq!(shop::find(&conn, listing_id).unwrap().remaining_quantity, 2);
    assert_eq!(ledger::history(&conn, bob).unwrap().len(), 1);
    drop(conn);
    market.assert_consistent();
}

#[test]
fn carol_trades_her_card_for_alices_listing() {
    let market = Market::new();
    let alice = market.user("alice", 0);
    let carol = market.user("carol", 0);
    let (x, x_units) = market.mint(alice, "x", 1);
    let (_, y_units) = market.mint(carol, "y", 1);
    let listing_id = market.list(alice, x, 1, ListingType::ForSaleAndTrade);

    let proposal = market
        .state
        .exchanges
        .propose(carol, x_units[0], y_units[0], "y for x?")
        .unwrap();
    let accepted = market.state.exchanges.accept(alice, proposal.id).unwrap();
    assert_eq!(accepted.exchange.status, ExchangeStatus::Accepted);

    let conn = market.pool().get().unwrap();
    let x_unit = inventory::find(&conn, x_units[0]).unwrap();
    assert_eq!((x_unit.owner_id, x_unit.status), (carol, CardStatus::Idle));
    let y_unit = inventory::find(&conn, y_units[0]).unwrap();
    assert_eq!((y_unit.owner_id, y_unit.status), (alice, CardStatus::Idle));
    assert_eq!(shop::find(&conn, listing_id).unwrap().remaining_quantity, 0);
    drop(conn);
    market.assert_consistent();
}

#[test]
fn same_offer_twice_is_refused() {
    let market = Market::new();
    let alice = market.user("alice", 0);
    let carol = market.user("carol", 0);
    let (x, x_units) = market.mint(alice, "x", 1);
    let (_, y_units) = market.mint(carol, "y", 1);
    market.list(alice, x, 1, ListingType::ForSaleAndTrade);

    market
        .state
        .exchanges
        .propose(carol, x_units[0], y_units[0], "")
        .unwrap();
    let err = market
        .state
        .exchanges
        .propose(carol, x_units[0], y_units[0], "")
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[test]
fn cancelled_offer_still_blocks_reproposal_but_rejected_does_not() {
    let market = Market::new();
    let alice = market.user("alice", 0);
    let carol = market.user("carol", 0);
    let (x, x_units) = market.mint(alice, "x", 1);
    let (_, y_units) = market.mint(carol, "y", 2);
    market.list(alice, x, 1, ListingType::ForSaleAndTrade);
    let exchanges = &market.state.exchanges;

    let first = exchanges.propose(carol, x_units[0], y_units[0], "").unwrap();
    exchanges.cancel(carol, first.id).unwrap();
    let err = exchanges
        .propose(carol, x_units[0], y_units[0], "")
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let second = exchanges.propose(carol, x_units[0], y_units[1], "").unwrap();
    exchanges.reject(alice, second.id).unwrap();
    exchanges.propose(carol, x_units[0], y_units[1], "").unwrap();
    market.assert_consistent();
}

#[test]
fn traded_cards_can_be_relisted_by_their_new_owner() {
    let market = Market::new();
    let alice = market.user("alice", 0);
    let bob = market.user("bob", 500);
    let dave = market.user("dave", 500);
    let (card, _) = market.mint(alice, "z", 1);

    let first = market.list(alice, card, 1, ListingType::ForSale);
    market.state.purchases.purchase(bob, first, 1).unwrap();

    let second = market.list(bob, card, 1, ListingType::ForSale);
    let receipt = market.state.purchases.purchase(dave, second, 1).unwrap();
    assert_eq!(receipt.seller_id, bob);

    let conn = market.pool().get().unwrap();
    assert_eq!(ledger::balance(&conn, alice).unwrap(), 100);
    assert_eq!(ledger::balance(&conn, bob).unwrap(), 500);
    assert_eq!(ledger::balance(&conn, dave).unwrap(), 400);
    drop(conn);
    market.assert_consistent();
}

#[test]
fn mixed_activity_keeps_every_invariant() {
    let market = Market::new();
    let alice = market.user("alice", 0);
    let bob = market.user("bob", 400);
    let carol = market.user("carol", 300);
    let (x, x_units) = market.mint(alice, "x", 5);
    let (_, c_units) = market.mint(carol, "c", 2);

    let listing_id = market.list(alice, x, 4, ListingType::ForSaleAndTrade);
    let p1 = market
        .state
        .exchanges
        .propose(carol, x_units[0], c_units[0], "")
        .unwrap();
    let p2 = market
        .state
        .exchanges
        .propose(carol, x_units[1], c_units[1], "")
        .unwrap();
    market.assert_consistent();

    market.state.purchases.purchase(bob, listing_id, 2).unwrap();
    market.assert_consistent();

    market.state.exchanges.accept(alice, p1.id).unwrap();
    market.state.exchanges.reject(alice, p2.id).unwrap();
    market.assert_consistent();

    market.state.shop.resize(alice, listing_id, 2).unwrap();
    market.state.purchases.purchase(carol, listing_id, 2).unwrap();
    market.assert_consistent();

    let err = market.state.purchases.purchase(bob, listing_id, 1).unwrap_err();
    assert!(matches!(err, AppError::InsufficientInventory { .. }));
    market.assert_consistent();
}
