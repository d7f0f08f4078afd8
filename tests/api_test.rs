use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use photocard_market::config::Config;
use photocard_market::db;
use photocard_market::routes;
use photocard_market::state::AppState;

fn app() -> Router {
    let pool = db::create_memory_pool().expect("Failed to create database");
    routes::app(AppState::new(pool, Config::default()))
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    user_id: Option<i64>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(id) = user_id {
        builder = builder.header("x-user-id", id.to_string());
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn register(app: &Router, name: &str) -> i64 {
    let (status, body) = call(
        app,
        Method::POST,
        "/users",
        None,
        Some(json!({ "nickname": name, "email": format!("{}@example.com", name) })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_i64().unwrap()
}

/// Returns (photo_card_id, unit ids).
async fn mint(app: &Router, owner: i64, name: &str, quantity: i64) -> (i64, Vec<i64>) {
    let (status, body) = call(
        app,
        Method::POST,
        "/cards",
        Some(owner),
        Some(json!({
            "name": name,
            "grade": "RARE",
            "genre": "idol",
            "price": 100,
            "total_quantity": quantity
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let ids = body["card_ids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_i64().unwrap())
        .collect();
    (body["photo_card"]["id"].as_i64().unwrap(), ids)
}

async fn list(app: &Router, seller: i64, photo_card_id: i64, quantity: i64, listing_type: &str) -> i64 {
    let (status, body) = call(
        app,
        Method::POST,
        "/shop",
        Some(seller),
        Some(json!({
            "photo_card_id": photo_card_id,
            "quantity": quantity,
            "price": 100,
            "listing_type": listing_type
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn register_and_read_profile() {
    let app = app();
    let alice = register(&app, "alice").await;

    let (status, body) = call(&app, Method::GET, "/users/me", Some(alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nickname"], "alice");
    assert_eq!(body["balance"], 0);

    let (status, body) = call(
        &app,
        Method::POST,
        "/users",
        None,
        Some(json!({ "nickname": "alice", "email": "other@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn listing_lifecycle_over_http() {
    let app = app();
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    let (card, units) = mint(&app, alice, "stage", 3).await;
    let listing_id = list(&app, alice, card, 2, "FOR_SALE").await;

    let (status, body) = call(&app, Method::GET, &format!("/shop/{}", listing_id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["listing"]["remaining_quantity"], 2);
    assert_eq!(body["seller_nickname"], "alice");
    assert_eq!(body["listed_card_ids"], json!(&units[..2]));

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/purchase/{}", listing_id),
        Some(bob),
        Some(json!({ "quantity": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_FUNDS");

    let (status, body) = call(
        &app,
        Method::PATCH,
        &format!("/shop/{}", listing_id),
        Some(alice),
        Some(json!({ "quantity": 3, "price": 120 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["remaining_quantity"], 3);
    assert_eq!(body["price"], 120);

    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/shop/{}", listing_id),
        Some(bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &app,
        Method::DELETE,
        &format!("/shop/{}", listing_id),
        Some(alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released_card_ids"], json!(units));

    let (status, body) = call(&app, Method::GET, &format!("/shop/{}", listing_id), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn exchange_over_http() {
    let app = app();
    let alice = register(&app, "alice").await;
    let carol = register(&app, "carol").await;
    let dave = register(&app, "dave").await;
    let (x, x_units) = mint(&app, alice, "x", 1).await;
    let (_, y_units) = mint(&app, carol, "y", 1).await;
    let listing_id = list(&app, alice, x, 1, "FOR_SALE_AND_TRADE").await;

    let (status, proposal) = call(
        &app,
        Method::POST,
        "/exchange",
        Some(carol),
        Some(json!({
            "target_card_id": x_units[0],
            "request_card_id": y_units[0],
            "description": "trade?"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", proposal);
    assert_eq!(proposal["status"], "REQUESTED");
    let exchange_id = proposal["id"].as_i64().unwrap();

    let uri = format!("/exchange/shop/{}", listing_id);
    let (status, body) = call(&app, Method::GET, &uri, Some(alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["proposer_nickname"], "carol");
    assert_eq!(body[0]["offered_card"]["name"], "y");

    let (status, _) = call(&app, Method::GET, &uri, Some(dave), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/exchange/{}/accept", exchange_id),
        Some(alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["exchange"]["status"], "ACCEPTED");
    assert_eq!(body["remaining_quantity"], 0);

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/exchange/{}/cancel", exchange_id),
        Some(carol),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("already accepted"));

    let (_, gallery) = call(&app, Method::GET, "/cards/mine", Some(carol), None).await;
    assert_eq!(gallery[0]["card_ids"], json!([x_units[0]]));
}

#[tokio::test]
async fn points_draw_respects_cooldown() {
    let app = app();
    let alice = register(&app, "alice").await;

    let (status, body) = call(&app, Method::GET, "/points/draw", Some(alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["can_draw"], true);

    let (status, drawn) = call(&app, Method::POST, "/points/draw", Some(alice), None).await;
    assert_eq!(status, StatusCode::OK);
    let reward = drawn["reward"].as_i64().unwrap();
    assert!((0..=100).contains(&reward));

    let (status, _) = call(&app, Method::POST, "/points/draw", Some(alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, balance) = call(&app, Method::GET, "/points", Some(alice), None).await;
    assert_eq!(balance["balance"], reward);

    let (_, history) = call(&app, Method::GET, "/points/history", Some(alice), None).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["point_type"], "DRAW");
}
