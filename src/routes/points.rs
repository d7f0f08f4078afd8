use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::db::models::PointHistoryEntry;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::ledger::{Cooldown, DrawResult};
use crate::routes::blocking;
use crate::state::AppState;

#[derive(Serialize)]
pub struct Balance {
    pub user_id: i64,
    pub balance: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/points", get(balance))
        .route("/points/history", get(history))
        .route("/points/draw", get(cooldown).post(draw))
}

async fn balance(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Balance>> {
    let balance = blocking(move || state.ledger.balance(user.id)).await?;
    Ok(Json(Balance {
        user_id: user.id,
        balance,
    }))
}

async fn history(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<PointHistoryEntry>>> {
    let entries = blocking(move || state.ledger.history(user.id)).await?;
    Ok(Json(entries))
}

async fn cooldown(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Cooldown>> {
    let cooldown = blocking(move || state.ledger.cooldown(user.id, Utc::now())).await?;
    Ok(Json(cooldown))
}

async fn draw(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<DrawResult>> {
    let result = blocking(move || {
        let mut rng = rand::thread_rng();
        state.ledger.draw(user.id, Utc::now(), &mut rng)
    })
    .await?;
    Ok(Json(result))
}
