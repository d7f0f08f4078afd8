use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::db::models::Exchange;
use crate::error::AppResult;
use crate::exchange::{AcceptedExchange, ProposalView};
use crate::extractors::CurrentUser;
use crate::routes::blocking;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ProposeForm {
    pub target_card_id: i64,
    pub request_card_id: i64,
    #[serde(default)]
    pub description: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/exchange", post(propose))
        .route("/exchange/{id}/accept", post(accept))
        .route("/exchange/{id}/reject", post(reject))
        .route("/exchange/{id}/cancel", post(cancel))
        .route("/exchange/shop/{shop_id}", get(list_for_listing))
}

async fn propose(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(form): Json<ProposeForm>,
) -> AppResult<(StatusCode, Json<Exchange>)> {
    let exchange = blocking(move || {
        state.exchanges.propose(
            user.id,
            form.target_card_id,
            form.request_card_id,
            &form.description,
        )
    })
    .await?;
    Ok((StatusCode::CREATED, Json(exchange)))
}

async fn accept(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<AcceptedExchange>> {
    let accepted = blocking(move || state.exchanges.accept(user.id, id)).await?;
    Ok(Json(accepted))
}

async fn reject(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Exchange>> {
    let exchange = blocking(move || state.exchanges.reject(user.id, id)).await?;
    Ok(Json(exchange))
}

async fn cancel(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Exchange>> {
    let exchange = blocking(move || state.exchanges.cancel(user.id, id)).await?;
    Ok(Json(exchange))
}

async fn list_for_listing(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(shop_id): Path<i64>,
) -> AppResult<Json<Vec<ProposalView>>> {
    let proposals = blocking(move || state.exchanges.list_proposals(user.id, shop_id)).await?;
    Ok(Json(proposals))
}
