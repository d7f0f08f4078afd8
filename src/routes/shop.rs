use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::db::models::ShopListing;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::routes::blocking;
use crate::shop::{CancelledListing, ListingDetail, ListingUpdate, NewListing};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/shop", post(create))
        .route("/shop/mine", get(mine))
        .route(
            "/shop/{id}",
            get(detail).patch(update).put(update).delete(cancel),
        )
}

async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(new_listing): Json<NewListing>,
) -> AppResult<(StatusCode, Json<ShopListing>)> {
    let listing = blocking(move || state.shop.create(user.id, new_listing)).await?;
    Ok((StatusCode::CREATED, Json(listing)))
}

async fn mine(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<ShopListing>>> {
    let listings = blocking(move || state.shop.listings_by_seller(user.id)).await?;
    Ok(Json(listings))
}

async fn detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ListingDetail>> {
    let detail = blocking(move || state.shop.detail(id)).await?;
    Ok(Json(detail))
}

async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(update): Json<ListingUpdate>,
) -> AppResult<Json<ShopListing>> {
    let listing = blocking(move || state.shop.update(user.id, id, update)).await?;
    Ok(Json(listing))
}

async fn cancel(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<CancelledListing>> {
    let cancelled = blocking(move || state.shop.cancel(user.id, id)).await?;
    Ok(Json(cancelled))
}
