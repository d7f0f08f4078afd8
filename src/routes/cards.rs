use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::db::models::{PhotoCard, ShopListing};
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::inventory::catalog::{self, GalleryEntry, MintedCard, NewPhotoCard};
use crate::routes::blocking;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cards", post(mint))
        .route("/cards/mine", get(gallery))
        .route("/cards/{photo_card_id}", get(get_card))
        .route("/cards/{photo_card_id}/listings", get(listings))
}

async fn mint(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(new_card): Json<NewPhotoCard>,
) -> AppResult<(StatusCode, Json<MintedCard>)> {
    let minted = blocking(move || catalog::mint(&state.db, user.id, new_card)).await?;
    Ok((StatusCode::CREATED, Json(minted)))
}

async fn gallery(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<GalleryEntry>>> {
    let entries = blocking(move || catalog::gallery(&state.db, user.id)).await?;
    Ok(Json(entries))
}

async fn get_card(
    State(state): State<AppState>,
    Path(photo_card_id): Path<i64>,
) -> AppResult<Json<PhotoCard>> {
    let card = blocking(move || catalog::get(&state.db, photo_card_id)).await?;
    Ok(Json(card))
}

async fn listings(
    State(state): State<AppState>,
    Path(photo_card_id): Path<i64>,
) -> AppResult<Json<Vec<ShopListing>>> {
    let listings = blocking(move || state.shop.listings_for_card(photo_card_id)).await?;
    Ok(Json(listings))
}
