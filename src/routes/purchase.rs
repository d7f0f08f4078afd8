use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::purchase::PurchaseReceipt;
use crate::routes::blocking;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct PurchaseForm {
    pub quantity: i64,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/purchase/{shop_id}", post(purchase))
}

async fn purchase(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(shop_id): Path<i64>,
    Json(form): Json<PurchaseForm>,
) -> AppResult<Json<PurchaseReceipt>> {
    let receipt =
        blocking(move || state.purchases.purchase(user.id, shop_id, form.quantity)).await?;
    Ok(Json(receipt))
}
