use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::db::models::User;
use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::routes::blocking;
use crate::state::AppState;
use crate::users::{self, NewUser, UserProfile};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", post(register))
        .route("/users/me", get(me))
}

async fn register(
    State(state): State<AppState>,
    Json(new_user): Json<NewUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = blocking(move || users::register(&state.db, new_user)).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<UserProfile>> {
    let profile = blocking(move || users::profile(&state.db, user.id)).await?;
    Ok(Json(profile))
}
