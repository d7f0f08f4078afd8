use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::state::AppState;

/// Header the upstream auth layer sets to the authenticated user's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Represents the currently authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
}

/// Extractor that requires authentication.
/// Returns 401 if the identity header is missing or not a positive id.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        user_id_from_parts(parts)
            .map(|id| CurrentUser { id })
            .ok_or(AppError::Unauthorized)
    }
}

fn user_id_from_parts(parts: &Parts) -> Option<i64> {
    parts
        .headers
        .get(USER_ID_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
}
