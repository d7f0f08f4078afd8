pub mod cards;
pub mod exchange;
pub mod points;
pub mod purchase;
pub mod shop;
pub mod users;

use axum::Router;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// The full HTTP surface with state attached.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(users::router())
        .merge(cards::router())
        .merge(shop::router())
        .merge(purchase::router())
        .merge(exchange::router())
        .merge(points::router())
        .with_state(state)
}

/// Run storage work off the async executor. SQLite calls block.
pub async fn blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("blocking task failed: {}", e)))?
}
