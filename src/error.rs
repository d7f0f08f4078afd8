use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Insufficient funds: user {user_id} needs {required} points but has {available}")]
    InsufficientFunds {
        user_id: i64,
        required: i64,
        available: i64,
    },

    #[error("Insufficient inventory: requested {requested} but only {available} available")]
    InsufficientInventory { requested: i64, available: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable error code.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            AppError::InsufficientInventory { .. } => "INSUFFICIENT_INVENTORY",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Database(_) | AppError::Pool(_) | AppError::Internal(_) => "INTERNAL",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_)
            | AppError::InsufficientFunds { .. }
            | AppError::InsufficientInventory { .. } => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Pool(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "Internal server error".to_string()
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                "Internal server error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = serde_json::json!({
            "error": {
                "code": self.kind(),
                "message": message,
            }
        });

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn response_status(err: AppError) -> StatusCode {
        let response = err.into_response();
        response.status()
    }

    #[test]
    fn not_found_returns_404() {
        assert_eq!(
            response_status(AppError::NotFound("listing 1".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn unauthorized_returns_401() {
        assert_eq!(
            response_status(AppError::Unauthorized),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn forbidden_returns_403() {
        assert_eq!(
            response_status(AppError::Forbidden("not yours".into())),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn ledger_and_inventory_shortfalls_return_400() {
        assert_eq!(
            response_status(AppError::InsufficientFunds {
                user_id: 1,
                required: 200,
                available: 150,
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            response_status(AppError::InsufficientInventory {
                requested: 2,
                available: 1,
            }),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn conflict_returns_409() {
        assert_eq!(
            response_status(AppError::Conflict("nickname taken".into())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn internal_returns_500() {
        assert_eq!(
            response_status(AppError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn kinds_are_stable() {
        assert_eq!(AppError::BadRequest("x".into()).kind(), "BAD_REQUEST");
        assert_eq!(
            AppError::InsufficientFunds {
                user_id: 1,
                required: 1,
                available: 0
            }
            .kind(),
            "INSUFFICIENT_FUNDS"
        );
        assert_eq!(
            AppError::Database(rusqlite::Error::QueryReturnedNoRows).kind(),
            "INTERNAL"
        );
    }
}
