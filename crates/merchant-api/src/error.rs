//! Error types for the game API.
//!
//! [`ApiError`] unifies all failure modes into a single enum that can be
//! converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation. Every
//! error body has the shape `{"error": ..., "code": ..., "status": ...}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use merchant_core::GameError;
use merchant_db::DbError;

/// Errors that can occur in the API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A game rule rejected the request.
    #[error(transparent)]
    Game(#[from] GameError),

    /// The database rejected or failed the request.
    #[error(transparent)]
    Db(#[from] DbError),

    /// A UUID could not be parsed from the request path.
    #[error("invalid UUID: {0}")]
    InvalidUuid(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Game(err) => match err {
                GameError::NotFound { .. } => StatusCode::NOT_FOUND,
                GameError::MarketClosed { .. }
                | GameError::InsufficientFunds { .. }
                | GameError::InsufficientItems { .. }
                | GameError::InvalidAmount { .. }
                | GameError::SelfTransfer(_)
                | GameError::FutureRound { .. }
                | GameError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
                GameError::DuplicateLoan { .. }
                | GameError::AlreadyRepaid(_)
                | GameError::GameEnded => StatusCode::CONFLICT,
                GameError::Overflow(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Db(DbError::Conflict(_)) => StatusCode::CONFLICT,
            Self::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidUuid(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Stable machine-readable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Game(err) => err.code(),
            Self::Db(DbError::Conflict(_)) => "conflict",
            Self::Db(_) => "storage",
            Self::InvalidUuid(_) => "invalid_uuid",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
