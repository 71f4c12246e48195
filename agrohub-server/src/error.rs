//! HTTP rendering of [`MarketError`].
//!
//! Every failure becomes a JSON body `{ "error": <kind>, "message": <text> }`.
//! Storage failures get a generic message; the details go to the log.

use agrohub::errors::MarketError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug)]
pub struct ApiError(MarketError);

impl ApiError {
    pub const fn status(&self) -> StatusCode {
        match &self.0 {
            MarketError::InvalidInput(_) | MarketError::InvalidStatus(_) => StatusCode::BAD_REQUEST,
            MarketError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            MarketError::Forbidden(_) => StatusCode::FORBIDDEN,
            MarketError::NotFound(_) => StatusCode::NOT_FOUND,
            MarketError::InsufficientStock { .. }
            | MarketError::Conflict(_)
            | MarketError::ConflictRetry => StatusCode::CONFLICT,
            MarketError::DeliveryFailed => StatusCode::BAD_GATEWAY,
            MarketError::StorageFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match &self.0 {
            MarketError::InvalidInput(_) => "invalid_input",
            MarketError::InvalidStatus(_) => "invalid_status",
            MarketError::Unauthorized(_) => "unauthorized",
            MarketError::Forbidden(_) => "forbidden",
            MarketError::NotFound(_) => "not_found",
            MarketError::InsufficientStock { .. } => "insufficient_stock",
            MarketError::Conflict(_) => "conflict",
            MarketError::ConflictRetry => "conflict_retry",
            MarketError::DeliveryFailed => "delivery_failed",
            MarketError::StorageFailure(_) => "storage_failure",
        }
    }
}

impl From<MarketError> for ApiError {
    fn from(error: MarketError) -> Self {
        Self(error)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.0 {
            MarketError::StorageFailure(operation) => {
                error!(operation = %operation, "[http.error] storage failure");
                "internal storage error".to_string()
            }
            MarketError::ConflictRetry => {
                warn!("[http.error] conflict outlived retries");
                self.0.to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: self.kind(),
            message,
            retryable: matches!(self.0, MarketError::ConflictRetry),
        };
        (status, Json(body)).into_response()
    }
}
