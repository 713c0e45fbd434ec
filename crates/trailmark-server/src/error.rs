//! Application error types and Axum response conversion.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use trailmark_monitor::codec::{DecodeError, EncodeError};
use trailmark_monitor::{AggregationError, RollupError, StoreError};

/// Application-level errors with HTTP status code mapping.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl AppError {
    /// Creates an Internal error from any error type.
    pub fn internal(e: impl std::fmt::Display) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => AppError::NotFound(e.to_string()),
            StoreError::InvalidTrace(_) | StoreError::InvalidLog(_) => {
                AppError::BadRequest(e.to_string())
            }
            StoreError::Duplicate(_) => AppError::Conflict(e.to_string()),
            StoreError::Database(_) | StoreError::Lock | StoreError::Serialization(_) => {
                tracing::error!("Store failure: {}", e);
                AppError::Internal("storage failure".into())
            }
        }
    }
}

impl From<DecodeError> for AppError {
    fn from(e: DecodeError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl From<EncodeError> for AppError {
    fn from(e: EncodeError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<AggregationError> for AppError {
    fn from(e: AggregationError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl From<RollupError> for AppError {
    fn from(e: RollupError) -> Self {
        match e {
            RollupError::Cancelled { .. } => AppError::Unavailable(e.to_string()),
            RollupError::InvalidScope(_) => AppError::BadRequest(e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m),
            AppError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
            AppError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
