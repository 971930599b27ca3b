use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gate::GateError;
use crate::ports::StoreError;
use crate::resilience::CircuitState;
use crate::services::AccumulateError;
use crate::validation::ValidationError;

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid amount: Amount must be greater than zero")]
    InvalidAmount,

    #[error("Invalid partner type: {0}")]
    InvalidPartnerType(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Too many concurrent requests")]
    BulkheadFull,

    #[error("Service temporarily unavailable")]
    CircuitOpen(CircuitState),

    #[error("Service temporarily unavailable after retries")]
    RetryExhausted,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Unauthorized")]
    Unauthorized,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidAmount | AppError::InvalidPartnerType(_) | AppError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::BulkheadFull | AppError::CircuitOpen(_) | AppError::RetryExhausted => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidAmount => "INVALID_AMOUNT",
            AppError::InvalidPartnerType(_) => "INVALID_PARTNER_TYPE",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            AppError::BulkheadFull => "BULKHEAD_FULL",
            AppError::CircuitOpen(_) => "CIRCUIT_OPEN",
            AppError::RetryExhausted => "RETRY_EXHAUSTED",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Unauthorized => "UNAUTHORIZED",
        }
    }

    /// Message shown to callers. Server-side failures get a fixed text.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(_) => "A database error occurred".to_string(),
            AppError::Internal(_) => "An unexpected error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "request failed: {}", self);
        }

        let body = Json(ErrorBody {
            code: self.code().to_string(),
            message: self.public_message(),
        });
        let mut response = (status, body).into_response();

        let headers = response.headers_mut();
        match &self {
            AppError::CircuitOpen(state) => {
                headers.insert("x-circuit-open", HeaderValue::from_static("true"));
                headers.insert("x-circuit-state", HeaderValue::from_static(state.as_str()));
            }
            AppError::RetryExhausted => {
                headers.insert("x-retry-exhausted", HeaderValue::from_static("true"));
            }
            _ => {}
        }
        response
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(what),
            other => AppError::Database(other.to_string()),
        }
    }
}

impl From<AccumulateError> for AppError {
    fn from(err: AccumulateError) -> Self {
        match err {
            AccumulateError::InvalidAmount => AppError::InvalidAmount,
            AccumulateError::InvalidPartnerType(t) => AppError::InvalidPartnerType(t),
            AccumulateError::Validation(e) => e.into(),
            AccumulateError::Store(e) => AppError::Database(e.to_string()),
        }
    }
}

impl From<GateError<AccumulateError>> for AppError {
    fn from(err: GateError<AccumulateError>) -> Self {
        match err {
            GateError::RateLimited { .. } => AppError::RateLimitExceeded,
            GateError::BulkheadFull { .. } => AppError::BulkheadFull,
            GateError::CircuitOpen { state } => AppError::CircuitOpen(state),
            GateError::RetryExhausted { .. } => AppError::RetryExhausted,
            GateError::Downstream(e) => e.into(),
        }
    }
}
