pub mod points;
pub mod recovery;
pub mod webhook;

use crate::health::check_health;
use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Envelope for successful non-accumulation responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: ResponseStatus,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
            data: Some(data),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub circuit_breaker: String,
    /// Times the gate's breaker has opened since startup.
    pub circuit_breaker_opened_count: u64,
    /// Calls the gate's breaker turned away since startup.
    pub circuit_breaker_rejected_count: u64,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let breaker = state.gate.breaker();
    Json(HealthStatus {
        status: "UP".to_string(),
        timestamp: Utc::now(),
        circuit_breaker: breaker.state().to_string(),
        circuit_breaker_opened_count: breaker.opened_count(),
        circuit_breaker_rejected_count: breaker.rejected_count(),
    })
}

pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let report = check_health(&state.checkers, state.start_time).await;

    // Return 503 if a critical dependency is down, 200 otherwise
    let status_code = if report.status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(report))
}
