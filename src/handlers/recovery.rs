use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::domain::{HistoryStatus, PointHistory};
use crate::error::AppError;
use crate::handlers::ApiResponse;
use crate::services::SweepReport;
use crate::AppState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Vec<PointHistory>>>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(|s| s.parse::<HistoryStatus>())
        .transpose()
        .map_err(AppError::Validation)?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let entries = state.ledger.list(status, limit).await?;
    Ok(Json(ApiResponse::success(
        format!("Found {} history entries", entries.len()),
        entries,
    )))
}

pub async fn trigger_sweep(State(state): State<AppState>) -> Result<Json<ApiResponse<SweepReport>>, AppError> {
    match state.scheduler.sweep().await? {
        Some(report) => Ok(Json(ApiResponse::success("Sweep completed", report))),
        None => Err(AppError::Conflict("a sweep is already running".to_string())),
    }
}
