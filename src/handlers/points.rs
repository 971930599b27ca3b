use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::domain::event::RequestContext;
use crate::domain::{AccumulationResult, PointRequest, PointTransaction};
use crate::error::AppError;
use crate::gate::PARTNER_HEADER;
use crate::handlers::ApiResponse;
use crate::validation::parse_date_window;
use crate::AppState;

pub async fn accumulate(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<PointRequest>, JsonRejection>,
) -> Result<Json<AccumulationResult>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let partner = headers.get(PARTNER_HEADER).and_then(|v| v.to_str().ok());

    let ctx = RequestContext {
        method: "POST".to_string(),
        path: request.to_diagnostic_path(),
        original_request: serde_json::to_value(&request).ok(),
    };

    let result = state
        .gate
        .execute(partner, ctx, || state.accumulation.accumulate(&request))
        .await?;

    Ok(Json(result))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

pub async fn transactions(
    State(state): State<AppState>,
    Path(member_id): Path<String>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<ApiResponse<Vec<PointTransaction>>>, AppError> {
    let window = parse_date_window(query.start_date.as_deref(), query.end_date.as_deref(), Utc::now())?;
    let found = state.accumulation.transactions(&member_id, window).await?;

    Ok(Json(ApiResponse::success(
        format!("Found {} transactions", found.len()),
        found,
    )))
}
