use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::domain::{FailureEvent, HistoryStatus};
use crate::error::AppError;
use crate::events::{EVENT_TYPE_HEADER, SAS_KEY_HEADER};
use crate::handlers::ApiResponse;
use crate::services::{IngestError, IngestOutcome};
use crate::AppState;

const HANDSHAKE_HEADER_VALUE: &str = "SubscriptionValidation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventReceipt {
    pub event_id: Option<String>,
    pub outcome: String,
    pub history_id: Option<Uuid>,
    pub history_status: Option<HistoryStatus>,
    pub retry_count: Option<i32>,
}

impl EventReceipt {
    fn new(event: &FailureEvent, outcome: &IngestOutcome) -> Self {
        let label = match outcome {
            IngestOutcome::Handshake { .. } => "HANDSHAKE",
            IngestOutcome::Recorded(_) => "RECORDED",
            IngestOutcome::Redelivered(_) => "REDELIVERED",
            IngestOutcome::Duplicate(_) => "DUPLICATE",
            IngestOutcome::Ignored { .. } => "IGNORED",
        };
        let entry = outcome.entry();
        Self {
            event_id: event.source_id().map(str::to_string),
            outcome: label.to_string(),
            history_id: entry.map(|e| e.id),
            history_status: entry.map(|e| e.status),
            retry_count: entry.map(|e| e.retry_count),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::MissingValidationCode => AppError::Validation(err.to_string()),
            IngestError::Ledger(e) => AppError::Database(e.to_string()),
        }
    }
}

fn handshake(code: String) -> Response {
    Json(json!({ "validationResponse": code })).into_response()
}

/// Receives failure events pushed by the event broker.
pub async fn receive_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Vec<FailureEvent>>, JsonRejection>,
) -> Result<Response, AppError> {
    if let Some(expected) = &state.webhook_key {
        let provided = headers.get(SAS_KEY_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            tracing::warn!("rejecting event delivery with missing or wrong key");
            return Err(AppError::Unauthorized);
        }
    }

    let Json(events) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let declared = headers.get(EVENT_TYPE_HEADER).and_then(|v| v.to_str().ok());

    if declared == Some(HANDSHAKE_HEADER_VALUE) {
        let code = events
            .first()
            .and_then(|e| e.data.validation_code.clone())
            .ok_or(IngestError::MissingValidationCode)?;
        tracing::info!("answering subscription validation");
        return Ok(handshake(code));
    }

    let mut receipts = Vec::with_capacity(events.len());
    for event in &events {
        let outcome = state.ingestion.ingest(event).await?;
        if let IngestOutcome::Handshake { validation_code } = &outcome {
            // A handshake only answers for the whole delivery when it leads it.
            if receipts.is_empty() {
                if events.len() > 1 {
                    tracing::warn!(skipped = events.len() - 1, "ignoring events batched after a handshake");
                }
                return Ok(handshake(validation_code.clone()));
            }
            tracing::warn!("handshake inside an event batch, not answering it");
        }
        receipts.push(EventReceipt::new(event, &outcome));
    }

    Ok(Json(ApiResponse::success(
        format!("Processed {} events", receipts.len()),
        receipts,
    ))
    .into_response())
}
