//! Turns failure events into recovery ledger entries.

use std::sync::Arc;
use std::time::Duration;

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;

use crate::domain::point::{UNKNOWN_ID, UNKNOWN_PARTNER_TYPE};
use crate::domain::{FailureData, FailureEvent, FailureEventType, HistoryStatus, PointHistory, PointRequest};
use crate::ports::{PointHistoryStore, StoreError};

use super::replay::Replayer;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("subscription validation event carries no validation code")]
    MissingValidationCode,
    #[error("recovery ledger error: {0}")]
    Ledger(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Subscription handshake; the code must be echoed to the sender.
    Handshake { validation_code: String },
    /// First delivery: a new entry was recorded and replayed once.
    Recorded(PointHistory),
    /// Redelivery of a retryable entry: replayed once more.
    Redelivered(PointHistory),
    /// Redelivery of an entry that is closed or still being handled.
    Duplicate(PointHistory),
    /// Event type this service does not handle.
    Ignored { event_type: String },
}

impl IngestOutcome {
    pub fn entry(&self) -> Option<&PointHistory> {
        match self {
            IngestOutcome::Recorded(e) | IngestOutcome::Redelivered(e) | IngestOutcome::Duplicate(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Default)]
struct PartialRequest {
    member_id: Option<String>,
    partner_id: Option<String>,
    partner_type: Option<String>,
    amount: Option<BigDecimal>,
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn decimal(raw: &str) -> Option<BigDecimal> {
    raw.trim().parse().ok()
}

impl PartialRequest {
    fn from_value(value: &Value) -> Self {
        let field = |name: &str| value.get(name).and_then(text);
        Self {
            member_id: field("memberId"),
            partner_id: field("partnerId"),
            partner_type: field("partnerType"),
            amount: field("amount").as_deref().and_then(decimal),
        }
    }

    fn is_complete(&self) -> bool {
        self.member_id.is_some()
            && self.partner_id.is_some()
            && self.partner_type.is_some()
            && self.amount.is_some()
    }

    /// Fills missing fields from `key=value` path segments.
    fn fill_from_path(&mut self, path: &str) {
        for segment in path.split('/') {
            for (key, value) in url::form_urlencoded::parse(segment.as_bytes()) {
                if value.trim().is_empty() {
                    continue;
                }
                match key.as_ref() {
                    "memberId" if self.member_id.is_none() => self.member_id = Some(value.into_owned()),
                    "partnerId" if self.partner_id.is_none() => self.partner_id = Some(value.into_owned()),
                    "partnerType" if self.partner_type.is_none() => {
                        self.partner_type = Some(value.into_owned())
                    }
                    "amount" if self.amount.is_none() => self.amount = decimal(&value),
                    _ => {}
                }
            }
        }
    }

    fn finish(self) -> PointRequest {
        PointRequest {
            member_id: self.member_id.unwrap_or_else(|| UNKNOWN_ID.to_string()),
            partner_id: self.partner_id.unwrap_or_else(|| UNKNOWN_ID.to_string()),
            partner_type: self.partner_type.unwrap_or_else(|| UNKNOWN_PARTNER_TYPE.to_string()),
            amount: self.amount.unwrap_or_else(|| BigDecimal::from(0)),
        }
    }
}

/// Rebuilds the failed request from the event payload. The embedded original
/// request wins; fields it lacks come from the diagnostic path, and anything
/// still missing gets a placeholder.
pub fn reconstruct_request(data: &FailureData) -> PointRequest {
    let mut partial = data
        .original_request
        .as_ref()
        .map(PartialRequest::from_value)
        .unwrap_or_default();
    if !partial.is_complete() {
        if let Some(path) = &data.path {
            partial.fill_from_path(path);
        }
    }
    partial.finish()
}

pub struct RecoveryIngestion {
    ledger: Arc<dyn PointHistoryStore>,
    replayer: Arc<Replayer>,
    pending_grace: Duration,
}

impl RecoveryIngestion {
    pub fn new(ledger: Arc<dyn PointHistoryStore>, replayer: Arc<Replayer>, pending_grace: Duration) -> Self {
        Self {
            ledger,
            replayer,
            pending_grace,
        }
    }

    pub async fn ingest(&self, event: &FailureEvent) -> Result<IngestOutcome, IngestError> {
        let Some(kind) = event.kind() else {
            tracing::warn!(event_type = %event.event_type, "ignoring unknown event type");
            return Ok(IngestOutcome::Ignored {
                event_type: event.event_type.clone(),
            });
        };

        match kind {
            FailureEventType::SubscriptionValidation => {
                let validation_code = event
                    .data
                    .validation_code
                    .clone()
                    .ok_or(IngestError::MissingValidationCode)?;
                tracing::info!("answering subscription validation");
                return Ok(IngestOutcome::Handshake { validation_code });
            }
            FailureEventType::CircuitBreakerOpened => tracing::warn!(
                event_id = event.source_id(),
                circuit_state = event.data.circuit_breaker_state.as_deref(),
                path = event.data.path.as_deref(),
                "received circuit breaker opened event"
            ),
            FailureEventType::RetryExhausted => tracing::warn!(
                event_id = event.source_id(),
                attempts = event.data.attempts,
                error = event.data.error.as_deref(),
                "received retry exhausted event"
            ),
            FailureEventType::ProcessingFailed => tracing::error!(
                event_id = event.source_id(),
                failure_rate = event.data.failure_rate,
                error = event.data.error.as_deref(),
                "received processing failed event"
            ),
        }

        let source_id = event.source_id().map(str::to_string);
        if let Some(id) = &source_id {
            if let Some(existing) = self.ledger.find_by_source_event(id).await? {
                return self.redeliver(existing).await;
            }
        }

        let request = reconstruct_request(&event.data);
        let entry = match self.ledger.insert(&PointHistory::pending(&request, source_id.clone())).await {
            Ok(entry) => entry,
            Err(StoreError::Conflict(_)) => {
                // lost a race with a concurrent delivery of the same event
                let id = source_id.as_deref().unwrap_or_default();
                return match self.ledger.find_by_source_event(id).await? {
                    Some(existing) => Ok(IngestOutcome::Duplicate(existing)),
                    None => Err(StoreError::NotFound(id.to_string()).into()),
                };
            }
            Err(e) => return Err(e.into()),
        };
        tracing::info!(history_id = %entry.id, member_id = %entry.member_id, "recorded failed accumulation");

        let replayed = self.replayer.replay(&entry).await?;
        Ok(IngestOutcome::Recorded(replayed))
    }

    async fn redeliver(&self, existing: PointHistory) -> Result<IngestOutcome, IngestError> {
        if !existing.is_retryable(self.replayer.ceiling()) || self.in_flight(&existing) {
            tracing::info!(
                history_id = %existing.id,
                status = %existing.status,
                "duplicate delivery, not replaying"
            );
            return Ok(IngestOutcome::Duplicate(existing));
        }
        let replayed = self.replayer.replay(&existing).await?;
        Ok(IngestOutcome::Redelivered(replayed))
    }

    fn in_flight(&self, entry: &PointHistory) -> bool {
        if entry.status != HistoryStatus::Pending {
            return false;
        }
        let age = Utc::now().signed_duration_since(entry.transaction_time);
        age.to_std().map(|age| age < self.pending_grace).unwrap_or(true)
    }
}
