//! Failure events emitted by the admission gate and consumed by recovery ingestion.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const SERVICE_NAME: &str = "point-service";
pub const DATA_VERSION: &str = "1.0";

pub const SUBJECT_CIRCUIT_OPENED: &str = "point-service-circuit-opened";
pub const SUBJECT_RETRY_EXHAUSTED: &str = "point-service-retry-exhausted";
pub const SUBJECT_PROCESSING_FAILED: &str = "point-processing-failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureEventType {
    SubscriptionValidation,
    CircuitBreakerOpened,
    RetryExhausted,
    ProcessingFailed,
}

impl FailureEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureEventType::SubscriptionValidation => "SubscriptionValidation",
            FailureEventType::CircuitBreakerOpened => "CircuitBreakerOpened",
            FailureEventType::RetryExhausted => "RetryExhausted",
            FailureEventType::ProcessingFailed => "ProcessingFailed",
        }
    }
}

impl fmt::Display for FailureEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SubscriptionValidation" | "Microsoft.EventGrid.SubscriptionValidationEvent" => {
                Ok(FailureEventType::SubscriptionValidation)
            }
            "CircuitBreakerOpened" => Ok(FailureEventType::CircuitBreakerOpened),
            "RetryExhausted" => Ok(FailureEventType::RetryExhausted),
            "ProcessingFailed" => Ok(FailureEventType::ProcessingFailed),
            other => Err(format!("unknown event type: {}", other)),
        }
    }
}

/// The request being handled when a failure event was produced.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub original_request: Option<Value>,
}

/// Diagnostic payload of a failure event. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FailureData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breaker_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_request: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_version: Option<String>,
    #[serde(default)]
    pub data: FailureData,
}

impl FailureEvent {
    fn emitted(event_type: FailureEventType, subject: &str, data: FailureData) -> Self {
        Self {
            id: Some(Uuid::new_v4().to_string()),
            subject: Some(subject.to_string()),
            event_type: event_type.as_str().to_string(),
            event_time: Some(Utc::now()),
            data_version: Some(DATA_VERSION.to_string()),
            data,
        }
    }

    fn base_data(ctx: &RequestContext, error: String) -> FailureData {
        FailureData {
            service: Some(SERVICE_NAME.to_string()),
            timestamp: Some(Utc::now()),
            path: Some(ctx.path.clone()),
            method: Some(ctx.method.clone()),
            error: Some(error),
            original_request: ctx.original_request.clone(),
            ..FailureData::default()
        }
    }

    pub fn circuit_opened(ctx: &RequestContext, breaker_state: &str, error: impl Into<String>) -> Self {
        let data = FailureData {
            circuit_breaker_state: Some(breaker_state.to_string()),
            ..Self::base_data(ctx, error.into())
        };
        Self::emitted(FailureEventType::CircuitBreakerOpened, SUBJECT_CIRCUIT_OPENED, data)
    }

    pub fn retry_exhausted(ctx: &RequestContext, attempts: u32, error: impl Into<String>) -> Self {
        let data = FailureData {
            attempts: Some(attempts),
            ..Self::base_data(ctx, error.into())
        };
        Self::emitted(FailureEventType::RetryExhausted, SUBJECT_RETRY_EXHAUSTED, data)
    }

    pub fn processing_failed(
        ctx: &RequestContext,
        breaker_state: &str,
        failure_rate: Option<f64>,
        error: impl Into<String>,
    ) -> Self {
        let data = FailureData {
            circuit_breaker_state: Some(breaker_state.to_string()),
            failure_rate,
            ..Self::base_data(ctx, error.into())
        };
        Self::emitted(FailureEventType::ProcessingFailed, SUBJECT_PROCESSING_FAILED, data)
    }

    pub fn kind(&self) -> Option<FailureEventType> {
        self.event_type.parse().ok()
    }

    /// Source identifier, ignoring blank ids.
    pub fn source_id(&self) -> Option<&str> {
        self.id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_retry_exhausted_envelope_shape() {
        let ctx = RequestContext {
            method: "POST".into(),
            path: "/points/accumulate".into(),
            original_request: Some(json!({"memberId": "M1"})),
        };
        let event = FailureEvent::retry_exhausted(&ctx, 3, "database unavailable");
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["eventType"], "RetryExhausted");
        assert_eq!(value["subject"], SUBJECT_RETRY_EXHAUSTED);
        assert_eq!(value["dataVersion"], "1.0");
        assert_eq!(value["data"]["attempts"], 3);
        assert_eq!(value["data"]["originalRequest"]["memberId"], "M1");
        assert!(value["data"].get("validationCode").is_none());
    }

    #[test]
    fn test_minimal_inbound_event_parses() {
        let event: FailureEvent = serde_json::from_value(json!({
            "eventType": "Microsoft.EventGrid.SubscriptionValidationEvent",
            "data": {"validationCode": "abc"}
        }))
        .unwrap();
        assert_eq!(event.kind(), Some(FailureEventType::SubscriptionValidation));
        assert_eq!(event.data.validation_code.as_deref(), Some("abc"));
        assert_eq!(event.source_id(), None);
    }

    #[test]
    fn test_unknown_event_type_has_no_kind() {
        let event: FailureEvent = serde_json::from_value(json!({"id": " ", "eventType": "Other"})).unwrap();
        assert_eq!(event.kind(), None);
        assert_eq!(event.source_id(), None);
    }
}
