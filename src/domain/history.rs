//! Recovery ledger entries.
//!
//! A [`PointHistory`] row records one accumulation that failed upstream and is
//! being recovered. Status only moves forward:
//!
//! ```text
//! PENDING --success--> COMPLETED
//! PENDING --failure--> FAILED | MAX_RETRY_EXCEEDED
//! FAILED  --success--> COMPLETED
//! FAILED  --failure--> FAILED | MAX_RETRY_EXCEEDED
//! ```
//!
//! `COMPLETED` and `MAX_RETRY_EXCEEDED` are terminal.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::point::PointRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryStatus {
    Pending,
    Completed,
    Failed,
    MaxRetryExceeded,
}

impl HistoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryStatus::Pending => "PENDING",
            HistoryStatus::Completed => "COMPLETED",
            HistoryStatus::Failed => "FAILED",
            HistoryStatus::MaxRetryExceeded => "MAX_RETRY_EXCEEDED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, HistoryStatus::Completed | HistoryStatus::MaxRetryExceeded)
    }
}

impl fmt::Display for HistoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(HistoryStatus::Pending),
            "COMPLETED" => Ok(HistoryStatus::Completed),
            "FAILED" => Ok(HistoryStatus::Failed),
            "MAX_RETRY_EXCEEDED" => Ok(HistoryStatus::MaxRetryExceeded),
            other => Err(format!("unknown history status: {}", other)),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("history entry {id} is already {status}")]
    Terminal { id: Uuid, status: HistoryStatus },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointHistory {
    pub id: Uuid,
    /// Identifier of the failure event that created this entry, used to
    /// recognise redeliveries.
    pub source_event_id: Option<String>,
    pub member_id: String,
    pub partner_id: String,
    pub partner_type: String,
    pub amount: BigDecimal,
    pub points: Option<BigDecimal>,
    pub transaction_time: DateTime<Utc>,
    pub status: HistoryStatus,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub last_retry_time: Option<DateTime<Utc>>,
}

impl PointHistory {
    pub fn pending(request: &PointRequest, source_event_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_event_id,
            member_id: request.member_id.clone(),
            partner_id: request.partner_id.clone(),
            partner_type: request.partner_type.clone(),
            amount: request.amount.clone(),
            points: None,
            transaction_time: Utc::now(),
            status: HistoryStatus::Pending,
            retry_count: 0,
            error_message: None,
            last_retry_time: None,
        }
    }

    pub fn to_request(&self) -> PointRequest {
        PointRequest {
            member_id: self.member_id.clone(),
            partner_id: self.partner_id.clone(),
            partner_type: self.partner_type.clone(),
            amount: self.amount.clone(),
        }
    }

    /// Whether the scheduler may pick this entry up again.
    pub fn is_retryable(&self, ceiling: i32) -> bool {
        !self.status.is_terminal() && self.retry_count < ceiling
    }

    /// State after a replay that credited `points`.
    pub fn completed(&self, points: BigDecimal, at: DateTime<Utc>) -> Result<Self, TransitionError> {
        self.ensure_open()?;
        Ok(Self {
            status: HistoryStatus::Completed,
            points: Some(points),
            error_message: None,
            last_retry_time: Some(at),
            ..self.clone()
        })
    }

    /// State after a failed replay. The entry becomes `MAX_RETRY_EXCEEDED` once
    /// the incremented count reaches `ceiling`.
    pub fn failed(
        &self,
        error: impl Into<String>,
        ceiling: i32,
        at: DateTime<Utc>,
    ) -> Result<Self, TransitionError> {
        self.ensure_open()?;
        let retry_count = self.retry_count + 1;
        let status = if retry_count >= ceiling {
            HistoryStatus::MaxRetryExceeded
        } else {
            HistoryStatus::Failed
        };
        Ok(Self {
            status,
            retry_count,
            error_message: Some(error.into()),
            last_retry_time: Some(at),
            ..self.clone()
        })
    }

    fn ensure_open(&self) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::Terminal {
                id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> PointHistory {
        PointHistory::pending(
            &PointRequest {
                member_id: "M3".into(),
                partner_id: "P3".into(),
                partner_type: "ONLINE".into(),
                amount: BigDecimal::from(10000),
            },
            Some("evt-1".into()),
        )
    }

    #[test]
    fn test_failures_climb_to_ceiling() {
        let now = Utc::now();
        let first = entry().failed("boom", 3, now).unwrap();
        assert_eq!(first.status, HistoryStatus::Failed);
        assert_eq!(first.retry_count, 1);

        let second = first.failed("boom", 3, now).unwrap();
        assert_eq!(second.status, HistoryStatus::Failed);
        assert_eq!(second.retry_count, 2);

        let third = second.failed("boom", 3, now).unwrap();
        assert_eq!(third.status, HistoryStatus::MaxRetryExceeded);
        assert_eq!(third.retry_count, 3);
        assert!(!third.is_retryable(3));
    }

    #[test]
    fn test_terminal_entries_do_not_move() {
        let now = Utc::now();
        let done = entry().completed(BigDecimal::from(200), now).unwrap();
        assert_eq!(done.status, HistoryStatus::Completed);
        assert_eq!(done.retry_count, 0);
        assert!(matches!(
            done.failed("late", 3, now),
            Err(TransitionError::Terminal { status: HistoryStatus::Completed, .. })
        ));
        assert!(done.completed(BigDecimal::from(1), now).is_err());
    }

    #[test]
    fn test_completion_after_failure_keeps_count() {
        let now = Utc::now();
        let failed = entry().failed("down", 3, now).unwrap();
        let done = failed.completed(BigDecimal::from(200), now).unwrap();
        assert_eq!(done.retry_count, 1);
        assert_eq!(done.error_message, None);
        assert_eq!(done.points, Some(BigDecimal::from(200)));
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            HistoryStatus::Pending,
            HistoryStatus::Completed,
            HistoryStatus::Failed,
            HistoryStatus::MaxRetryExceeded,
        ] {
            assert_eq!(status.as_str().parse::<HistoryStatus>(), Ok(status));
        }
    }
}
