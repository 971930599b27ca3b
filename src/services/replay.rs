//! Replays a recovery ledger entry through its own breaker and retry policy
//! and records the outcome.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::PointHistory;
use crate::ports::{PointHistoryStore, StoreResult};
use crate::resilience::{guarded_call, CircuitBreaker, RetryPolicy};

use super::accumulation::AccumulationService;

pub struct Replayer {
    accumulation: Arc<AccumulationService>,
    ledger: Arc<dyn PointHistoryStore>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    ceiling: i32,
}

impl Replayer {
    pub fn new(
        accumulation: Arc<AccumulationService>,
        ledger: Arc<dyn PointHistoryStore>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        ceiling: i32,
    ) -> Self {
        Self {
            accumulation,
            ledger,
            breaker,
            retry,
            ceiling,
        }
    }

    pub fn ceiling(&self) -> i32 {
        self.ceiling
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Makes one replay attempt for `entry` and writes the resulting state.
    ///
    /// Terminal entries are returned unchanged. If another writer advanced the
    /// entry first, the stored version is returned instead. Points for an entry
    /// are credited at most once however many replays race on it.
    pub async fn replay(&self, entry: &PointHistory) -> StoreResult<PointHistory> {
        if !entry.is_retryable(self.ceiling) {
            return Ok(entry.clone());
        }

        let request = entry.to_request();
        let outcome = guarded_call(&self.breaker, &self.retry, || {
            self.accumulation.accumulate_for_history(&request, entry.id)
        })
        .await;

        let now = Utc::now();
        let next = match &outcome {
            Ok(result) => entry.completed(result.points.clone(), now),
            Err(err) => entry.failed(err.describe(), self.ceiling, now),
        };
        let next = match next {
            Ok(next) => next,
            Err(e) => {
                tracing::warn!(error = %e, "skipping replay of closed entry");
                return Ok(entry.clone());
            }
        };

        if self.ledger.update_if_retryable(&next, entry.retry_count).await? {
            match &outcome {
                Ok(result) => tracing::info!(
                    history_id = %entry.id,
                    transaction_id = result.transaction_id,
                    "recovered point accumulation"
                ),
                Err(_) => tracing::warn!(
                    history_id = %entry.id,
                    status = %next.status,
                    retry_count = next.retry_count,
                    error = next.error_message.as_deref().unwrap_or_default(),
                    "point accumulation replay failed"
                ),
            }
            Ok(next)
        } else {
            tracing::debug!(history_id = %entry.id, "entry changed concurrently, keeping stored state");
            self.ledger.get(entry.id).await
        }
    }
}
