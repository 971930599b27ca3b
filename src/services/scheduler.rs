//! Periodic sweep over the recovery ledger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::domain::HistoryStatus;
use crate::ports::{PointHistoryStore, StoreResult};

use super::replay::Replayer;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub selected: usize,
    pub completed: usize,
    pub failed: usize,
    pub max_retry_exceeded: usize,
    /// Entries whose outcome could not be written.
    pub errors: usize,
}

pub struct RetryScheduler {
    ledger: Arc<dyn PointHistoryStore>,
    replayer: Arc<Replayer>,
    interval: Duration,
    pending_grace: Duration,
    sweeping: AtomicBool,
}

struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RetryScheduler {
    pub fn new(
        ledger: Arc<dyn PointHistoryStore>,
        replayer: Arc<Replayer>,
        interval: Duration,
        pending_grace: Duration,
    ) -> Self {
        Self {
            ledger,
            replayer,
            interval,
            pending_grace,
            sweeping: AtomicBool::new(false),
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeping.load(Ordering::Acquire)
    }

    /// Runs a sweep every `interval`, measured from the end of the previous one.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(interval_ms = self.interval.as_millis() as u64, "retry scheduler started");
            loop {
                tokio::time::sleep(self.interval).await;
                match self.sweep().await {
                    Ok(Some(report)) if report.selected > 0 => {
                        tracing::info!(?report, "retry sweep finished");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("retry sweep failed: {}", e),
                }
            }
        })
    }

    /// Replays every eligible entry once, concurrently. Returns `Ok(None)`
    /// without doing anything if another sweep is still running.
    pub async fn sweep(&self) -> StoreResult<Option<SweepReport>> {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("retry sweep already running, skipping");
            return Ok(None);
        }
        let _guard = SweepGuard(&self.sweeping);

        let grace = chrono::Duration::from_std(self.pending_grace).unwrap_or_else(|_| chrono::Duration::zero());
        let entries = self
            .ledger
            .find_retryable(self.replayer.ceiling(), Utc::now() - grace)
            .await?;

        let mut report = SweepReport {
            selected: entries.len(),
            ..SweepReport::default()
        };
        if entries.is_empty() {
            return Ok(Some(report));
        }

        let outcomes = futures::future::join_all(entries.iter().map(|entry| self.replayer.replay(entry))).await;
        for outcome in outcomes {
            match outcome {
                Ok(entry) => match entry.status {
                    HistoryStatus::Completed => report.completed += 1,
                    HistoryStatus::Failed => report.failed += 1,
                    HistoryStatus::MaxRetryExceeded => report.max_retry_exceeded += 1,
                    HistoryStatus::Pending => {}
                },
                Err(e) => {
                    tracing::error!("failed to record replay outcome: {}", e);
                    report.errors += 1;
                }
            }
        }

        Ok(Some(report))
    }
}
