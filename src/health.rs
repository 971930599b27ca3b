use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::ports::{PointHistoryStore, PointTransactionStore};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: BTreeMap<String, DependencyStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy { status: String, latency_ms: u64 },
    Unhealthy { status: String, error: String },
}

impl DependencyStatus {
    fn healthy(start: Instant) -> Self {
        DependencyStatus::Healthy {
            status: "healthy".to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn unhealthy(error: impl Into<String>) -> Self {
        DependencyStatus::Unhealthy {
            status: "unhealthy".to_string(),
            error: error.into(),
        }
    }
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether a failure makes the whole service unhealthy rather than degraded.
    fn critical(&self) -> bool {
        true
    }

    async fn check(&self) -> DependencyStatus;
}

pub struct TransactionStoreChecker {
    store: Arc<dyn PointTransactionStore>,
}

impl TransactionStoreChecker {
    pub fn new(store: Arc<dyn PointTransactionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DependencyChecker for TransactionStoreChecker {
    fn name(&self) -> &'static str {
        "point_transactions"
    }

    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.store.ping().await {
            Ok(()) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e.to_string()),
        }
    }
}

pub struct LedgerChecker {
    ledger: Arc<dyn PointHistoryStore>,
}

impl LedgerChecker {
    pub fn new(ledger: Arc<dyn PointHistoryStore>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl DependencyChecker for LedgerChecker {
    fn name(&self) -> &'static str {
        "point_history"
    }

    // accumulation still works while the ledger is down
    fn critical(&self) -> bool {
        false
    }

    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.ledger.ping().await {
            Ok(()) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e.to_string()),
        }
    }
}

pub async fn check_health(checkers: &[Arc<dyn DependencyChecker>], start_time: Instant) -> HealthResponse {
    let timeout_duration = Duration::from_secs(5);

    let results = join_all(checkers.iter().map(|checker| async move {
        let status = timeout(timeout_duration, checker.check())
            .await
            .unwrap_or_else(|_| DependencyStatus::unhealthy("timeout"));
        (checker.name(), checker.critical(), status)
    }))
    .await;

    let overall_status = determine_overall_status(&results);
    let dependencies = results
        .into_iter()
        .map(|(name, _, status)| (name.to_string(), status))
        .collect();

    HealthResponse {
        status: overall_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: start_time.elapsed().as_secs(),
        dependencies,
    }
}

fn determine_overall_status(results: &[(&'static str, bool, DependencyStatus)]) -> String {
    let mut has_critical_failure = false;
    let mut has_non_critical_failure = false;

    for (_, critical, status) in results {
        if matches!(status, DependencyStatus::Unhealthy { .. }) {
            if *critical {
                has_critical_failure = true;
            } else {
                has_non_critical_failure = true;
            }
        }
    }

    if has_critical_failure {
        "unhealthy".to_string()
    } else if has_non_critical_failure {
        "degraded".to_string()
    } else {
        "healthy".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryHistoryStore, InMemoryTransactionStore};

    fn checkers(
        transactions: Arc<InMemoryTransactionStore>,
        ledger: Arc<InMemoryHistoryStore>,
    ) -> Vec<Arc<dyn DependencyChecker>> {
        vec![
            Arc::new(TransactionStoreChecker::new(transactions)),
            Arc::new(LedgerChecker::new(ledger)),
        ]
    }

    #[tokio::test]
    async fn test_all_healthy() {
        let report = check_health(
            &checkers(Arc::new(InMemoryTransactionStore::new()), Arc::new(InMemoryHistoryStore::new())),
            Instant::now(),
        )
        .await;
        assert_eq!(report.status, "healthy");
        assert_eq!(report.dependencies.len(), 2);
    }

    #[tokio::test]
    async fn test_ledger_outage_degrades() {
        let ledger = Arc::new(InMemoryHistoryStore::new());
        ledger.set_available(false);
        let report = check_health(&checkers(Arc::new(InMemoryTransactionStore::new()), ledger), Instant::now()).await;
        assert_eq!(report.status, "degraded");
    }

    #[tokio::test]
    async fn test_transaction_store_outage_is_unhealthy() {
        let transactions = Arc::new(InMemoryTransactionStore::new());
        transactions.set_available(false);
        let report =
            check_health(&checkers(transactions, Arc::new(InMemoryHistoryStore::new())), Instant::now()).await;
        assert_eq!(report.status, "unhealthy");
        assert!(matches!(
            report.dependencies["point_transactions"],
            DependencyStatus::Unhealthy { .. }
        ));
    }
}
