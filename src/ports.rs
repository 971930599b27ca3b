//! Storage ports. Services depend on these traits; Postgres and in-memory
//! adapters implement them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{HistoryStatus, NewPointTransaction, PointHistory, PointTransaction};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("conflicting record: {0}")]
    Conflict(String),
    #[error("query failed: {0}")]
    Query(String),
}

impl StoreError {
    /// Connectivity failures are worth retrying; everything else is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            other => StoreError::Query(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait PointTransactionStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when a transaction for the same
    /// recovery ledger entry already exists.
    async fn insert(&self, tx: &NewPointTransaction) -> StoreResult<PointTransaction>;

    /// The transaction that credited recovery ledger entry `history_id`, if any.
    async fn find_by_history(&self, history_id: Uuid) -> StoreResult<Option<PointTransaction>>;

    /// Transactions of `member_id` with `start <= transaction_time <= end`,
    /// newest first.
    async fn find_by_member_between(
        &self,
        member_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<PointTransaction>>;

    async fn ping(&self) -> StoreResult<()>;
}

#[async_trait]
pub trait PointHistoryStore: Send + Sync {
    /// Inserts a new entry. Fails with [`StoreError::Conflict`] when an entry
    /// with the same source event id already exists.
    async fn insert(&self, entry: &PointHistory) -> StoreResult<PointHistory>;

    async fn get(&self, id: Uuid) -> StoreResult<PointHistory>;

    async fn find_by_source_event(&self, event_id: &str) -> StoreResult<Option<PointHistory>>;

    /// Entries a sweep may replay: `FAILED` below the ceiling, and `PENDING`
    /// below the ceiling that were created at or before `pending_before`.
    async fn find_retryable(
        &self,
        ceiling: i32,
        pending_before: DateTime<Utc>,
    ) -> StoreResult<Vec<PointHistory>>;

    /// Writes `updated` only if the stored entry still has `expected_retry_count`
    /// and a non-terminal status. Returns whether the write happened.
    async fn update_if_retryable(
        &self,
        updated: &PointHistory,
        expected_retry_count: i32,
    ) -> StoreResult<bool>;

    async fn list(&self, status: Option<HistoryStatus>, limit: i64) -> StoreResult<Vec<PointHistory>>;

    async fn ping(&self) -> StoreResult<()>;
}
