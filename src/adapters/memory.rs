//! In-memory stores for tests and local runs without Postgres.
//!
//! Both stores can be switched unavailable, in which case every call fails
//! with [`StoreError::Unavailable`] the way a dropped database connection would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::domain::{HistoryStatus, NewPointTransaction, PointHistory, PointTransaction};
use crate::ports::{PointHistoryStore, PointTransactionStore, StoreError, StoreResult};

fn check(available: &AtomicBool) -> StoreResult<()> {
    if available.load(Ordering::SeqCst) {
        Ok(())
    } else {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

pub struct InMemoryTransactionStore {
    rows: Mutex<Vec<PointTransaction>>,
    credited: Mutex<HashMap<Uuid, i64>>,
    next_id: AtomicI64,
    available: AtomicBool,
    insert_attempts: AtomicU64,
}

impl Default for InMemoryTransactionStore {
    fn default() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            credited: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            available: AtomicBool::new(true),
            insert_attempts: AtomicU64::new(0),
        }
    }
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of insert calls, including failed ones.
    pub fn insert_attempts(&self) -> u64 {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    pub fn all(&self) -> Vec<PointTransaction> {
        self.rows.lock().clone()
    }
}

#[async_trait]
impl PointTransactionStore for InMemoryTransactionStore {
    async fn insert(&self, tx: &NewPointTransaction) -> StoreResult<PointTransaction> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        check(&self.available)?;
        let mut credited = self.credited.lock();
        if let Some(history_id) = tx.history_id {
            if credited.contains_key(&history_id) {
                return Err(StoreError::Conflict(format!("history entry {} already credited", history_id)));
            }
        }
        let saved = PointTransaction {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            member_id: tx.member_id.clone(),
            partner_id: tx.partner_id.clone(),
            partner_type: tx.partner_type,
            amount: tx.amount.clone(),
            points: tx.points.clone(),
            transaction_time: tx.transaction_time,
            status: tx.status,
        };
        if let Some(history_id) = tx.history_id {
            credited.insert(history_id, saved.id);
        }
        self.rows.lock().push(saved.clone());
        Ok(saved)
    }

    async fn find_by_history(&self, history_id: Uuid) -> StoreResult<Option<PointTransaction>> {
        check(&self.available)?;
        let Some(id) = self.credited.lock().get(&history_id).copied() else {
            return Ok(None);
        };
        Ok(self.rows.lock().iter().find(|tx| tx.id == id).cloned())
    }

    async fn find_by_member_between(
        &self,
        member_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<PointTransaction>> {
        check(&self.available)?;
        let mut found: Vec<_> = self
            .rows
            .lock()
            .iter()
            .filter(|tx| tx.member_id == member_id)
            .filter(|tx| tx.transaction_time >= start && tx.transaction_time <= end)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.transaction_time.cmp(&a.transaction_time));
        Ok(found)
    }

    async fn ping(&self) -> StoreResult<()> {
        check(&self.available)
    }
}

pub struct InMemoryHistoryStore {
    rows: Mutex<HashMap<Uuid, PointHistory>>,
    available: AtomicBool,
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<PointHistory> {
        let mut rows: Vec<_> = self.rows.lock().values().cloned().collect();
        rows.sort_by(|a, b| a.transaction_time.cmp(&b.transaction_time));
        rows
    }
}

#[async_trait]
impl PointHistoryStore for InMemoryHistoryStore {
    async fn insert(&self, entry: &PointHistory) -> StoreResult<PointHistory> {
        check(&self.available)?;
        let mut rows = self.rows.lock();
        if let Some(event_id) = &entry.source_event_id {
            if rows.values().any(|r| r.source_event_id.as_ref() == Some(event_id)) {
                return Err(StoreError::Conflict(format!("source event {}", event_id)));
            }
        }
        if rows.contains_key(&entry.id) {
            return Err(StoreError::Conflict(entry.id.to_string()));
        }
        rows.insert(entry.id, entry.clone());
        Ok(entry.clone())
    }

    async fn get(&self, id: Uuid) -> StoreResult<PointHistory> {
        check(&self.available)?;
        self.rows
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn find_by_source_event(&self, event_id: &str) -> StoreResult<Option<PointHistory>> {
        check(&self.available)?;
        Ok(self
            .rows
            .lock()
            .values()
            .find(|r| r.source_event_id.as_deref() == Some(event_id))
            .cloned())
    }

    async fn find_retryable(
        &self,
        ceiling: i32,
        pending_before: DateTime<Utc>,
    ) -> StoreResult<Vec<PointHistory>> {
        check(&self.available)?;
        let mut rows: Vec<_> = self
            .rows
            .lock()
            .values()
            .filter(|r| r.retry_count < ceiling)
            .filter(|r| match r.status {
                HistoryStatus::Failed => true,
                HistoryStatus::Pending => r.transaction_time <= pending_before,
                _ => false,
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.transaction_time.cmp(&b.transaction_time));
        Ok(rows)
    }

    async fn update_if_retryable(
        &self,
        updated: &PointHistory,
        expected_retry_count: i32,
    ) -> StoreResult<bool> {
        check(&self.available)?;
        let mut rows = self.rows.lock();
        match rows.get_mut(&updated.id) {
            Some(current)
                if current.retry_count == expected_retry_count && !current.status.is_terminal() =>
            {
                *current = updated.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(updated.id.to_string())),
        }
    }

    async fn list(&self, status: Option<HistoryStatus>, limit: i64) -> StoreResult<Vec<PointHistory>> {
        check(&self.available)?;
        let mut rows: Vec<_> = self
            .rows
            .lock()
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.transaction_time.cmp(&a.transaction_time));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn ping(&self) -> StoreResult<()> {
        check(&self.available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PartnerType, PointRequest};
    use bigdecimal::BigDecimal;

    fn request() -> PointRequest {
        PointRequest {
            member_id: "M1".into(),
            partner_id: "P1".into(),
            partner_type: "MART".into(),
            amount: BigDecimal::from(1000),
        }
    }

    #[tokio::test]
    async fn test_update_is_compare_and_set() {
        let store = InMemoryHistoryStore::new();
        let entry = store.insert(&PointHistory::pending(&request(), None)).await.unwrap();

        let failed = entry.failed("down", 3, Utc::now()).unwrap();
        assert!(store.update_if_retryable(&failed, 0).await.unwrap());
        // a second writer that read the same version loses
        assert!(!store.update_if_retryable(&failed, 0).await.unwrap());

        let done = failed.completed(BigDecimal::from(10), Utc::now()).unwrap();
        assert!(store.update_if_retryable(&done, 1).await.unwrap());
        assert!(!store.update_if_retryable(&done, 1).await.unwrap());
        assert_eq!(store.get(entry.id).await.unwrap().status, HistoryStatus::Completed);
    }

    #[tokio::test]
    async fn test_duplicate_source_event_conflicts() {
        let store = InMemoryHistoryStore::new();
        store
            .insert(&PointHistory::pending(&request(), Some("evt".into())))
            .await
            .unwrap();
        let err = store
            .insert(&PointHistory::pending(&request(), Some("evt".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_retryable_respects_grace_and_ceiling() {
        let store = InMemoryHistoryStore::new();
        let fresh = store.insert(&PointHistory::pending(&request(), None)).await.unwrap();
        let mut exhausted = PointHistory::pending(&request(), None);
        exhausted.status = HistoryStatus::Failed;
        exhausted.retry_count = 3;
        store.insert(&exhausted).await.unwrap();

        let none = store.find_retryable(3, fresh.transaction_time - chrono::Duration::seconds(1)).await.unwrap();
        assert!(none.is_empty());

        let some = store.find_retryable(3, Utc::now()).await.unwrap();
        assert_eq!(some.len(), 1);
        assert_eq!(some[0].id, fresh.id);
    }

    #[tokio::test]
    async fn test_one_transaction_per_history_entry() {
        let store = InMemoryTransactionStore::new();
        let history_id = Uuid::new_v4();
        let record = NewPointTransaction::completed(&request(), PartnerType::Mart).for_history(history_id);

        let first = store.insert(&record).await.unwrap();
        let err = store.insert(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.find_by_history(history_id).await.unwrap(), Some(first));
        assert_eq!(store.all().len(), 1);

        // plain accumulations are never deduplicated
        let plain = NewPointTransaction::completed(&request(), PartnerType::Mart);
        store.insert(&plain).await.unwrap();
        store.insert(&plain).await.unwrap();
        assert_eq!(store.all().len(), 3);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_transiently() {
        let store = InMemoryTransactionStore::new();
        store.set_available(false);
        let err = store.ping().await.unwrap_err();
        assert!(err.is_transient());
    }
}
