//! Concurrency cap with a bounded wait for a free slot.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkheadFull;

pub struct Bulkhead {
    slots: Arc<Semaphore>,
    max_wait: Duration,
}

/// Holds one bulkhead slot until dropped.
#[derive(Debug)]
pub struct BulkheadPermit {
    _permit: OwnedSemaphorePermit,
}

impl Bulkhead {
    pub fn new(max_concurrent: usize, max_wait: Duration) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_concurrent)),
            max_wait,
        }
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Waits at most `max_wait` for a slot.
    pub async fn acquire(&self) -> Result<BulkheadPermit, BulkheadFull> {
        if let Ok(permit) = self.slots.clone().try_acquire_owned() {
            return Ok(BulkheadPermit { _permit: permit });
        }
        if self.max_wait.is_zero() {
            return Err(BulkheadFull);
        }
        match tokio::time::timeout(self.max_wait, self.slots.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(BulkheadPermit { _permit: permit }),
            // timed out, or the semaphore was closed
            _ => Err(BulkheadFull),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_after_wait() {
        let bulkhead = Bulkhead::new(1, Duration::from_millis(20));
        let held = bulkhead.acquire().await.unwrap();
        assert_eq!(bulkhead.acquire().await.unwrap_err(), BulkheadFull);
        drop(held);
        assert!(bulkhead.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_gets_released_slot() {
        let bulkhead = Arc::new(Bulkhead::new(1, Duration::from_millis(500)));
        let held = bulkhead.acquire().await.unwrap();

        let waiter = {
            let bulkhead = bulkhead.clone();
            tokio::spawn(async move { bulkhead.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert_eq!(waiter.await.unwrap(), Ok(()));
        assert_eq!(bulkhead.available(), 1);
    }
}
