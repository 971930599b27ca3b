use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::FailureEvent;
use crate::services::RecoveryIngestion;

use super::{EventPublisher, PublishError};

const REDELIVERY_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct Delivery {
    pub event: FailureEvent,
    /// 1 for the first delivery.
    pub attempt: u32,
}

/// Bounded in-process event queue.
#[derive(Clone)]
pub struct ChannelPublisher {
    sender: mpsc::Sender<Delivery>,
}

impl ChannelPublisher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Delivery>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventPublisher for ChannelPublisher {
    async fn publish(&self, event: FailureEvent) -> Result<(), PublishError> {
        self.sender
            .try_send(Delivery { event, attempt: 1 })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => PublishError::ChannelFull,
                mpsc::error::TrySendError::Closed(_) => PublishError::Closed,
            })
    }
}

/// Feeds queued events to `ingestion`. Deliveries that fail with a ledger
/// error are queued again, up to `redelivery_limit` deliveries in total.
///
/// The consumer only holds a weak handle on the queue, so it stops once every
/// publisher is dropped and the queue drains.
pub fn spawn_consumer(
    publisher: &ChannelPublisher,
    mut receiver: mpsc::Receiver<Delivery>,
    ingestion: Arc<RecoveryIngestion>,
    redelivery_limit: u32,
) -> JoinHandle<()> {
    let requeue = publisher.sender.downgrade();
    tokio::spawn(async move {
        while let Some(delivery) = receiver.recv().await {
            let ingestion = ingestion.clone();
            let requeue = requeue.clone();
            tokio::spawn(async move {
                let err = match ingestion.ingest(&delivery.event).await {
                    Ok(_) => return,
                    Err(e) => e,
                };
                let event_id = delivery.event.source_id().unwrap_or_default().to_string();
                if delivery.attempt >= redelivery_limit {
                    tracing::error!(
                        event_id = %event_id,
                        attempt = delivery.attempt,
                        "giving up on failure event: {}",
                        err
                    );
                    return;
                }
                tracing::warn!(
                    event_id = %event_id,
                    attempt = delivery.attempt,
                    "failure event not ingested, redelivering: {}",
                    err
                );
                tokio::time::sleep(REDELIVERY_BACKOFF * delivery.attempt).await;
                let Some(sender) = requeue.upgrade() else {
                    return;
                };
                let next = Delivery {
                    attempt: delivery.attempt + 1,
                    event: delivery.event,
                };
                if sender.send(next).await.is_err() {
                    tracing::error!(event_id = %event_id, "event channel closed before redelivery");
                }
            });
        }
        tracing::info!("failure event consumer stopped");
    })
}
