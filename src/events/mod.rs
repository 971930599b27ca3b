//! Failure event channel.
//!
//! The gate publishes through [`EventPublisher`] without waiting on the
//! outcome. Two transports exist: an in-process queue consumed by recovery
//! ingestion, and an outbound webhook for an external event broker.

pub mod channel;
pub mod webhook;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::FailureEvent;

pub use channel::{spawn_consumer, ChannelPublisher, Delivery};
pub use webhook::WebhookPublisher;

pub const EVENT_TYPE_HEADER: &str = "aeg-event-type";
pub const SAS_KEY_HEADER: &str = "aeg-sas-key";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("event channel is full")]
    ChannelFull,
    #[error("event channel is closed")]
    Closed,
    #[error("invalid webhook url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook rejected event with status {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: FailureEvent) -> Result<(), PublishError>;
}
