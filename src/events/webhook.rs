use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::domain::FailureEvent;

use super::{EventPublisher, PublishError, EVENT_TYPE_HEADER, SAS_KEY_HEADER};

/// Posts failure events to an external broker endpoint as a JSON array.
#[derive(Clone)]
pub struct WebhookPublisher {
    client: Client,
    endpoint: Url,
    access_key: Option<String>,
}

impl WebhookPublisher {
    pub fn new(endpoint: &str, access_key: Option<String>) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            endpoint: Url::parse(endpoint)?,
            access_key,
        })
    }
}

#[async_trait]
impl EventPublisher for WebhookPublisher {
    async fn publish(&self, event: FailureEvent) -> Result<(), PublishError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(EVENT_TYPE_HEADER, "Notification")
            .json(&[&event]);
        if let Some(key) = &self.access_key {
            request = request.header(SAS_KEY_HEADER, key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Rejected(status.as_u16()));
        }

        tracing::debug!(event_type = %event.event_type, "failure event published");
        Ok(())
    }
}
