//! Admission gate in front of the accumulation service.
//!
//! Order per request: partner rate limiter, partner bulkhead, then the shared
//! circuit breaker with bounded retry. A request without a partner key skips
//! the first two. Failures that leave the gate are published as failure
//! events in the background; publishing never changes the caller's result.

pub mod compartment;

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use crate::config::GateSettings;
use crate::domain::event::RequestContext;
use crate::domain::FailureEvent;
use crate::events::EventPublisher;
use crate::resilience::{
    guarded_call, CircuitBreaker, CircuitState, Classify, FailureKind, GuardedError, RetryPolicy,
};

use compartment::Compartments;

pub const PARTNER_HEADER: &str = "x-partner-type";

#[derive(Debug, Error)]
pub enum GateError<E> {
    #[error("rate limit exceeded for partner {partner}")]
    RateLimited { partner: String },
    #[error("too many concurrent requests for partner {partner}")]
    BulkheadFull { partner: String },
    #[error("circuit breaker is {state}")]
    CircuitOpen { state: CircuitState },
    #[error("retry exhausted after {attempts} attempts")]
    RetryExhausted { attempts: u32 },
    #[error("{0}")]
    Downstream(E),
}

pub struct AdmissionGate {
    compartments: Compartments,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    publisher: Arc<dyn EventPublisher>,
}

impl AdmissionGate {
    pub fn new(settings: &GateSettings, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            compartments: Compartments::from_table(&settings.partners),
            breaker: Arc::new(CircuitBreaker::new("point-service", settings.circuit_breaker.clone())),
            retry: settings.retry.clone(),
            publisher,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub async fn execute<T, E, F, Fut>(
        &self,
        partner: Option<&str>,
        ctx: RequestContext,
        op: F,
    ) -> Result<T, GateError<E>>
    where
        E: Classify + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _slot = match partner.map(str::trim).filter(|p| !p.is_empty()) {
            Some(raw) => {
                let key = raw.to_ascii_lowercase();
                let compartment = self.compartments.get(&key);
                if !compartment.limiter.try_acquire() {
                    tracing::warn!(partner_key = %key, "rate limit exceeded");
                    return Err(GateError::RateLimited { partner: key });
                }
                match compartment.bulkhead.acquire().await {
                    Ok(slot) => Some(slot),
                    Err(_) => {
                        tracing::warn!(partner_key = %key, "bulkhead full");
                        return Err(GateError::BulkheadFull { partner: key });
                    }
                }
            }
            None => None,
        };

        match guarded_call(&self.breaker, &self.retry, op).await {
            Ok(value) => Ok(value),
            Err(GuardedError::CircuitOpen { state, last_error, .. }) => {
                let error = last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| format!("circuit breaker is {}", state));
                tracing::warn!(path = %ctx.path, circuit_state = %state, "call rejected by open circuit");
                self.emit(FailureEvent::circuit_opened(&ctx, state.as_str(), error));
                Err(GateError::CircuitOpen { state })
            }
            Err(GuardedError::RetryExhausted { attempts, last_error }) => {
                tracing::warn!(path = %ctx.path, attempts, "retry budget exhausted");
                self.emit(FailureEvent::retry_exhausted(&ctx, attempts, last_error.to_string()));
                Err(GateError::RetryExhausted { attempts })
            }
            Err(GuardedError::Failed(err)) => {
                if err.failure_kind() == FailureKind::Fatal {
                    tracing::error!(path = %ctx.path, "processing failed: {}", err);
                    self.emit(FailureEvent::processing_failed(
                        &ctx,
                        self.breaker.state().as_str(),
                        self.breaker.failure_rate(),
                        err.to_string(),
                    ));
                }
                Err(GateError::Downstream(err))
            }
        }
    }

    fn emit(&self, event: FailureEvent) {
        let publisher = self.publisher.clone();
        tokio::spawn(async move {
            let event_type = event.event_type.clone();
            if let Err(e) = publisher.publish(event).await {
                tracing::error!(event_type = %event_type, "failed to publish failure event: {}", e);
            }
        });
    }
}
