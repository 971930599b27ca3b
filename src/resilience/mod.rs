//! Resilience primitives and the breaker-plus-retry call wrapper shared by the
//! admission gate and the recovery replayer.

pub mod bulkhead;
pub mod circuit_breaker;
pub mod retry;
pub mod token_bucket;

use std::future::Future;

pub use bulkhead::{Bulkhead, BulkheadFull, BulkheadPermit};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitOpen, CircuitState};
pub use retry::RetryPolicy;
pub use token_bucket::TokenBucket;

/// How a failed call should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Bad input. Not retried and not held against the dependency.
    Client,
    /// Dependency hiccup. Retried and counted by the breaker.
    Transient,
    /// Unexpected failure. Counted by the breaker but not retried.
    Fatal,
}

pub trait Classify {
    fn failure_kind(&self) -> FailureKind;
}

#[derive(Debug)]
pub enum GuardedError<E> {
    /// The breaker refused an attempt, or opened while retrying.
    CircuitOpen {
        state: CircuitState,
        attempts: u32,
        last_error: Option<E>,
    },
    /// Every attempt failed transiently.
    RetryExhausted { attempts: u32, last_error: E },
    /// A client or fatal error, returned as is.
    Failed(E),
}

impl<E: std::fmt::Display> GuardedError<E> {
    pub fn describe(&self) -> String {
        match self {
            GuardedError::CircuitOpen { state, last_error: Some(e), .. } => {
                format!("circuit breaker is {}: {}", state, e)
            }
            GuardedError::CircuitOpen { state, .. } => format!("circuit breaker is {}", state),
            GuardedError::RetryExhausted { attempts, last_error } => {
                format!("retry exhausted after {} attempts: {}", attempts, last_error)
            }
            GuardedError::Failed(e) => e.to_string(),
        }
    }
}

/// Runs `op` through `breaker`, retrying transient failures per `policy`.
///
/// Retrying stops as soon as the breaker opens, and the call then fails with
/// `CircuitOpen` instead of `RetryExhausted`.
pub async fn guarded_call<T, E, F, Fut>(
    breaker: &CircuitBreaker,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, GuardedError<E>>
where
    E: Classify,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    let mut last_error = None;

    loop {
        let permit = match breaker.acquire() {
            Ok(permit) => permit,
            Err(open) => {
                return Err(GuardedError::CircuitOpen {
                    state: open.state,
                    attempts: attempt,
                    last_error,
                })
            }
        };
        attempt += 1;

        let err = match op().await {
            Ok(value) => {
                permit.success();
                return Ok(value);
            }
            Err(err) => err,
        };

        match err.failure_kind() {
            FailureKind::Client => {
                permit.success();
                return Err(GuardedError::Failed(err));
            }
            FailureKind::Fatal => {
                permit.failure();
                return Err(GuardedError::Failed(err));
            }
            FailureKind::Transient => {
                let state = permit.failure();
                if state == CircuitState::Open {
                    return Err(GuardedError::CircuitOpen {
                        state,
                        attempts: attempt,
                        last_error: Some(err),
                    });
                }
                if attempt >= max_attempts {
                    return Err(GuardedError::RetryExhausted {
                        attempts: attempt,
                        last_error: err,
                    });
                }
                tracing::debug!(
                    breaker = breaker.name(),
                    attempt,
                    "transient failure, retrying"
                );
                last_error = Some(err);
                tokio::time::sleep(policy.backoff_after(attempt)).await;
            }
        }
    }
}
