//! Count-based circuit breaker.
//!
//! The breaker keeps the outcomes of the last `sliding_window_size` calls. Once
//! at least `minimum_calls` outcomes are recorded and the failure rate reaches
//! `failure_rate_threshold` percent, it opens and rejects calls until
//! `open_wait` has elapsed. It then lets a limited number of probe calls
//! through; `half_open_successes` consecutive successes close it again and any
//! failure reopens it.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Percentage of failed calls in the window that opens the circuit.
    pub failure_rate_threshold: f64,
    pub sliding_window_size: usize,
    pub minimum_calls: usize,
    pub open_wait: Duration,
    /// Consecutive probe successes needed to close, and the number of probes
    /// admitted at once while half-open.
    pub half_open_successes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            sliding_window_size: 10,
            minimum_calls: 5,
            open_wait: Duration::from_secs(30),
            half_open_successes: 3,
        }
    }
}

/// Returned when the breaker refuses a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitOpen {
    pub state: CircuitState,
}

struct BreakerState {
    state: CircuitState,
    /// `true` marks a failed call.
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    probes_in_flight: u32,
    probe_successes: u32,
}

impl BreakerState {
    fn failure_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let failures = self.window.iter().filter(|failed| **failed).count();
        failures as f64 * 100.0 / self.window.len() as f64
    }
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    opened_count: AtomicU64,
    rejected_count: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let window = VecDeque::with_capacity(config.sliding_window_size);
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                window,
                opened_at: None,
                probes_in_flight: 0,
                probe_successes: 0,
            }),
            opened_count: AtomicU64::new(0),
            rejected_count: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Failure rate in percent over the current window, or `None` while fewer
    /// than `minimum_calls` outcomes are recorded.
    pub fn failure_rate(&self) -> Option<f64> {
        let state = self.state.lock();
        if state.window.len() < self.config.minimum_calls {
            return None;
        }
        Some(state.failure_rate())
    }

    pub fn opened_count(&self) -> u64 {
        self.opened_count.load(Ordering::Relaxed)
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected_count.load(Ordering::Relaxed)
    }

    /// Asks for permission to make one call. The returned permit must be
    /// resolved with [`CallPermit::success`] or [`CallPermit::failure`]; a
    /// permit dropped unresolved frees its probe slot without recording.
    pub fn acquire(&self) -> Result<CallPermit<'_>, CircuitOpen> {
        let mut state = self.state.lock();
        match state.state {
            CircuitState::Closed => Ok(CallPermit::new(self, false)),
            CircuitState::Open => {
                let waited = state
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.open_wait)
                    .unwrap_or(true);
                if waited {
                    state.state = CircuitState::HalfOpen;
                    state.probes_in_flight = 1;
                    state.probe_successes = 0;
                    tracing::info!(breaker = %self.name, "circuit breaker half-open");
                    Ok(CallPermit::new(self, true))
                } else {
                    self.rejected_count.fetch_add(1, Ordering::Relaxed);
                    Err(CircuitOpen { state: CircuitState::Open })
                }
            }
            CircuitState::HalfOpen => {
                if state.probes_in_flight < self.config.half_open_successes.max(1) {
                    state.probes_in_flight += 1;
                    Ok(CallPermit::new(self, true))
                } else {
                    self.rejected_count.fetch_add(1, Ordering::Relaxed);
                    Err(CircuitOpen { state: CircuitState::HalfOpen })
                }
            }
        }
    }

    fn on_success(&self, probe: bool) -> CircuitState {
        let mut state = self.state.lock();
        match state.state {
            CircuitState::Closed => self.push_outcome(&mut state, false),
            CircuitState::HalfOpen if probe => {
                state.probes_in_flight = state.probes_in_flight.saturating_sub(1);
                state.probe_successes += 1;
                if state.probe_successes >= self.config.half_open_successes {
                    state.state = CircuitState::Closed;
                    state.window.clear();
                    state.opened_at = None;
                    state.probes_in_flight = 0;
                    tracing::info!(breaker = %self.name, "circuit breaker closed");
                }
            }
            // outcome of a call admitted before the last transition
            _ => {}
        }
        state.state
    }

    fn on_failure(&self, probe: bool) -> CircuitState {
        let mut state = self.state.lock();
        match state.state {
            CircuitState::Closed => {
                self.push_outcome(&mut state, true);
                if state.window.len() >= self.config.minimum_calls
                    && state.failure_rate() >= self.config.failure_rate_threshold
                {
                    let rate = state.failure_rate();
                    self.trip(&mut state);
                    tracing::warn!(
                        breaker = %self.name,
                        failure_rate = rate,
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen if probe => {
                self.trip(&mut state);
                tracing::warn!(breaker = %self.name, "circuit breaker reopened after failed probe");
            }
            _ => {}
        }
        state.state
    }

    fn release_probe(&self) {
        let mut state = self.state.lock();
        if state.state == CircuitState::HalfOpen {
            state.probes_in_flight = state.probes_in_flight.saturating_sub(1);
        }
    }

    fn push_outcome(&self, state: &mut BreakerState, failed: bool) {
        state.window.push_back(failed);
        while state.window.len() > self.config.sliding_window_size.max(1) {
            state.window.pop_front();
        }
    }

    fn trip(&self, state: &mut BreakerState) {
        state.state = CircuitState::Open;
        state.opened_at = Some(Instant::now());
        state.probes_in_flight = 0;
        state.probe_successes = 0;
        state.window.clear();
        self.opened_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Permission for a single call through a [`CircuitBreaker`].
#[must_use = "a permit records nothing unless resolved"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    resolved: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            resolved: false,
        }
    }

    /// Records a success and returns the breaker state afterwards.
    pub fn success(mut self) -> CircuitState {
        self.resolved = true;
        self.breaker.on_success(self.probe)
    }

    /// Records a failure and returns the breaker state afterwards.
    pub fn failure(mut self) -> CircuitState {
        self.resolved = true;
        self.breaker.on_failure(self.probe)
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.resolved && self.probe {
            self.breaker.release_probe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(open_wait: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_rate_threshold: 50.0,
                sliding_window_size: 4,
                minimum_calls: 4,
                open_wait,
                half_open_successes: 2,
            },
        )
    }

    #[test]
    fn test_stays_closed_below_minimum_calls() {
        let cb = breaker(Duration::from_secs(60));
        for _ in 0..3 {
            assert_eq!(cb.acquire().unwrap().failure(), CircuitState::Closed);
        }
        assert_eq!(cb.failure_rate(), None);
    }

    #[test]
    fn test_opens_at_threshold() {
        let cb = breaker(Duration::from_secs(60));
        let _ = cb.acquire().unwrap().success();
        let _ = cb.acquire().unwrap().success();
        let _ = cb.acquire().unwrap().failure();
        assert_eq!(cb.acquire().unwrap().failure(), CircuitState::Open);

        assert_eq!(cb.acquire().err(), Some(CircuitOpen { state: CircuitState::Open }));
        assert_eq!(cb.opened_count(), 1);
        assert_eq!(cb.rejected_count(), 1);
    }

    #[test]
    fn test_window_slides() {
        let cb = breaker(Duration::from_secs(60));
        let _ = cb.acquire().unwrap().failure();
        let _ = cb.acquire().unwrap().success();
        let _ = cb.acquire().unwrap().success();
        let _ = cb.acquire().unwrap().success();
        // oldest failure falls out of the window
        let _ = cb.acquire().unwrap().success();
        assert_eq!(cb.failure_rate(), Some(0.0));
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_closes_after_successes() {
        let cb = breaker(Duration::from_millis(20));
        for _ in 0..4 {
            let _ = cb.acquire().unwrap().failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;

        let first = cb.acquire().unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        let second = cb.acquire().unwrap();
        assert!(cb.acquire().is_err(), "only two probes allowed");

        assert_eq!(first.success(), CircuitState::HalfOpen);
        assert_eq!(second.success(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(Duration::from_millis(20));
        for _ in 0..4 {
            let _ = cb.acquire().unwrap().failure();
        }
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cb.acquire().unwrap().failure(), CircuitState::Open);
        assert!(cb.acquire().is_err());
        assert_eq!(cb.opened_count(), 2);
    }

    #[tokio::test]
    async fn test_dropped_probe_frees_slot() {
        let cb = breaker(Duration::from_millis(10));
        for _ in 0..4 {
            let _ = cb.acquire().unwrap().failure();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let a = cb.acquire().unwrap();
        let b = cb.acquire().unwrap();
        assert!(cb.acquire().is_err());
        drop(a);
        assert!(cb.acquire().is_ok());
        drop(b);
    }
}
