use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::core::config::CircuitConfig;
use crate::core::{ApiError, ErrorKind};

/// Runtime circuit phase for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

impl Default for CircuitInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure: None,
            trial_in_flight: false,
        }
    }
}

/// Thread-safe circuit breaker guarding one endpoint.
///
/// Every check-and-transition happens under the single inner lock.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    timeout: Duration,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &CircuitConfig) -> Self {
        Self {
            name: name.into(),
            failure_threshold: config.failure_threshold.max(1),
            timeout: config.timeout,
            inner: Mutex::new(CircuitInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `operation` if the circuit admits it and record the outcome.
    ///
    /// Errors from `operation` are returned unchanged. When the circuit is open
    /// (or a half-open trial is already running) `operation` is never invoked and
    /// `ApiError::BreakerOpen` is returned instead. A `Client` error counts as a
    /// success: the remote answered.
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        if !self.try_acquire() {
            return Err(ApiError::BreakerOpen {
                endpoint: self.name.clone(),
            });
        }

        let mut pending = Pending {
            breaker: self,
            settled: false,
        };
        let outcome = operation().await;
        pending.settled = true;
        match &outcome {
            Ok(_) => self.record_success(),
            Err(e) if e.kind() == ErrorKind::Client => self.record_success(),
            Err(_) => self.record_failure(),
        }
        outcome
    }

    /// Admission check; moves open to half-open once the cool-down has passed.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
            CircuitState::Open => {
                let cooled = inner
                    .last_failure
                    .is_some_and(|at| at.elapsed() > self.timeout);
                if cooled {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    tracing::info!(
                        event = "circuit_half_open",
                        endpoint = %self.name,
                        "circuit half-open, letting one trial call through"
                    );
                    true
                } else {
                    false
                }
            }
        }
    }

    fn abandon_trial(&self) {
        self.lock().trial_in_flight = false;
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        let was = inner.state;
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.trial_in_flight = false;
        if was != CircuitState::Closed {
            tracing::info!(event = "circuit_closed", endpoint = %self.name, "circuit closed");
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        inner.trial_in_flight = false;

        let reopen = inner.state == CircuitState::HalfOpen;
        if reopen
            || (inner.state == CircuitState::Closed
                && inner.consecutive_failures >= self.failure_threshold)
        {
            inner.state = CircuitState::Open;
            tracing::warn!(
                event = "circuit_opened",
                endpoint = %self.name,
                failures = inner.consecutive_failures,
                cooldown_ms = self.timeout.as_millis() as u64,
                "circuit opened"
            );
        }
    }

    /// Operator action: forget all failures and close the circuit.
    pub fn reset(&self) {
        let mut inner = self.lock();
        *inner = CircuitInner::default();
        tracing::info!(event = "circuit_closed", endpoint = %self.name, "circuit reset by operator");
    }

    /// State as of the last recorded outcome.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Failures counted since the last success or reset.
    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }
}

/// Releases a half-open trial slot if the guarded call is dropped mid-flight.
struct Pending<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.abandon_trial();
        }
    }
}
