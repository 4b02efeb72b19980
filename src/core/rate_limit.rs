//! Token-bucket throttle for one endpoint.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::core::ApiError;
use crate::core::config::RateLimitConfig;

#[derive(Debug)]
struct Budget {
    tokens: u32,
    last_refill: Instant,
}

/// Grants at most `max_calls` permits per `period`, refilling the whole bucket
/// once the period has elapsed since the last refill.
///
/// One limiter is shared by every caller of an endpoint; it is shared state,
/// not a per-worker budget.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    config: RateLimitConfig,
    budget: Mutex<Budget>,
}

impl RateLimiter {
    /// Create a limiter with a full bucket.
    ///
    /// # Errors
    ///
    /// Fails fast if `max_calls` or `period` is zero.
    pub fn new(name: impl Into<String>, config: RateLimitConfig) -> Result<Self, ApiError> {
        let name = name.into();
        if config.max_calls == 0 || config.period.is_zero() {
            return Err(ApiError::InvalidConfig(format!(
                "{name}: rate limit needs positive max_calls and period"
            )));
        }
        Ok(Self {
            budget: Mutex::new(Budget {
                tokens: config.max_calls,
                last_refill: Instant::now(),
            }),
            name,
            config,
        })
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Tokens currently left in the bucket (without refilling).
    pub fn available(&self) -> u32 {
        self.budget
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tokens
    }

    /// Wait until a permit is available and consume it.
    ///
    /// Returns the time spent waiting for the bucket (zero when a token was
    /// immediately available); jitter is not included.
    pub async fn acquire(&self) -> Duration {
        let started = Instant::now();
        loop {
            let sleep_for = {
                let mut budget = self.budget.lock().unwrap_or_else(PoisonError::into_inner);
                let now = Instant::now();
                let elapsed = now.duration_since(budget.last_refill);
                if elapsed >= self.config.period {
                    budget.tokens = self.config.max_calls;
                    budget.last_refill = now;
                }
                if budget.tokens >= 1 {
                    budget.tokens -= 1;
                    None
                } else {
                    Some(self.config.period.saturating_sub(elapsed))
                }
            };

            match sleep_for {
                None => break,
                Some(d) => {
                    if d > self.config.warn_after {
                        tracing::warn!(
                            event = "rate_limit_wait",
                            endpoint = %self.name,
                            wait_ms = d.as_millis() as u64,
                            "rate limit budget exhausted, waiting"
                        );
                    }
                    tokio::time::sleep(d).await;
                }
            }
        }

        let waited = started.elapsed();
        if self.config.jitter {
            let ceiling = self.config.period.as_secs_f64() * 0.1;
            let extra = Duration::from_secs_f64(fastrand::f64() * ceiling);
            tokio::time::sleep(extra).await;
        }
        waited
    }
}
