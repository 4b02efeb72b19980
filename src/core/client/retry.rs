use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::core::ErrorKind;
use crate::core::client::constants::DEFAULT_MAX_RETRY_AFTER;
use crate::core::config::secs;
use crate::core::ApiError;

/// Specifies the backoff strategy for retrying failed requests.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        #[serde(with = "secs")]
        delay: Duration,
    },
    /// Uses an exponential delay between retries.
    /// The delay is calculated as `base * (factor ^ attempt)`.
    Exponential {
        /// The initial backoff duration.
        #[serde(with = "secs")]
        base: Duration,
        /// The multiplicative factor for each subsequent retry.
        factor: f64,
        /// The maximum duration to wait between retries.
        #[serde(with = "secs")]
        max: Duration,
        /// Whether to apply random jitter (+/- 50%) to the delay.
        #[serde(default)]
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(1),
            factor: 2.0,
            max: Duration::from_secs(60),
            jitter: false,
        }
    }
}

impl Backoff {
    /// Delay for the given attempt number. The exponential strategy never exceeds
    /// `max`, jitter included.
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
                let seconds = (base.as_secs_f64() * factor.powi(exp)).min(max.as_secs_f64());
                let delay = Duration::try_from_secs_f64(seconds).unwrap_or(max);
                if jitter {
                    let half = delay.as_millis() as u64 / 2;
                    let offset = fastrand::u64(0..=half * 2);
                    Duration::from_millis((delay.as_millis() as u64 + offset).saturating_sub(half))
                        .min(max)
                } else {
                    delay
                }
            }
        }
    }
}

/// Retry budget for one endpoint.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per call, the first one included.
    pub max_attempts: u32,
    /// The backoff strategy to use between retries.
    pub backoff: Backoff,
    /// Error kinds that end the call immediately, whatever the attempt count.
    pub giveup_kinds: Vec<ErrorKind>,
    /// Non-5xx statuses that are retried (5xx are always retried).
    pub retry_on_status: Vec<u16>,
    /// Ceiling for server `Retry-After` hints.
    #[serde(with = "secs")]
    pub max_retry_after: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::default(),
            giveup_kinds: Vec::new(),
            retry_on_status: vec![429],
            max_retry_after: DEFAULT_MAX_RETRY_AFTER,
        }
    }
}

impl RetryConfig {
    /// `max_attempts` tries with a fixed pause in between.
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed { delay },
            ..Self::default()
        }
    }

    /// A single attempt, never retried.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Whether a non-5xx status is configured as retryable.
    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retry_on_status.contains(&status)
    }

    /// Whether `error` is worth another attempt, ignoring the attempt budget.
    ///
    /// Immediate-giveup kinds never are. Connectivity failures and 5xx always
    /// are, as are configured statuses; every other 4xx is not.
    pub fn is_retryable(&self, error: &ApiError) -> bool {
        let kind = error.kind();
        if self.giveup_kinds.contains(&kind) {
            return false;
        }
        match kind {
            ErrorKind::Connectivity | ErrorKind::Server => true,
            ErrorKind::RateLimited => error
                .status()
                .is_none_or(|s| (500..=599).contains(&s) || self.should_retry_status(s)),
            ErrorKind::Client | ErrorKind::BreakerOpen | ErrorKind::Exhausted | ErrorKind::Other => {
                false
            }
        }
    }

    /// Decide whether `error`, raised by attempt number `attempt` (1-based), ends the call.
    ///
    /// The budget is checked first, then the error itself.
    pub fn should_give_up(&self, error: &ApiError, attempt: u32) -> bool {
        attempt >= self.max_attempts || !self.is_retryable(error)
    }

    /// Pause before the attempt following `attempt`.
    ///
    /// A server hint replaces the computed backoff for this one wait, clamped to
    /// `max_retry_after`.
    pub fn wait_time(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint.min(self.max_retry_after),
            None => self.backoff.delay(attempt),
        }
    }
}

/// Parse a `Retry-After` header value relative to `now`.
///
/// Accepts delta-seconds (`"120"`) and HTTP dates
/// (`"Wed, 21 Oct 2015 07:28:00 GMT"`). Dates in the past give zero.
/// Anything else gives `None`, so the caller falls back to computed backoff.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(secs) = value.parse::<f64>() {
        return (secs.is_finite() && secs >= 0.0)
            .then(|| Duration::try_from_secs_f64(secs).ok())
            .flatten();
    }
    let when = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((when - now).to_std().unwrap_or(Duration::ZERO))
}

/// Defines the behavior of the in-memory cache for an API call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Read from the cache if a non-expired entry is present; otherwise, fetch from the network
    /// and write the response to the cache. (Default)
    #[default]
    Use,
    /// Always fetch from the network, bypassing any cached entry, and write the new response to the cache.
    Refresh,
    /// Always fetch from the network and do not read from or write to the cache.
    Bypass,
}
