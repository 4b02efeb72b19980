//! Immutable per-endpoint configuration and its builder.
//!
//! Durations deserialize from floating-point seconds so an outer loader can
//! populate these structs from JSON or TOML.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::core::ApiError;
use crate::core::client::constants::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL, DEFAULT_CONNECT_TIMEOUT, DEFAULT_LIMIT_PARAM,
    DEFAULT_META_KEY, DEFAULT_NEXT_KEY, DEFAULT_PAGE_SIZE, DEFAULT_READ_TIMEOUT,
    DEFAULT_WAIT_WARNING, MAX_PAGE_SIZE,
};
use crate::core::client::{Backoff, RetryConfig};

pub(crate) mod secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = f64::deserialize(d)?;
        Duration::try_from_secs_f64(raw).map_err(serde::de::Error::custom)
    }
}

/// Response cache settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether successful read responses are cached at all.
    pub enabled: bool,
    /// How long an entry stays fresh.
    #[serde(with = "secs")]
    pub ttl: Duration,
    /// Maximum number of entries held at once.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: DEFAULT_CACHE_TTL,
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Token-bucket quota for one endpoint.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Calls permitted per `period`.
    pub max_calls: u32,
    /// Window after which the bucket refills completely.
    #[serde(with = "secs")]
    pub period: Duration,
    /// Add a uniform 0-10% of `period` after each acquisition.
    pub jitter: bool,
    /// Waits longer than this are logged as a warning.
    #[serde(with = "secs")]
    pub warn_after: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: 10,
            period: Duration::from_secs(1),
            jitter: false,
            warn_after: DEFAULT_WAIT_WARNING,
        }
    }
}

/// Circuit breaker thresholds.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Cool-down before a half-open trial call is allowed.
    #[serde(with = "secs")]
    pub timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Connect and read timeouts.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    #[serde(with = "secs")]
    pub connect: Duration,
    #[serde(with = "secs")]
    pub read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            read: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Wire conventions of a cursor-paginated list API.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Field holding the page metadata object.
    pub meta_key: String,
    /// Field inside the metadata object holding the next cursor.
    pub next_key: String,
    /// Query parameter carrying the page size.
    pub limit_param: String,
    /// Page size injected when the caller gives none.
    pub default_page_size: u32,
    /// Ceiling imposed by the remote API.
    pub max_page_size: u32,
    /// Status endpoint hit once before the first traversal.
    pub status_path: Option<String>,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            meta_key: DEFAULT_META_KEY.to_string(),
            next_key: DEFAULT_NEXT_KEY.to_string(),
            limit_param: DEFAULT_LIMIT_PARAM.to_string(),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            status_path: None,
        }
    }
}

/// Everything the transport needs to know about one logical remote service.
///
/// Created once, then shared read-only by the client, its breaker and its limiter.
#[derive(Clone, Debug, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub base_url: Url,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub circuit: CircuitConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
}

impl EndpointConfig {
    /// Start building a config for `name` rooted at `base_url`.
    pub fn builder(name: impl Into<String>, base_url: impl Into<String>) -> EndpointConfigBuilder {
        EndpointConfigBuilder {
            name: name.into(),
            base_url: base_url.into(),
            headers: BTreeMap::new(),
            user_agent: None,
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            timeouts: Timeouts::default(),
            circuit: CircuitConfig::default(),
            pagination: PaginationConfig::default(),
        }
    }

    /// Check the invariants every component relies on.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidConfig` naming the first offending setting.
    pub fn validate(&self) -> Result<(), ApiError> {
        let fail = |msg: String| Err(ApiError::InvalidConfig(format!("{}: {msg}", self.name)));

        if self.name.trim().is_empty() {
            return Err(ApiError::InvalidConfig("endpoint name is empty".into()));
        }
        if self.base_url.cannot_be_a_base() {
            return fail(format!("base url {} cannot be a base", self.base_url));
        }
        if self.rate_limit.max_calls == 0 {
            return fail("rate_limit.max_calls must be positive".into());
        }
        if self.rate_limit.period.is_zero() {
            return fail("rate_limit.period must be positive".into());
        }
        if self.retry.max_attempts == 0 {
            return fail("retry.max_attempts must be at least 1".into());
        }
        if let Backoff::Exponential { factor, .. } = self.retry.backoff
            && !(factor.is_finite() && factor >= 1.0)
        {
            return fail(format!("retry backoff factor {factor} must be >= 1"));
        }
        if self.circuit.failure_threshold == 0 {
            return fail("circuit.failure_threshold must be at least 1".into());
        }
        if self.cache.enabled && self.cache.capacity == 0 {
            return fail("cache.capacity must be positive when caching is enabled".into());
        }
        if self.pagination.max_page_size == 0 || self.pagination.default_page_size == 0 {
            return fail("page sizes must be positive".into());
        }
        for (k, v) in &self.headers {
            if reqwest::header::HeaderName::from_bytes(k.as_bytes()).is_err()
                || reqwest::header::HeaderValue::from_str(v).is_err()
            {
                return fail(format!("invalid header {k}"));
            }
        }
        Ok(())
    }
}

/* ----------------------- Builder ----------------------- */

pub struct EndpointConfigBuilder {
    name: String,
    base_url: String,
    headers: BTreeMap<String, String>,
    user_agent: Option<String>,
    cache: CacheConfig,
    rate_limit: RateLimitConfig,
    retry: RetryConfig,
    timeouts: Timeouts,
    circuit: CircuitConfig,
    pagination: PaginationConfig,
}

impl EndpointConfigBuilder {
    /// Add a header sent with every request.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Override the User-Agent.
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Enable in-memory caching of read responses with the given TTL.
    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.enabled = true;
        self.cache.ttl = ttl;
        self
    }

    /// Bound the number of cached responses.
    #[must_use]
    pub const fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache.capacity = capacity;
        self
    }

    /// Allow `max_calls` per `period`.
    #[must_use]
    pub const fn rate_limit(mut self, max_calls: u32, period: Duration) -> Self {
        self.rate_limit.max_calls = max_calls;
        self.rate_limit.period = period;
        self
    }

    /// Spread acquisitions by up to 10% of the period.
    #[must_use]
    pub const fn rate_limit_jitter(mut self, on: bool) -> Self {
        self.rate_limit.jitter = on;
        self
    }

    /// Replace the retry budget.
    #[must_use]
    pub fn retry_config(mut self, cfg: RetryConfig) -> Self {
        self.retry = cfg;
        self
    }

    #[must_use]
    pub const fn connect_timeout(mut self, d: Duration) -> Self {
        self.timeouts.connect = d;
        self
    }

    #[must_use]
    pub const fn read_timeout(mut self, d: Duration) -> Self {
        self.timeouts.read = d;
        self
    }

    /// Open after `failure_threshold` consecutive failures, allow one trial call after `timeout`.
    #[must_use]
    pub const fn circuit(mut self, failure_threshold: u32, timeout: Duration) -> Self {
        self.circuit.failure_threshold = failure_threshold;
        self.circuit.timeout = timeout;
        self
    }

    /// Replace the pagination wire conventions.
    #[must_use]
    pub fn pagination(mut self, cfg: PaginationConfig) -> Self {
        self.pagination = cfg;
        self
    }

    /// Path of the status endpoint used for the pre-traversal handshake.
    #[must_use]
    pub fn status_path(mut self, path: impl Into<String>) -> Self {
        self.pagination.status_path = Some(path.into());
        self
    }

    /// Validate and freeze the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL does not parse or any setting is out of range.
    pub fn build(self) -> Result<EndpointConfig, ApiError> {
        let cfg = EndpointConfig {
            name: self.name,
            base_url: Url::parse(&self.base_url)?,
            headers: self.headers,
            user_agent: self.user_agent,
            cache: self.cache,
            rate_limit: self.rate_limit,
            retry: self.retry,
            timeouts: self.timeouts,
            circuit: self.circuit,
            pagination: self.pagination,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}
