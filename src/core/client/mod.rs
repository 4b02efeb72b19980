//! Public client surface + builder.
//! Internals are split into `cache` (TTL response store), `constants` (UA + defaults),
//! `request` (call envelope) and `retry` (retry budget and backoff).

mod cache;
pub(crate) mod constants;
mod request;
mod retry;

pub use request::{ApiRequest, RawResponse};
pub use retry::{Backoff, CacheMode, RetryConfig, parse_retry_after};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::OnceCell;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use url::Url;

use crate::core::circuit::{CircuitBreaker, CircuitState};
use crate::core::config::EndpointConfig;
use crate::core::rate_limit::RateLimiter;
use crate::core::{ApiError, net};
use crate::paginate::Handshake;
use cache::{CacheStore, CachedResponse};
use constants::USER_AGENT;

#[derive(Debug)]
struct ClientInner {
    config: EndpointConfig,
    http: Client,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    cache: Option<CacheStore>,
    handshakes: Mutex<HashMap<String, HandshakeCell>>,
}

/// Per-path memo slot; filled at most once, by the first successful handshake.
pub(crate) type HandshakeCell = Arc<OnceCell<Arc<Handshake>>>;

/// Transport for one logical remote service.
///
/// Owns a connection pool, a rate limiter, a circuit breaker and (optionally) a
/// response cache. Clones share all of them, so one instance can be handed to
/// any number of concurrent callers.
#[derive(Debug, Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    /// Build a client with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client cannot be built.
    pub fn new(config: EndpointConfig) -> Result<Self, ApiError> {
        Self::builder(config).build()
    }

    /// Create a new builder.
    pub fn builder(config: EndpointConfig) -> ApiClientBuilder {
        ApiClientBuilder { config, http: None }
    }

    /* -------- accessors -------- */

    /// Endpoint name used in logs and error context.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// The validated configuration this client was built from.
    pub fn config(&self) -> &EndpointConfig {
        &self.inner.config
    }

    /// Base address every relative path is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.inner.config.base_url
    }

    /// The limiter shared by every clone of this client.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    /// The breaker shared by every clone of this client.
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.inner.breaker
    }

    /// Current breaker state.
    pub fn circuit_state(&self) -> CircuitState {
        self.inner.breaker.state()
    }

    /// Operator action: close the circuit and forget past failures.
    pub fn reset_circuit(&self) {
        self.inner.breaker.reset();
    }

    /// Whether responses are cached at all.
    pub fn cache_enabled(&self) -> bool {
        self.inner.cache.is_some()
    }

    /// Number of cached responses (expired ones included until evicted).
    pub async fn cache_len(&self) -> usize {
        match &self.inner.cache {
            Some(c) => c.len().await,
            None => 0,
        }
    }

    /// Drop every cached response.
    pub async fn clear_cache(&self) {
        if let Some(c) = &self.inner.cache {
            c.clear().await;
        }
    }

    /// The memo slot for `path`, created empty on first use.
    pub(crate) fn handshake_cell(&self, path: &str) -> HandshakeCell {
        let mut memo = self
            .inner
            .handshakes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(memo.entry(path.to_string()).or_default())
    }

    /// Resolve a relative path (or a server-supplied cursor) against the base address.
    ///
    /// Absolute `http(s)` URLs pass through. Paths that already begin with the
    /// base path are taken as host-absolute; anything else is appended to the base.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Url` if the result does not parse.
    pub fn resolve(&self, path_or_url: &str) -> Result<Url, ApiError> {
        if let Ok(u) = Url::parse(path_or_url)
            && matches!(u.scheme(), "http" | "https")
        {
            return Ok(u);
        }

        let base = self.base_url();
        let base_path = base.path().trim_end_matches('/');
        if !base_path.is_empty() && path_or_url.starts_with(&format!("{base_path}/")) {
            return Ok(base.join(path_or_url)?);
        }

        let mut rooted = base.clone();
        if !rooted.path().ends_with('/') {
            let p = format!("{}/", rooted.path());
            rooted.set_path(&p);
        }
        Ok(rooted.join(path_or_url.trim_start_matches('/'))?)
    }

    /// Issue one call through cache, circuit breaker, rate limiter and retry loop.
    ///
    /// Only 2xx responses are returned; every other status becomes a classified
    /// `ApiError`.
    ///
    /// # Errors
    ///
    /// `BreakerOpen` without any I/O while the circuit is open, `Exhausted` once the
    /// retry budget is spent, or the classified error of an immediate give-up.
    #[tracing::instrument(skip(self, req), err, fields(endpoint = %self.name(), method = %req.method, path = %req.target))]
    pub async fn call(&self, req: ApiRequest) -> Result<RawResponse, ApiError> {
        let url = self.resolve(&req.target)?;

        let cache_key = match &self.inner.cache {
            Some(_) if req.cacheable() && req.cache_mode != CacheMode::Bypass => {
                Some(CacheStore::key(&url, &req.params))
            }
            _ => None,
        };

        if req.cache_mode == CacheMode::Use
            && let (Some(store), Some(key)) = (&self.inner.cache, &cache_key)
            && let Some(hit) = store.get(key).await
        {
            tracing::debug!(event = "cache_hit", endpoint = %self.name(), key = %key, "served from cache");
            return Ok(RawResponse {
                status: hit.status,
                url: with_query(&url, &req.params),
                headers: HeaderMap::new(),
                body: hit.body,
                from_cache: true,
            });
        }

        let resp = self
            .inner
            .breaker
            .call(|| self.send_with_retry(&req, &url))
            .await?;

        if let (Some(store), Some(key)) = (&self.inner.cache, cache_key) {
            store
                .put(
                    key,
                    CachedResponse {
                        status: resp.status,
                        body: resp.body.clone(),
                    },
                )
                .await;
        }
        Ok(resp)
    }

    /// Like [`ApiClient::call`], parsing the body as JSON.
    ///
    /// # Errors
    ///
    /// Everything `call` returns, plus `ApiError::Json` for a malformed body.
    pub async fn call_json(&self, req: ApiRequest) -> Result<serde_json::Value, ApiError> {
        self.call(req).await?.json()
    }

    /// GET `path` with `params` and parse the JSON body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::call_json`].
    pub async fn get_json<I, K, V>(&self, path: &str, params: I) -> Result<serde_json::Value, ApiError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.call_json(ApiRequest::get(path).params(params)).await
    }

    async fn send_with_retry(&self, req: &ApiRequest, url: &Url) -> Result<RawResponse, ApiError> {
        let retry = &self.inner.config.retry;
        let mut attempt: u32 = 0;
        let mut hint_honoured = false;

        loop {
            attempt += 1;
            let mut outcome = self.send_once(req, url).await;

            // A 429 carrying Retry-After gets one re-issue, counted against the budget.
            if !hint_honoured
                && attempt < retry.max_attempts
                && let Err(ApiError::RateLimited {
                    retry_after: Some(hint),
                    ..
                }) = &outcome
            {
                hint_honoured = true;
                let wait = (*hint).min(retry.max_retry_after);
                tracing::info!(
                    event = "retry_scheduled",
                    endpoint = %self.name(),
                    url = %url,
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    reason = "retry-after",
                    "honouring server retry-after"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
                outcome = self.send_once(req, url).await;
            }

            let err = match outcome {
                Ok(resp) => return Ok(resp),
                Err(e) => e,
            };

            if retry.should_give_up(&err, attempt) {
                let budget_spent = retry.is_retryable(&err);
                return Err(self.give_up(err, attempt, budget_spent));
            }

            let wait = retry.wait_time(attempt, err.retry_after());
            tracing::info!(
                event = "retry_scheduled",
                endpoint = %self.name(),
                url = %url,
                attempt,
                status = err.status(),
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "retrying after failure"
            );
            tokio::time::sleep(wait).await;
        }
    }

    fn give_up(&self, err: ApiError, attempts: u32, budget_spent: bool) -> ApiError {
        let at = Utc::now();
        if !budget_spent {
            tracing::warn!(
                event = "giving_up",
                endpoint = %self.name(),
                attempt = attempts,
                at = %at,
                kind = ?err.kind(),
                status = err.status(),
                retry_after_ms = err.retry_after().map(|d| d.as_millis() as u64),
                body = err.body_snippet().unwrap_or(""),
                error = %err,
                "non-retryable failure"
            );
            return err;
        }

        tracing::error!(
            event = "retry_exhausted",
            endpoint = %self.name(),
            attempts,
            at = %at,
            status = err.status(),
            retry_after_ms = err.retry_after().map(|d| d.as_millis() as u64),
            error = %err,
            "retry budget exhausted"
        );
        ApiError::Exhausted {
            endpoint: self.name().to_string(),
            attempts,
            at,
            status: err.status(),
            snippet: err.body_snippet().map(str::to_string),
            retry_after: err.retry_after(),
            last: Box::new(err),
        }
    }

    async fn send_once(&self, req: &ApiRequest, url: &Url) -> Result<RawResponse, ApiError> {
        let cfg = &self.inner.config;
        self.inner.limiter.acquire().await;

        let mut rb = self
            .inner
            .http
            .request(req.method.clone(), url.clone())
            .timeout(req.timeout.unwrap_or(cfg.timeouts.read));
        if !req.params.is_empty() {
            rb = rb.query(&req.params);
        }
        for (k, v) in &req.headers {
            rb = rb.header(k.as_str(), v.as_str());
        }
        if let Some(body) = &req.body {
            rb = rb.json(body);
        }

        let resp = rb
            .send()
            .await
            .map_err(|e| net::transport_error(&cfg.name, url.as_str(), e))?;

        let status = resp.status().as_u16();
        let final_url = resp.url().clone();
        let headers = resp.headers().clone();
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()));
        let body = net::get_text(resp, &cfg.name, final_url.as_str()).await?;

        if (200..300).contains(&status) {
            Ok(RawResponse {
                status,
                url: final_url,
                headers,
                body,
                from_cache: false,
            })
        } else {
            Err(net::status_error(
                &cfg.name,
                final_url.as_str(),
                status,
                &body,
                retry_after,
                &cfg.retry,
            ))
        }
    }
}

fn with_query(url: &Url, params: &[(String, String)]) -> Url {
    let mut full = url.clone();
    if !params.is_empty() {
        full.query_pairs_mut().extend_pairs(params);
    }
    full
}

/* ----------------------- Builder ----------------------- */

/// Builder for [`ApiClient`]; see [`ApiClient::builder`].
pub struct ApiClientBuilder {
    config: EndpointConfig,
    http: Option<Client>,
}

impl ApiClientBuilder {
    /// Use a preconfigured `reqwest::Client` (proxy, custom TLS...) instead of
    /// building one from the endpoint config. Timeouts from the config still
    /// apply per request.
    #[must_use]
    pub fn http_client(mut self, client: Client) -> Self {
        self.http = Some(client);
        self
    }

    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client cannot be built.
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let config = self.config;
        config.validate()?;

        let http = match self.http {
            Some(c) => c,
            None => {
                let mut headers = HeaderMap::new();
                for (k, v) in &config.headers {
                    let name = HeaderName::from_bytes(k.as_bytes())
                        .map_err(|e| ApiError::InvalidConfig(format!("header {k}: {e}")))?;
                    let value = HeaderValue::from_str(v)
                        .map_err(|e| ApiError::InvalidConfig(format!("header {k}: {e}")))?;
                    headers.insert(name, value);
                }
                reqwest::Client::builder()
                    .user_agent(config.user_agent.as_deref().unwrap_or(USER_AGENT))
                    .default_headers(headers)
                    .connect_timeout(config.timeouts.connect)
                    .build()?
            }
        };

        let limiter = RateLimiter::new(config.name.clone(), config.rate_limit.clone())?;
        let breaker = CircuitBreaker::new(config.name.clone(), &config.circuit);
        let cache = config.cache.enabled.then(|| CacheStore::new(&config.cache));

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                config,
                http,
                limiter,
                breaker,
                cache,
                handshakes: Mutex::new(HashMap::new()),
            }),
        })
    }
}
