use std::time::Duration;

use reqwest::Method;
use reqwest::header::HeaderMap;
use url::Url;

use crate::core::ApiError;
use crate::core::client::CacheMode;

/// One outbound call: method, relative path or absolute URL, query, optional JSON body.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub(crate) method: Method,
    pub(crate) target: String,
    pub(crate) params: Vec<(String, String)>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Option<serde_json::Value>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) cache_mode: CacheMode,
}

impl ApiRequest {
    pub fn new(method: Method, path_or_url: impl Into<String>) -> Self {
        Self {
            method,
            target: path_or_url.into(),
            params: Vec::new(),
            headers: Vec::new(),
            body: None,
            timeout: None,
            cache_mode: CacheMode::Use,
        }
    }

    pub fn get(path_or_url: impl Into<String>) -> Self {
        Self::new(Method::GET, path_or_url)
    }

    pub fn post(path_or_url: impl Into<String>) -> Self {
        Self::new(Method::POST, path_or_url)
    }

    /// Append a query parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Append several query parameters, keeping their order.
    #[must_use]
    pub fn params<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Add a header for this call only.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Send `body` as JSON. Requests with a body are never cached.
    #[must_use]
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Override the endpoint's read timeout for this call.
    #[must_use]
    pub const fn timeout(mut self, d: Duration) -> Self {
        self.timeout = Some(d);
        self
    }

    /// Sets the cache mode for this specific call.
    #[must_use]
    pub const fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.params
    }

    /// Only body-less reads are served from or stored in the cache.
    pub(crate) fn cacheable(&self) -> bool {
        matches!(self.method, Method::GET | Method::HEAD) && self.body.is_none()
    }
}

/// A successful (2xx) response, fully read.
#[derive(Clone, Debug)]
pub struct RawResponse {
    pub status: u16,
    /// The final URL, query included.
    pub url: Url,
    /// Empty when served from cache.
    pub headers: HeaderMap,
    pub body: String,
    pub from_cache: bool,
}

impl RawResponse {
    /// Parse the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Json` if the body is not valid JSON.
    pub fn json(&self) -> Result<serde_json::Value, ApiError> {
        serde_json::from_str(&self.body).map_err(ApiError::Json)
    }
}
