use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Closed set of failure categories produced at the transport boundary.
///
/// The retry policy and the circuit breaker only ever look at this tag, never at
/// library-specific error types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// DNS, connect, read timeout or a broken body stream.
    Connectivity,
    /// HTTP 429 (or another status configured as retryable).
    RateLimited,
    /// HTTP 5xx.
    Server,
    /// Any other HTTP 4xx.
    Client,
    /// The endpoint's circuit breaker rejected the call without a network attempt.
    BreakerOpen,
    /// The retry budget ran out.
    Exhausted,
    /// Anything that is not a transport outcome (bad URL, bad JSON, bad config...).
    Other,
}

/// The primary error type for all fallible operations in this crate.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The remote could not be reached or the exchange was cut short.
    #[error("connectivity failure talking to {endpoint} at {url}: {source}")]
    Connectivity {
        /// Logical endpoint name.
        endpoint: String,
        /// The URL being requested.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The remote asked us to slow down.
    #[error("rate limited by {endpoint} (status {status}) at {url}")]
    RateLimited {
        /// Logical endpoint name.
        endpoint: String,
        /// The HTTP status code, usually 429.
        status: u16,
        /// The URL that returned the error.
        url: String,
        /// Server supplied `Retry-After` hint, if it could be parsed.
        retry_after: Option<Duration>,
        /// Leading part of the response body.
        body: String,
    },

    /// The remote failed with a 5xx status.
    #[error("server error {status} from {endpoint} at {url}")]
    Server {
        /// Logical endpoint name.
        endpoint: String,
        /// The HTTP status code.
        status: u16,
        /// The URL that returned the error.
        url: String,
        /// Leading part of the response body.
        body: String,
    },

    /// The remote rejected the request with a non-retryable 4xx status.
    #[error("client error {status} from {endpoint} at {url}")]
    Client {
        /// Logical endpoint name.
        endpoint: String,
        /// The HTTP status code.
        status: u16,
        /// The URL that returned the error.
        url: String,
        /// Leading part of the response body.
        body: String,
    },

    /// The circuit breaker for this endpoint is open.
    #[error("circuit breaker for {endpoint} is open")]
    BreakerOpen {
        /// Logical endpoint name.
        endpoint: String,
    },

    /// Every permitted attempt failed; `last` is the final attempt's error.
    #[error("{endpoint}: giving up after {attempts} attempt(s): {last}")]
    Exhausted {
        /// Logical endpoint name.
        endpoint: String,
        /// Number of attempts performed.
        attempts: u32,
        /// When the last attempt failed.
        at: DateTime<Utc>,
        /// HTTP status of the last attempt, if it got a response.
        status: Option<u16>,
        /// Leading part of the last response body, if any.
        snippet: Option<String>,
        /// Retry-after hint carried by the last response, if any.
        retry_after: Option<Duration>,
        /// The error that ended the last attempt.
        #[source]
        last: Box<ApiError>,
    },

    /// A request could not be built or sent for reasons unrelated to connectivity.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A provided URL could not be parsed.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// A response body was not valid JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The data received from the API was in an unexpected shape.
    #[error("Data format unexpected: {0}")]
    Data(String),

    /// An endpoint configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The server handed back a cursor that was already followed in this traversal.
    #[error("pagination cursor repeated: {cursor}")]
    RepeatedCursor {
        /// The cursor that was seen twice.
        cursor: String,
    },
}

impl ApiError {
    /// Tag used for retry and circuit decisions.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connectivity { .. } => ErrorKind::Connectivity,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Server { .. } => ErrorKind::Server,
            Self::Client { .. } => ErrorKind::Client,
            Self::BreakerOpen { .. } => ErrorKind::BreakerOpen,
            Self::Exhausted { .. } => ErrorKind::Exhausted,
            Self::Http(_)
            | Self::Url(_)
            | Self::Json(_)
            | Self::Data(_)
            | Self::InvalidConfig(_)
            | Self::RepeatedCursor { .. } => ErrorKind::Other,
        }
    }

    /// HTTP status carried by this error (or by the last attempt, for `Exhausted`).
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { status, .. }
            | Self::Server { status, .. }
            | Self::Client { status, .. } => Some(*status),
            Self::Exhausted { status, .. } => *status,
            _ => None,
        }
    }

    /// Logical endpoint name, when the error originated at the transport boundary.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Connectivity { endpoint, .. }
            | Self::RateLimited { endpoint, .. }
            | Self::Server { endpoint, .. }
            | Self::Client { endpoint, .. }
            | Self::BreakerOpen { endpoint }
            | Self::Exhausted { endpoint, .. } => Some(endpoint),
            _ => None,
        }
    }

    /// Server-supplied retry-after hint.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } | Self::Exhausted { retry_after, .. } => {
                *retry_after
            }
            _ => None,
        }
    }

    /// Number of attempts made before this error was raised, if known.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Exhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Leading part of the response body attached to this error.
    pub fn body_snippet(&self) -> Option<&str> {
        match self {
            Self::RateLimited { body, .. } | Self::Server { body, .. } | Self::Client { body, .. } => {
                Some(body)
            }
            Self::Exhausted { snippet, .. } => snippet.as_deref(),
            _ => None,
        }
    }
}
