//! Turning raw `reqwest` outcomes into classified `ApiError`s.

use std::time::Duration;

use crate::core::ApiError;
use crate::core::client::RetryConfig;
use crate::core::client::constants::BODY_SNIPPET_LEN;

/// Read the response body as text; a broken stream is a connectivity failure.
pub(crate) async fn get_text(
    resp: reqwest::Response,
    endpoint: &str,
    url: &str,
) -> Result<String, ApiError> {
    resp.text()
        .await
        .map_err(|e| transport_error(endpoint, url, e))
}

/// Leading part of a body, cut on a char boundary.
pub(crate) fn snippet(body: &str) -> String {
    match body.char_indices().nth(BODY_SNIPPET_LEN) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Errors raised before any status is known.
pub(crate) fn transport_error(endpoint: &str, url: &str, e: reqwest::Error) -> ApiError {
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() || e.is_decode() {
        ApiError::Connectivity {
            endpoint: endpoint.to_string(),
            url: url.to_string(),
            source: e,
        }
    } else {
        ApiError::Http(e)
    }
}

/// Classify a non-2xx status: 5xx is a server error, configured statuses are
/// rate limiting, everything else is a client error.
pub(crate) fn status_error(
    endpoint: &str,
    url: &str,
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
    retry: &RetryConfig,
) -> ApiError {
    let endpoint = endpoint.to_string();
    let url = url.to_string();
    let body = snippet(body);
    match status {
        500..=599 => ApiError::Server {
            endpoint,
            status,
            url,
            body,
        },
        s if s == 429 || retry.should_retry_status(s) => ApiError::RateLimited {
            endpoint,
            status,
            url,
            retry_after,
            body,
        },
        _ => ApiError::Client {
            endpoint,
            status,
            url,
            body,
        },
    }
}
