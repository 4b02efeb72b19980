use std::sync::Arc;

use serde_json::Value;

use crate::core::client::constants::{RELEASE_FIELDS, VERSION_FIELDS};
use crate::core::{ApiClient, ApiError, ApiRequest, CacheMode};

/// Result of the one-time status call made before bulk traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct Handshake {
    /// Status path the result was obtained from.
    pub path: String,
    pub release: Option<String>,
    pub version: Option<String>,
    pub raw: Value,
}

impl Handshake {
    fn from_body(path: &str, raw: Value) -> Self {
        Self {
            path: path.to_string(),
            release: first_field(&raw, RELEASE_FIELDS),
            version: first_field(&raw, VERSION_FIELDS),
            raw,
        }
    }
}

fn first_field(body: &Value, candidates: &[&str]) -> Option<String> {
    candidates.iter().find_map(|k| match body.get(*k)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

impl ApiClient {
    /// Validate reachability through `path` and capture release metadata.
    ///
    /// The first successful result per distinct path is kept for the client's
    /// lifetime; failures are not memoised. Concurrent first callers of one path share
    /// one call, while different paths proceed independently.
    ///
    /// # Errors
    ///
    /// Whatever the status call returns.
    pub async fn handshake(&self, path: &str) -> Result<Arc<Handshake>, ApiError> {
        let cell = self.handshake_cell(path);
        let hs = cell
            .get_or_try_init(|| async {
                let body = self
                    .call_json(ApiRequest::get(path).cache_mode(CacheMode::Bypass))
                    .await?;
                let hs = Arc::new(Handshake::from_body(path, body));
                tracing::info!(
                    event = "handshake",
                    endpoint = %self.name(),
                    path,
                    release = hs.release.as_deref(),
                    version = hs.version.as_deref(),
                    "status handshake succeeded"
                );
                Ok::<_, ApiError>(hs)
            })
            .await?;
        Ok(Arc::clone(hs))
    }
}
