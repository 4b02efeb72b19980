//! In-memory caching for read responses.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use url::Url;

use crate::core::config::CacheConfig;

#[derive(Debug, Clone)]
pub(crate) struct CachedResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug)]
struct CacheEntry {
    response: CachedResponse,
    expires_at: Instant,
}

/// TTL cache bounded by entry count, safe for concurrent readers and writers.
#[derive(Debug)]
pub(crate) struct CacheStore {
    map: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
    capacity: usize,
}

impl CacheStore {
    pub(crate) fn new(cfg: &CacheConfig) -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            default_ttl: cfg.ttl,
            capacity: cfg.capacity.max(1),
        }
    }

    /// Key is the URL without query plus the query pairs sorted by name then value,
    /// form-encoded so a value holding `&` or `=` cannot pass for two pairs.
    pub(crate) fn key(url: &Url, params: &[(String, String)]) -> String {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .chain(params.iter().cloned())
            .collect();
        pairs.sort();

        let mut base = url.clone();
        base.set_query(None);
        base.set_fragment(None);
        let mut key = base.as_str().trim_end_matches('/').to_string();
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&pairs)
            .finish();
        if !query.is_empty() {
            key.push('?');
            key.push_str(&query);
        }
        key
    }

    pub(crate) async fn get(&self, key: &str) -> Option<CachedResponse> {
        let guard = self.map.read().await;
        guard
            .get(key)
            .filter(|entry| Instant::now() <= entry.expires_at)
            .map(|entry| entry.response.clone())
    }

    pub(crate) async fn put(&self, key: String, response: CachedResponse) {
        let now = Instant::now();
        let expires_at = now + self.default_ttl;
        let mut guard = self.map.write().await;

        if !guard.contains_key(&key) && guard.len() >= self.capacity {
            guard.retain(|_, entry| entry.expires_at > now);
            if guard.len() >= self.capacity
                && let Some(victim) = guard
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires_at)
                    .map(|(k, _)| k.clone())
            {
                guard.remove(&victim);
            }
        }
        guard.insert(
            key,
            CacheEntry {
                response,
                expires_at,
            },
        );
    }

    pub(crate) async fn clear(&self) {
        self.map.write().await.clear();
    }

    pub(crate) async fn len(&self) -> usize {
        self.map.read().await.len()
    }
}
