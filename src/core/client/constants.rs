//! Centralized constants for defaults and the UA.

use std::time::Duration;

/// Identifies this crate to remote services.
pub(crate) const USER_AGENT: &str = concat!(
    "bioingest-rs/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/bioingest/bioingest-rs)"
);

pub(crate) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);
pub(crate) const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Rate-limit waits longer than this surface as warnings (starvation).
pub(crate) const DEFAULT_WAIT_WARNING: Duration = Duration::from_secs(1);

/// Upper bound applied to server `Retry-After` hints.
pub(crate) const DEFAULT_MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

/// Characters of an error body kept on `ApiError`.
pub(crate) const BODY_SNIPPET_LEN: usize = 512;

/// ChEMBL-style list envelope: `{"page_meta": {"next": ...}, "<items>": [...]}`.
pub(crate) const DEFAULT_META_KEY: &str = "page_meta";
pub(crate) const DEFAULT_NEXT_KEY: &str = "next";
pub(crate) const DEFAULT_LIMIT_PARAM: &str = "limit";
pub(crate) const DEFAULT_PAGE_SIZE: u32 = 1000;
pub(crate) const MAX_PAGE_SIZE: u32 = 1000;

/// Status fields read (in order) for release and version metadata.
pub(crate) const RELEASE_FIELDS: &[&str] = &["release", "chembl_release", "chembl_db_version"];
pub(crate) const VERSION_FIELDS: &[&str] = &["version", "api_version", "chembl_db_version"];
