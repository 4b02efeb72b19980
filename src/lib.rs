//! bioingest: resilient ingestion of paginated scientific-data HTTP APIs.
//!
//! One [`ApiClient`] per remote service combines a token-bucket rate limiter,
//! a circuit breaker, a retry policy with backoff and an optional response
//! cache. On top of it sit the cursor [pagination](paginate) engine and the
//! identifier-driven [batch](batch) fetcher.
//!
//! ```no_run
//! use bioingest::{ApiClient, EndpointConfig, ItemsKey, PaginationRequest};
//! use futures::TryStreamExt;
//!
//! # async fn run() -> Result<(), bioingest::ApiError> {
//! let cfg = EndpointConfig::builder("chembl", "https://www.ebi.ac.uk/chembl/api/data/")
//!     .rate_limit(5, std::time::Duration::from_secs(1))
//!     .build()?;
//! let client = ApiClient::new(cfg)?;
//!
//! let req = PaginationRequest::new("activity.json", ItemsKey::named("activities"))
//!     .param("target_chembl_id", "CHEMBL240")
//!     .page_size(500);
//! let mut items = client.paginate(req);
//! futures::pin_mut!(items);
//! while let Some(record) = items.try_next().await? {
//!     println!("{}", record["activity_id"]);
//! }
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod batch;
pub mod core;
#[cfg(feature = "tracing-subscriber")]
pub mod logging;
pub mod paginate;

pub use audit::{AuditBegin, AuditEvent, AuditSink, AuditStatus, MemoryAuditSink, PageSnapshot};
pub use batch::{DedupPriority, DedupRule, EntityFetcher, EntityFetcherBuilder};
pub use crate::core::{
    ApiClient, ApiClientBuilder, ApiError, ApiRequest, Backoff, CacheConfig, CacheMode,
    CircuitBreaker, CircuitConfig, CircuitState, EndpointConfig, EndpointConfigBuilder,
    EndpointRegistry, ErrorKind, PaginationConfig, RateLimitConfig, RateLimiter, RawResponse,
    RetryConfig, Timeouts,
};
pub use paginate::{Handshake, ItemsKey, Page, PaginationRequest, Record};
