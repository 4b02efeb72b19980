//! Core components of the `bioingest` engine.
//!
//! This module contains the transport and its resilience layers:
//! - The [`ApiClient`] and its builder, with the response cache and retry loop.
//! - The [`RateLimiter`] and [`CircuitBreaker`] guarding every endpoint.
//! - The primary [`ApiError`] type and its [`ErrorKind`] tag set.
//! - [`EndpointConfig`] and the [`EndpointRegistry`] shared across consumers.

/// The transport client (`ApiClient`), builder, request envelope and retry budget.
pub mod client;
/// Per-endpoint circuit breaker.
pub mod circuit;
/// Immutable endpoint configuration.
pub mod config;
/// The primary error type (`ApiError`) for the crate.
pub mod error;
pub(crate) mod net;
/// Token-bucket rate limiter.
pub mod rate_limit;
/// Name-keyed registry of endpoint clients.
pub mod registry;

// convenient re-exports so most code can just `use crate::core::ApiClient`
pub use circuit::{CircuitBreaker, CircuitState};
pub use client::{ApiClient, ApiClientBuilder, ApiRequest, Backoff, CacheMode, RawResponse, RetryConfig};
pub use config::{
    CacheConfig, CircuitConfig, EndpointConfig, EndpointConfigBuilder, PaginationConfig,
    RateLimitConfig, Timeouts,
};
pub use error::{ApiError, ErrorKind};
pub use rate_limit::RateLimiter;
pub use registry::EndpointRegistry;
