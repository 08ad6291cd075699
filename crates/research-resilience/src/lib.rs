//! Resilience primitives shared by every research stage
//!
//! - [`RetryPolicy`]: bounded retries with deterministic exponential backoff
//! - [`RateLimiter`]: minimum spacing between calls to one external service
//! - [`FallbackChain`]: ordered strategies where empty results fall through
//! - [`ServiceFallback`]: prioritized services with health bookkeeping
//! - [`CacheStore`] / [`JsonFileCache`]: file-backed caches with per-entry TTL

pub mod cache;
pub mod error;
pub mod fallback;
pub mod rate_limit;
pub mod retry;

pub use cache::{CacheStore, JsonFileCache};
pub use error::{ResilienceError, Result};
pub use fallback::{FallbackChain, Presence, ServiceFallback, ServiceHealth};
pub use rate_limit::RateLimiter;
pub use retry::{RetryPolicy, Retryable};
