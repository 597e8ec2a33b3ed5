//! Result Cache
//!
//! Content-addressed store for completed agent results. Identical logical
//! requests (same agent type, input and context) map to the same
//! [`CacheKey`], so repeated work is served without a routing call.
//!
//! # Failure Policy
//!
//! The cache is fail-open: workers treat any [`CacheError`] as a miss on
//! read and ignore it on write. A cache outage costs latency, never a
//! request.

mod key;
mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::agents::Payload;

pub use key::CacheKey;
pub use memory::{CacheStats, MemoryCache, DEFAULT_CACHE_TTL, DEFAULT_MAX_ENTRIES, MAX_CACHE_TTL};

/// Errors raised by a cache backend
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Backend could not be reached
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// Stored value could not be decoded
    #[error("cache entry corrupt: {0}")]
    Corrupt(String),
}

/// Storage contract for cached results
///
/// Expired entries must read as absent. No sweep guarantee is implied.
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Look up a live entry
    async fn get(&self, key: &CacheKey) -> Result<Option<Payload>, CacheError>;

    /// Store a value for `ttl`, replacing any previous entry under `key`
    async fn set(&self, key: &CacheKey, value: Payload, ttl: Duration) -> Result<(), CacheError>;
}
