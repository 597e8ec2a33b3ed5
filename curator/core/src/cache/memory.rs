//! In-process cache backed by a concurrent map
//!
//! Expiry is lazy: an expired entry is removed when it is next read, when
//! room is needed for a new key, or on an explicit [`MemoryCache::purge_expired`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use super::{CacheError, CacheKey, ResultCache};
use crate::agents::Payload;

/// Default time-to-live for cached results
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Default entry cap
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Longest lifetime an entry gets, whatever TTL was asked for
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(30 * 365 * 24 * 3600);

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Payload,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Live entries served
    pub hits: u64,
    /// Lookups that found nothing live
    pub misses: u64,
    /// Entries dropped to make room
    pub evictions: u64,
    /// Entries currently stored (expired ones included until removed)
    pub entries: usize,
}

/// Bounded in-memory [`ResultCache`]
#[derive(Debug)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryCache {
    /// Create a cache holding at most `max_entries` keys (minimum 1)
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the counters
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    fn lookup(&self, key: &str) -> Option<Payload> {
        let now = Instant::now();
        let live = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => None,
            None => return None,
        };

        // The read guard is released above; removing under it would deadlock the shard
        if live.is_none() {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        live
    }

    fn make_room(&self, incoming: &str) {
        if self.entries.contains_key(incoming) || self.entries.len() < self.max_entries {
            return;
        }
        if self.purge_expired() > 0 && self.entries.len() < self.max_entries {
            return;
        }

        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().expires_at)
            .map(|entry| entry.key().clone());

        if let Some(victim) = victim {
            if self.entries.remove(&victim).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %victim, "Evicted cache entry to make room");
            }
        }
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Payload>, CacheError> {
        let found = self.lookup(key.as_str());
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    async fn set(&self, key: &CacheKey, value: Payload, ttl: Duration) -> Result<(), CacheError> {
        self.make_room(key.as_str());
        let now = Instant::now();
        // An unrepresentable deadline stores the entry as already expired
        let expires_at = now.checked_add(ttl.min(MAX_CACHE_TTL)).unwrap_or(now);
        self.entries
            .insert(key.as_str().to_string(), CacheEntry { value, expires_at });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentType;
    use serde_json::json;

    fn key(n: u64) -> CacheKey {
        let input = json!({ "n": n }).as_object().cloned().unwrap();
        CacheKey::derive(AgentType::AnalyticsProcessor, &input, None)
    }

    fn value(label: &str) -> Payload {
        json!({ "label": label }).as_object().cloned().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_set() {
        let cache = MemoryCache::default();
        cache.set(&key(1), value("one"), Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.get(&key(1)).await.unwrap(), Some(value("one")));
        assert_eq!(cache.get(&key(2)).await.unwrap(), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_reads_as_absent() {
        let cache = MemoryCache::default();
        cache.set(&key(1), value("one"), Duration::from_secs(10)).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(cache.get(&key(1)).await.unwrap(), None);
        // Lazy removal happened on read
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_refreshes_value_and_expiry() {
        let cache = MemoryCache::default();
        cache.set(&key(1), value("old"), Duration::from_secs(10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set(&key(1), value("new"), Duration::from_secs(10)).await.unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(cache.get(&key(1)).await.unwrap(), Some(value("new")));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_ttl_is_capped_not_overflowed() {
        let cache = MemoryCache::default();
        cache.set(&key(1), value("forever"), Duration::MAX).await.unwrap();
        cache
            .set(&key(2), value("long"), Duration::from_secs(u64::MAX / 2))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(365 * 24 * 3600)).await;

        assert_eq!(cache.get(&key(1)).await.unwrap(), Some(value("forever")));
        assert_eq!(cache.get(&key(2)).await.unwrap(), Some(value("long")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = MemoryCache::default();
        cache.set(&key(1), value("short"), Duration::from_secs(1)).await.unwrap();
        cache.set(&key(2), value("long"), Duration::from_secs(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_soonest_expiry() {
        let cache = MemoryCache::new(2);
        cache.set(&key(1), value("a"), Duration::from_secs(5)).await.unwrap();
        cache.set(&key(2), value("b"), Duration::from_secs(50)).await.unwrap();
        cache.set(&key(3), value("c"), Duration::from_secs(50)).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key(1)).await.unwrap(), None);
        assert!(cache.get(&key(2)).await.unwrap().is_some());
        assert!(cache.get(&key(3)).await.unwrap().is_some());
        assert_eq!(cache.stats().evictions, 1);
    }
}
