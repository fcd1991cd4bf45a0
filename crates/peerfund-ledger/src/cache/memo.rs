//! In-memory memoized value cache
//!
//! Fetch-or-compute store keyed by string with an optional TTL per entry.
//! Values are kept as JSON so one cache can hold every kind of derived value
//! the engine produces.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use peerfund_common::{PeerfundError, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, instrument};

/// Cached value with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedEntry {
    value: serde_json::Value,
    cached_at: i64,
    /// `None` keeps the entry until it is invalidated
    expires_at: Option<i64>,
}

impl CachedEntry {
    fn new(value: serde_json::Value, ttl: Option<Duration>) -> Self {
        let now = now_ms();
        Self {
            value,
            cached_at: now,
            expires_at: ttl.map(|ttl| {
                now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
            }),
        }
    }

    fn is_live(&self, now: i64) -> bool {
        self.expires_at.map_or(true, |expires_at| now < expires_at)
    }
}

/// Process-wide memoization store backed by DashMap
///
/// Each key is independent; a lookup, computation and insert for one key
/// happen atomically with respect to other callers of [`MemoCache::fetch`]
/// on that key.
pub struct MemoCache {
    entries: DashMap<String, CachedEntry>,
    max_entries: usize,
}

impl MemoCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Return the live value for `key`, computing and storing it otherwise
    ///
    /// A failing `compute` stores nothing and its error is returned as-is.
    /// `compute` runs while the key's shard is held and must not call back
    /// into this cache.
    #[instrument(skip(self, compute))]
    pub fn fetch<V, F>(&self, key: &str, ttl: Option<Duration>, compute: F) -> Result<V>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<V>,
    {
        if let Some(value) = self.get(key)? {
            return Ok(value);
        }

        self.make_room();
        let now = now_ms();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                // Another caller filled the key between the lookup and here
                if occupied.get().is_live(now) {
                    return decode(&occupied.get().value);
                }
                let value = compute()?;
                occupied.insert(CachedEntry::new(encode(&value)?, ttl));
                debug!(key, "Recomputed expired entry");
                Ok(value)
            }
            Entry::Vacant(vacant) => {
                let value = compute()?;
                vacant.insert(CachedEntry::new(encode(&value)?, ttl));
                debug!(key, "Cached computed value");
                Ok(value)
            }
        }
    }

    /// Async variant of [`MemoCache::fetch`]
    ///
    /// The future runs without holding any shard; when two callers race on a
    /// missing key the first insert wins and both return that value.
    pub async fn fetch_async<V, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<V>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(value) = self.get(key)? {
            return Ok(value);
        }

        let value = compute().await?;
        let encoded = encode(&value)?;

        self.make_room();
        let now = now_ms();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    return decode(&occupied.get().value);
                }
                occupied.insert(CachedEntry::new(encoded, ttl));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CachedEntry::new(encoded, ttl));
            }
        }
        debug!(key, "Cached computed value");
        Ok(value)
    }

    /// Live value for `key`, if any
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>> {
        let now = now_ms();
        match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => {
                debug!(key, "Cache hit");
                decode(&entry.value).map(Some)
            }
            Some(_) => {
                debug!(key, "Cache expired");
                Ok(None)
            }
            None => {
                debug!(key, "Cache miss");
                Ok(None)
            }
        }
    }

    /// Drop one key
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every key containing `fragment`, returning how many were removed
    #[instrument(skip(self))]
    pub fn invalidate_matching(&self, fragment: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.contains(fragment));
        let removed = before.saturating_sub(self.entries.len());
        debug!(removed, "Invalidated cache entries");
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let now = now_ms();
        let expired = self.entries.iter().filter(|e| !e.is_live(now)).count();
        CacheStats {
            entry_count: self.entries.len() as u64,
            expired_count: expired as u64,
        }
    }

    /// Evict expired entries, then an arbitrary one, when at capacity
    fn make_room(&self) {
        if self.entries.len() < self.max_entries {
            return;
        }

        let now = now_ms();
        self.entries.retain(|_, entry| entry.is_live(now));

        if self.entries.len() >= self.max_entries {
            let victim = self.entries.iter().next().map(|e| e.key().clone());
            if let Some(key) = victim {
                self.entries.remove(&key);
            }
        }
    }
}

impl Default for MemoCache {
    fn default() -> Self {
        Self::new(peerfund_common::DEFAULT_CACHE_MAX_ENTRIES)
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached entries
    pub entry_count: u64,
    /// Entries past their TTL but not yet swept
    pub expired_count: u64,
}

fn encode<V: Serialize>(value: &V) -> Result<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| PeerfundError::Serialization(format!("Failed to encode cached value: {}", e)))
}

fn decode<V: DeserializeOwned>(value: &serde_json::Value) -> Result<V> {
    V::deserialize(value)
        .map_err(|e| PeerfundError::Serialization(format!("Failed to decode cached value: {}", e)))
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_fetch_computes_once() {
        let cache = MemoCache::new(100);
        let calls = Cell::new(0);

        let first: u32 = cache
            .fetch("remaining-1", None, || {
                calls.set(calls.get() + 1);
                Ok(42)
            })
            .unwrap();
        let second: u32 = cache
            .fetch("remaining-1", None, || {
                calls.set(calls.get() + 1);
                Ok(7)
            })
            .unwrap();

        assert_eq!(first, 42);
        assert_eq!(second, 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_failed_compute_is_not_cached() {
        let cache = MemoCache::new(100);

        let result: Result<u32> = cache.fetch("percent-1", None, || {
            Err(PeerfundError::division_by_zero("progress_percentage"))
        });
        assert!(matches!(result, Err(PeerfundError::DivisionByZero(_))));
        assert!(!cache.contains_key("percent-1"));

        let value: u32 = cache.fetch("percent-1", None, || Ok(50)).unwrap();
        assert_eq!(value, 50);
    }

    #[test]
    fn test_prefixes_do_not_collide() {
        let cache = MemoCache::new(100);
        let a: u32 = cache.fetch("remaining-1", None, || Ok(1)).unwrap();
        let b: u32 = cache.fetch("percent-1", None, || Ok(2)).unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_ttl_expiry_recomputes() {
        let cache = MemoCache::new(100);
        let ttl = Some(Duration::from_millis(30));

        let first: u32 = cache.fetch("contributors-1", ttl, || Ok(1)).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.stats().expired_count, 1);

        let second: u32 = cache.fetch("contributors-1", ttl, || Ok(2)).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn test_fetch_async() {
        let cache = MemoCache::new(100);

        let names: String = cache
            .fetch_async("contributors-9", None, || async {
                Ok::<_, PeerfundError>("Ada and Grace".to_string())
            })
            .await
            .unwrap();
        let again: String = cache
            .fetch_async("contributors-9", None, || async {
                Err::<String, _>(PeerfundError::Internal("should not run".into()))
            })
            .await
            .unwrap();

        assert_eq!(names, "Ada and Grace");
        assert_eq!(again, names);
    }

    #[test]
    fn test_invalidate_matching() {
        let cache = MemoCache::new(100);
        let _: u32 = cache.fetch("remaining-abc@v1", None, || Ok(1)).unwrap();
        let _: u32 = cache.fetch("percent-abc@v1", None, || Ok(1)).unwrap();
        let _: u32 = cache.fetch("percent-xyz@v1", None, || Ok(1)).unwrap();

        assert_eq!(cache.invalidate_matching("abc"), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key("percent-xyz@v1"));
    }

    #[test]
    fn test_eviction_at_capacity() {
        let cache = MemoCache::new(2);
        for i in 0..5u32 {
            let _: u32 = cache.fetch(&format!("key-{}", i), None, || Ok(i)).unwrap();
        }
        assert!(cache.len() <= 2);
    }

    #[test]
    fn test_huge_ttl_does_not_expire() {
        let cache = MemoCache::new(10);
        let ttl = Some(Duration::from_secs(u64::MAX));

        let _: u32 = cache.fetch("loan_contributors-1", ttl, || Ok(3)).unwrap();
        let cached: Option<u32> = cache.get("loan_contributors-1").unwrap();
        assert_eq!(cached, Some(3));
        assert_eq!(cache.stats().expired_count, 0);
    }

    #[test]
    fn test_type_mismatch_is_serialization_error() {
        let cache = MemoCache::new(10);
        let _: String = cache.fetch("owner-1", None, || Ok("Ada".to_string())).unwrap();

        let result: Result<u32> = cache.fetch("owner-1", None, || Ok(0));
        assert!(matches!(result, Err(PeerfundError::Serialization(_))));
    }
}
