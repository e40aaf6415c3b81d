//! Key-value cache store shared by the metadata and JWKS caches
//!
//! The trust chain only needs four operations from its cache: read, write with
//! a TTL, write without expiry, and forget. [`CacheStore`] captures exactly that
//! so the backing store can be swapped (in-memory, Redis, ...) without touching
//! the verifier. Values are stored as JSON documents.
//!
//! [`remember`] and [`remember_forever`] layer get-or-compute on top. They take
//! no lock around the compute step: two requests racing on a cold key both
//! fetch, and the last write wins.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use telemetry_metrics::{counter, gauge};
use tracing::{debug, warn};

/// Cache backend used by the trust chain.
///
/// Implementations must be `Send + Sync` because the store is shared across
/// concurrently running requests.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Return the value under `key` if present and not expired.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key`, expiring after `ttl`.
    async fn put(&self, key: &str, value: Value, ttl: Duration);

    /// Store `value` under `key` with no expiry.
    async fn put_forever(&self, key: &str, value: Value);

    /// Remove `key`. Returns `true` if an entry was removed.
    async fn forget(&self, key: &str) -> bool;
}

/// Get-or-compute with a TTL.
///
/// On a hit the cached document is deserialized into `T`. On a miss (or when
/// the cached document no longer deserializes) `compute` runs, and a successful
/// result is stored for `ttl`. Errors from `compute` are returned as-is and
/// nothing is cached.
pub async fn remember<T, E, F, Fut>(
    cache: &dyn CacheStore,
    key: &str,
    ttl: Duration,
    compute: F,
) -> Result<T, E>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    remember_inner(cache, key, Some(ttl), compute).await
}

/// Get-or-compute with no expiry. See [`remember`].
pub async fn remember_forever<T, E, F, Fut>(
    cache: &dyn CacheStore,
    key: &str,
    compute: F,
) -> Result<T, E>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    remember_inner(cache, key, None, compute).await
}

async fn remember_inner<T, E, F, Fut>(
    cache: &dyn CacheStore,
    key: &str,
    ttl: Option<Duration>,
    compute: F,
) -> Result<T, E>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if let Some(cached) = cache.get(key).await {
        match serde_json::from_value::<T>(cached) {
            Ok(value) => {
                debug!(key = %key, "Cache hit");
                return Ok(value);
            }
            Err(e) => warn!(key = %key, error = %e, "Discarding undecodable cache entry"),
        }
    }

    debug!(key = %key, "Cache miss");
    let value = compute().await?;

    match serde_json::to_value(&value) {
        Ok(doc) => match ttl {
            Some(ttl) => cache.put(key, doc, ttl).await,
            None => cache.put_forever(key, doc).await,
        },
        Err(e) => warn!(key = %key, error = %e, "Value not cacheable, skipping store"),
    }

    Ok(value)
}

/// Thread-safe in-memory cache store with optional per-entry TTL
pub struct InMemoryCache {
    /// Cache entries keyed by cache key
    entries: DashMap<String, CachedEntry>,
    /// Cache statistics
    stats: CacheStats,
}

/// A cached document with TTL metadata
struct CachedEntry {
    /// The cached JSON value
    value: Value,
    /// When this entry was cached
    cached_at: Instant,
    /// Time-to-live; `None` never expires
    ttl: Option<Duration>,
}

impl CachedEntry {
    /// Check if this entry has expired
    fn is_expired(&self) -> bool {
        self.ttl
            .is_some_and(|ttl| Instant::now().duration_since(self.cached_at) > ttl)
    }
}

/// Cache statistics tracked atomically
#[derive(Debug)]
pub struct CacheStats {
    /// Total cache hits (entries served from cache)
    pub hits: AtomicU64,
    /// Total cache misses (entries not found or expired)
    pub misses: AtomicU64,
    /// Total evictions (expired or forgotten entries removed)
    pub evictions: AtomicU64,
}

impl CacheStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Get current cache hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get current cache miss count
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get current eviction count
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

impl InMemoryCache {
    /// Create a new empty cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            stats: CacheStats::new(),
        }
    }

    fn insert(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let entry = CachedEntry {
            value,
            cached_at: Instant::now(),
            ttl,
        };
        self.entries.insert(key.to_string(), entry);
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits(),
            misses: self.stats.misses(),
            evictions: self.stats.evictions(),
            size: self.entries.len(),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let Some(entry) = self.entries.get(key) else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if entry.is_expired() {
            // Release the shard read guard before taking the write lock
            drop(entry);
            self.entries.remove(key);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            None
        } else {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            Some(entry.value.clone())
        }
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) {
        self.insert(key, value, Some(ttl));
    }

    async fn put_forever(&self, key: &str, value: Value) {
        self.insert(key, value, None);
    }

    async fn forget(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStatsSnapshot {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses
    pub misses: u64,
    /// Total evictions
    pub evictions: u64,
    /// Current number of entries
    pub size: usize,
}

impl CacheStatsSnapshot {
    /// Publish this snapshot through the metrics facade.
    pub fn record(&self) {
        counter!("oidc_guard_cache_hits_total").absolute(self.hits);
        counter!("oidc_guard_cache_misses_total").absolute(self.misses);
        counter!("oidc_guard_cache_evictions_total").absolute(self.evictions);
        #[allow(clippy::cast_precision_loss)]
        let size = self.size as f64;
        gauge!("oidc_guard_cache_entries").set(size);
    }
}
