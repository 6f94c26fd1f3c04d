//! In-process series cache
//!
//! LRU cache of bucket rows with:
//! - TTL-based expiration for freshness
//! - Entry-count limit with least-recently-used eviction
//! - Reverse index series -> keys for invalidation on insert

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use super::{CacheKey, CacheStats, CacheStatsSnapshot, SeriesCache};
use crate::aggregation::BucketRow;
use crate::error::CacheError;
use crate::types::Timestamp;

// ============================================================================
// Cache Configuration
// ============================================================================

/// Configuration for the in-process cache
#[derive(Debug, Clone)]
pub struct MemoryCacheConfig {
    /// Maximum number of cached entries (default: 10,000)
    pub max_entries: usize,

    /// Default TTL for cache entries (default: 300 seconds)
    pub default_ttl: Duration,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            default_ttl: Duration::from_secs(300),
        }
    }
}

impl MemoryCacheConfig {
    /// Set maximum entries
    pub fn with_max_entries(mut self, entries: usize) -> Self {
        self.max_entries = entries.max(1);
        self
    }

    /// Set default TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
}

// ============================================================================
// Cache Entry
// ============================================================================

struct CacheEntry {
    rows: Vec<BucketRow>,
    created_at: Instant,
    ttl: Duration,
    last_accessed: Instant,
}

impl CacheEntry {
    fn new(rows: Vec<BucketRow>, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            rows,
            created_at: now,
            ttl,
            last_accessed: now,
        }
    }

    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, CacheEntry>,
    // series -> keys cached for it
    series_index: HashMap<String, HashSet<CacheKey>>,
}

impl Inner {
    fn remove(&mut self, key: &CacheKey) -> bool {
        if self.entries.remove(key).is_none() {
            return false;
        }
        if let Some(keys) = self.series_index.get_mut(&key.series) {
            keys.remove(key);
            if keys.is_empty() {
                self.series_index.remove(&key.series);
            }
        }
        true
    }

    fn lru_key(&self) -> Option<CacheKey> {
        self.entries
            .iter()
            .min_by_key(|(_, e)| e.last_accessed)
            .map(|(k, _)| k.clone())
    }
}

// ============================================================================
// Memory Series Cache
// ============================================================================

/// LRU cache for bucket rows with series-based invalidation
pub struct MemorySeriesCache {
    config: MemoryCacheConfig,
    inner: RwLock<Inner>,
    stats: CacheStats,
}

impl MemorySeriesCache {
    /// Create a cache with the given limits
    pub fn new(config: MemoryCacheConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner::default()),
            stats: CacheStats::default(),
        }
    }

    /// Number of entries currently held, expired ones included
    pub fn entry_count(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.series_index.clear();
    }

    fn invalidate_matching<F>(&self, series: &str, matches: F) -> u64
    where
        F: Fn(&CacheKey) -> bool,
    {
        let mut inner = self.inner.write();
        let keys: Vec<CacheKey> = inner
            .series_index
            .get(series)
            .map(|keys| keys.iter().filter(|k| matches(k)).cloned().collect())
            .unwrap_or_default();

        let mut removed = 0;
        for key in &keys {
            if inner.remove(key) {
                removed += 1;
            }
        }
        self.stats.invalidated(removed);
        removed
    }
}

impl Default for MemorySeriesCache {
    fn default() -> Self {
        Self::new(MemoryCacheConfig::default())
    }
}

#[async_trait]
impl SeriesCache for MemorySeriesCache {
    fn backend_id(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<BucketRow>>, CacheError> {
        let mut inner = self.inner.write();

        let expired = match inner.entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.last_accessed = Instant::now();
                self.stats.hit();
                return Ok(Some(entry.rows.clone()));
            },
            Some(_) => true,
            None => false,
        };

        if expired {
            inner.remove(key);
        }
        self.stats.miss();
        Ok(None)
    }

    async fn put(
        &self,
        key: &CacheKey,
        rows: &[BucketRow],
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let mut inner = self.inner.write();

        if !inner.entries.contains_key(key) {
            while inner.entries.len() >= self.config.max_entries {
                let Some(lru) = inner.lru_key() else {
                    break;
                };
                inner.remove(&lru);
                self.stats.evicted();
            }
        }

        inner
            .series_index
            .entry(key.series.clone())
            .or_default()
            .insert(key.clone());
        inner
            .entries
            .insert(key.clone(), CacheEntry::new(rows.to_vec(), ttl));
        Ok(())
    }

    async fn invalidate_series(&self, series: &str) -> Result<u64, CacheError> {
        Ok(self.invalidate_matching(series, |_| true))
    }

    async fn invalidate_range(&self, series: &str, timestamp: Timestamp) -> Result<u64, CacheError> {
        Ok(self.invalidate_matching(series, |key| key.covers(timestamp)))
    }

    fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot(self.entry_count() as u64)
    }
}
