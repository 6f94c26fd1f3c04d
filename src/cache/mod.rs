//! Series result caching
//!
//! A [`SeriesCache`] maps a [`CacheKey`] (series, plan start, plan end, bucket
//! width) to the full list of [`BucketRow`]s computed for that plan.
//!
//! # Backends
//!
//! | Backend | Type | Notes |
//! |---------|------|-------|
//! | `none` | [`NullSeriesCache`] | always misses, every query recomputes |
//! | `memory` | [`MemorySeriesCache`] | process-local LRU with TTL |
//! | `redis` | [`RedisSeriesCache`] | shared across processes |
//!
//! Backends never decide correctness. The engine treats every
//! [`CacheError`] as a miss (on read) or a skipped write (on put) and keeps
//! answering queries from the sample source.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::aggregation::BucketRow;
use crate::error::CacheError;
use crate::query::planner::BucketPlan;
use crate::types::Timestamp;

pub mod memory;
pub mod null;
pub mod redis;

pub use self::memory::{MemoryCacheConfig, MemorySeriesCache};
pub use self::null::NullSeriesCache;
pub use self::redis::RedisSeriesCache;

/// Identity of one cacheable aggregation result
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Series name
    pub series: String,
    /// Plan start (ms)
    pub start: Timestamp,
    /// Plan end (ms), inclusive
    pub end: Timestamp,
    /// Bucket width (ms)
    pub width: i64,
}

impl CacheKey {
    /// Key for `plan` over `series`
    pub fn new(series: impl Into<String>, plan: &BucketPlan) -> Self {
        Self {
            series: series.into(),
            start: plan.start,
            end: plan.end,
            width: plan.width,
        }
    }

    /// Whether an insert at `timestamp` lands inside this entry's range
    pub fn covers(&self, timestamp: Timestamp) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}..={}/{}ms]",
            self.series, self.start, self.end, self.width
        )
    }
}

/// Key/value store for bucket rows
///
/// Implementations must be safe to share across tasks. `invalidate_*` must
/// not return before the affected entries are unreadable.
#[async_trait]
pub trait SeriesCache: Send + Sync + 'static {
    /// Short backend name for logs
    fn backend_id(&self) -> &str;

    /// Look up the rows for `key`
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<BucketRow>>, CacheError>;

    /// Store the rows for `key`, `ttl` overrides the backend default
    async fn put(
        &self,
        key: &CacheKey,
        rows: &[BucketRow],
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    /// Drop every entry of `series`, returns the number removed
    async fn invalidate_series(&self, series: &str) -> Result<u64, CacheError>;

    /// Drop the entries of `series` whose range contains `timestamp`
    ///
    /// Backends without a range index fall back to dropping the whole series.
    async fn invalidate_range(&self, series: &str, timestamp: Timestamp) -> Result<u64, CacheError> {
        let _ = timestamp;
        self.invalidate_series(series).await
    }

    /// Current counters
    fn stats(&self) -> CacheStatsSnapshot;
}

/// Counters kept by cache backends
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Lookups that returned rows
    pub hits: AtomicU64,
    /// Lookups that returned nothing
    pub misses: AtomicU64,
    /// Entries dropped to respect the size limit
    pub evictions: AtomicU64,
    /// Entries dropped by invalidation
    pub invalidations: AtomicU64,
}

impl CacheStats {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn evicted(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn invalidated(&self, n: u64) {
        self.invalidations.fetch_add(n, Ordering::Relaxed);
    }

    /// Copy the counters
    pub fn snapshot(&self, entries: u64) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CacheStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    /// Entries currently held (0 when the backend cannot tell)
    pub entries: u64,
    /// Total hits
    pub hits: u64,
    /// Total misses
    pub misses: u64,
    /// Total evictions
    pub evictions: u64,
    /// Total invalidated entries
    pub invalidations: u64,
}

impl CacheStatsSnapshot {
    /// Hit ratio in `[0, 1]`
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
