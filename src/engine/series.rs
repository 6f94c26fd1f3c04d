//! Series engine: planning, caching and aggregation of bucketed history
//!
//! # Read path
//!
//! ```text
//! history(query)
//!      │  validate, describe series, default from/to to first/last sample
//!      ▼
//! BucketPlanner ──► BucketPlan ──► CacheKey
//!      │
//!      ▼
//! cache.get ── hit ─────────────────────────────────┐
//!      │ miss                                       │
//!      ▼                                            │
//! per-key in-flight lock, re-probe ── hit ──────────┤
//!      │ miss                                       │
//!      ▼                                            │
//! read_range ─► BucketAggregator (all functions)    │
//!      │                                            │
//!      ▼                                            │
//! cache.put (only if no insert happened meanwhile)  │
//!      │                                            │
//!      ▼                                            ▼
//! select requested functions, cast to series format
//! ```
//!
//! # Write path
//!
//! `insert` writes through the sample source, then bumps the series
//! generation and invalidates the cache under the series write lock before
//! returning. A reader that starts after `insert` returns never sees rows
//! computed without that sample.
//!
//! If invalidation fails the series is marked stale; reads skip the cache
//! for that series until a retried invalidation succeeds.

use dashmap::DashMap;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::traits::SampleSource;
use crate::aggregation::{BucketAggregator, BucketRow, PushOutcome};
use crate::cache::{CacheKey, CacheStatsSnapshot, NullSeriesCache, SeriesCache};
use crate::error::{Error, Result, StoreError};
use crate::format::cast;
use crate::query::{BucketPlan, BucketPlanner, HistoryQuery, HistoryRow};
use crate::types::{now_millis, Sample, SeriesInfo, TimeRange, Timestamp};

// ============================================================================
// Invalidation Policy
// ============================================================================

/// Which cache entries an insert drops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationPolicy {
    /// Every entry of the series
    #[default]
    Series,
    /// Only entries whose range contains the inserted timestamp
    Range,
}

// ============================================================================
// Engine Statistics
// ============================================================================

/// Engine counters
#[derive(Debug, Default)]
pub struct EngineStats {
    queries: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    collapsed: AtomicU64,
    degraded: AtomicU64,
    inserts: AtomicU64,
    invalidations: AtomicU64,
}

impl EngineStats {
    fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the counters
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            queries: self.queries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            collapsed: self.collapsed.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`EngineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStatsSnapshot {
    /// `history` calls that reached planning
    pub queries: u64,
    /// Plans answered from the cache
    pub cache_hits: u64,
    /// Plans aggregated from the sample source
    pub cache_misses: u64,
    /// Misses answered by another caller's concurrent computation
    pub collapsed: u64,
    /// Cache operations that failed and were skipped
    pub degraded: u64,
    /// Samples inserted
    pub inserts: u64,
    /// Cache entries dropped by inserts and resets
    pub invalidations: u64,
}

// ============================================================================
// Series Engine
// ============================================================================

#[derive(Debug, Default)]
struct SeriesState {
    // bumped by every insert/reset
    generation: u64,
    // a failed invalidation left possibly stale entries behind
    stale: bool,
}

/// Bucketed history engine over a sample source and a cache
pub struct SeriesEngine {
    source: Arc<dyn SampleSource>,
    cache: Arc<dyn SeriesCache>,
    planner: BucketPlanner,
    invalidation: InvalidationPolicy,
    cache_ttl: Option<Duration>,
    series_state: DashMap<String, Arc<RwLock<SeriesState>>>,
    in_flight: DashMap<CacheKey, Arc<Mutex<()>>>,
    stats: EngineStats,
}

impl SeriesEngine {
    /// Engine with the default planner and series-wide invalidation
    pub fn new(source: Arc<dyn SampleSource>, cache: Arc<dyn SeriesCache>) -> Self {
        info!(
            source = source.source_id(),
            cache = cache.backend_id(),
            "Series engine created"
        );
        Self {
            source,
            cache,
            planner: BucketPlanner::default(),
            invalidation: InvalidationPolicy::default(),
            cache_ttl: None,
            series_state: DashMap::new(),
            in_flight: DashMap::new(),
            stats: EngineStats::default(),
        }
    }

    /// Engine that never caches
    pub fn uncached(source: Arc<dyn SampleSource>) -> Self {
        Self::new(source, Arc::new(NullSeriesCache::new()))
    }

    /// Replace the bucket planner
    pub fn with_planner(mut self, planner: BucketPlanner) -> Self {
        self.planner = planner;
        self
    }

    /// Set the invalidation policy
    pub fn with_invalidation(mut self, policy: InvalidationPolicy) -> Self {
        self.invalidation = policy;
        self
    }

    /// TTL passed to every cache put, `None` uses the backend default
    pub fn with_cache_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// The sample source
    pub fn source(&self) -> &Arc<dyn SampleSource> {
        &self.source
    }

    /// The cache backend
    pub fn cache(&self) -> &Arc<dyn SeriesCache> {
        &self.cache
    }

    /// The bucket planner
    pub fn planner(&self) -> &BucketPlanner {
        &self.planner
    }

    /// The invalidation policy
    pub fn invalidation(&self) -> InvalidationPolicy {
        self.invalidation
    }

    /// Engine counters
    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    /// Cache backend counters
    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.cache.stats()
    }

    // ------------------------------------------------------------------------
    // Public operations
    // ------------------------------------------------------------------------

    /// Bucketed history of one series
    ///
    /// Returns one row per bucket of the plan, in time order. A series with
    /// no samples and no explicit bounds yields an empty list.
    pub async fn history(&self, query: &HistoryQuery) -> Result<Vec<HistoryRow>> {
        query.validate()?;
        let info = self.describe(&query.series).await?;

        let from = match query.from {
            Some(ts) => Some(ts),
            None => self.source.first_timestamp(&query.series).await?,
        };
        let to = match query.to {
            Some(ts) => Some(ts),
            None => self.source.last_timestamp(&query.series).await?,
        };
        let (Some(from), Some(to)) = (from, to) else {
            debug!(series = %query.series, "history of empty series");
            return Ok(Vec::new());
        };
        if from > to {
            // only reachable when one bound was defaulted from the data
            debug!(series = %query.series, from, to, "requested range lies outside the data");
            return Ok(Vec::new());
        }

        let plan = self
            .planner
            .plan(from, to, query.num_buckets, query.bucket_size)?;
        EngineStats::incr(&self.stats.queries);

        let key = CacheKey::new(query.series.clone(), &plan);
        let rows = self.bucket_rows(&key, plan).await?;

        rows.iter()
            .map(|row| HistoryRow::from_bucket(row, &query.functions, info.format))
            .collect()
    }

    /// Store one sample and invalidate the cached history it affects
    ///
    /// `when` defaults to the current time. Invalidation has completed when
    /// this returns.
    pub async fn insert(&self, series: &str, value: f64, when: Option<Timestamp>) -> Result<()> {
        if !value.is_finite() {
            return Err(Error::invalid(format!(
                "cannot insert non-finite value {} into {}",
                value, series
            )));
        }
        let info = self.describe(series).await?;
        cast(value, info.format)?;

        let timestamp = when.unwrap_or_else(now_millis);
        self.source
            .insert_sample(series, Sample::new(timestamp, value))
            .await?;
        EngineStats::incr(&self.stats.inserts);

        self.invalidate(series, Some(timestamp)).await;
        Ok(())
    }

    /// Number of samples between the optional bounds (inclusive)
    pub async fn count(
        &self,
        series: &str,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
    ) -> Result<u64> {
        TimeRange::from_bounds(from, to)?;
        self.describe(series).await?;
        Ok(self.source.count(series, from, to).await?)
    }

    /// Raw samples between the optional bounds (inclusive), in time order
    pub async fn raw_history(
        &self,
        series: &str,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
    ) -> Result<Vec<Sample>> {
        let range = TimeRange::from_bounds(from, to)?;
        self.describe(series).await?;
        let samples: Vec<Sample> = self.source.read_range(series, range).try_collect().await?;
        Ok(samples)
    }

    /// Delete every sample of `series` and drop all of its cached history
    pub async fn reset(&self, series: &str) -> Result<u64> {
        self.describe(series).await?;
        let removed = self.source.delete_samples(series).await?;
        self.invalidate(series, None).await;
        info!(series, removed, "Series reset");
        Ok(removed)
    }

    /// Metadata of `series`
    pub async fn describe(&self, series: &str) -> Result<SeriesInfo> {
        self.source
            .describe(series)
            .await?
            .ok_or_else(|| Error::SeriesNotFound(series.to_string()))
    }

    // ------------------------------------------------------------------------
    // Cache orchestration
    // ------------------------------------------------------------------------

    fn state(&self, series: &str) -> Arc<RwLock<SeriesState>> {
        if let Some(state) = self.series_state.get(series) {
            return state.clone();
        }
        self.series_state
            .entry(series.to_string())
            .or_default()
            .clone()
    }

    /// Rows for `key`, from the cache or freshly aggregated
    async fn bucket_rows(&self, key: &CacheKey, plan: BucketPlan) -> Result<Vec<BucketRow>> {
        let state = self.state(&key.series);

        if let Some(rows) = self.probe(key, &plan, &state).await {
            EngineStats::incr(&self.stats.cache_hits);
            return Ok(rows);
        }

        // collapse concurrent misses on the same key
        let marker = self.in_flight.entry(key.clone()).or_default().clone();
        let _in_flight = InFlight {
            map: &self.in_flight,
            key,
            marker: &marker,
        };
        let _compute = marker.lock().await;

        if let Some(rows) = self.probe(key, &plan, &state).await {
            EngineStats::incr(&self.stats.collapsed);
            EngineStats::incr(&self.stats.cache_hits);
            return Ok(rows);
        }
        EngineStats::incr(&self.stats.cache_misses);

        let generation = state.read().await.generation;
        let rows = self.aggregate(&key.series, plan).await?;

        let guard = state.read().await;
        if guard.generation == generation && !guard.stale {
            if let Err(e) = self.cache.put(key, &rows, self.cache_ttl).await {
                warn!(key = %key, error = %e, "Cache put failed, result not cached");
                EngineStats::incr(&self.stats.degraded);
            }
        } else {
            debug!(key = %key, "Series changed during aggregation, result not cached");
        }
        drop(guard);

        Ok(rows)
    }

    /// Cache lookup that never fails the query
    async fn probe(
        &self,
        key: &CacheKey,
        plan: &BucketPlan,
        state: &RwLock<SeriesState>,
    ) -> Option<Vec<BucketRow>> {
        let guard = state.read().await;
        let guard = if guard.stale {
            drop(guard);
            let mut write = state.write().await;
            if write.stale {
                match self.cache.invalidate_series(&key.series).await {
                    Ok(n) => {
                        info!(series = %key.series, dropped = n, "Stale cache entries cleared");
                        write.stale = false;
                    },
                    Err(e) => {
                        warn!(series = %key.series, error = %e, "Cache still unavailable, bypassing");
                        EngineStats::incr(&self.stats.degraded);
                        return None;
                    },
                }
            }
            write.downgrade()
        } else {
            guard
        };

        let result = self.cache.get(key).await;
        drop(guard);

        match result {
            Ok(Some(rows)) if rows.len() == plan.bucket_count() => {
                debug!(key = %key, "Cache hit");
                Some(rows)
            },
            Ok(Some(rows)) => {
                warn!(
                    key = %key,
                    cached = rows.len(),
                    expected = plan.bucket_count(),
                    "Cached row count does not match plan, ignoring entry"
                );
                None
            },
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                None
            },
            Err(e) => {
                warn!(key = %key, error = %e, "Cache get failed, treating as miss");
                EngineStats::incr(&self.stats.degraded);
                None
            },
        }
    }

    /// Single pass over the source computing every function
    async fn aggregate(&self, series: &str, plan: BucketPlan) -> Result<Vec<BucketRow>> {
        let mut samples = self.source.read_range(series, plan.range());
        let mut aggregator = BucketAggregator::new(plan);

        while let Some(sample) = samples.try_next().await? {
            if let PushOutcome::OutOfOrder { previous } = aggregator.push(sample) {
                return Err(StoreError::OutOfOrder {
                    series: series.to_string(),
                    previous,
                    timestamp: sample.timestamp,
                }
                .into());
            }
        }

        Ok(aggregator.finish())
    }

    /// Bump the generation and drop affected entries
    async fn invalidate(&self, series: &str, timestamp: Option<Timestamp>) {
        let state = self.state(series);
        let mut guard = state.write().await;
        guard.generation += 1;

        let result = match (self.invalidation, timestamp) {
            (InvalidationPolicy::Range, Some(ts)) => self.cache.invalidate_range(series, ts).await,
            _ => self.cache.invalidate_series(series).await,
        };

        match result {
            Ok(n) => {
                self.stats.invalidations.fetch_add(n, Ordering::Relaxed);
                debug!(series, dropped = n, "Cache invalidated");
            },
            Err(e) => {
                warn!(series, error = %e, "Cache invalidation failed, bypassing cache for series");
                EngineStats::incr(&self.stats.degraded);
                guard.stale = true;
            },
        }
    }
}

/// Removes the in-flight marker once no other caller waits on it
struct InFlight<'a> {
    map: &'a DashMap<CacheKey, Arc<Mutex<()>>>,
    key: &'a CacheKey,
    marker: &'a Arc<Mutex<()>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        // map + this caller hold the only references
        self.map.remove_if(self.key, |_, m| {
            Arc::ptr_eq(m, self.marker) && Arc::strong_count(m) <= 2
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::AggregateFunction;
    use crate::cache::MemorySeriesCache;
    use crate::engine::memory::InMemorySampleSource;
    use crate::error::CacheError;
    use crate::format::SeriesValue;
    use crate::types::{ValueFormat, MILLIS_PER_SECOND as S};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;

    fn engine_with(format: ValueFormat) -> (Arc<InMemorySampleSource>, SeriesEngine) {
        let source = Arc::new(InMemorySampleSource::new());
        source
            .create_series(SeriesInfo::new("temp").with_format(format))
            .unwrap();
        let engine = SeriesEngine::new(source.clone(), Arc::new(MemorySeriesCache::default()));
        (source, engine)
    }

    #[tokio::test]
    async fn test_first_last_mean_single_bucket() {
        let (_, engine) = engine_with(ValueFormat::Float);
        for (minute, v) in [(0, 10.0), (1, 12.0), (2, 14.0)] {
            engine.insert("temp", v, Some(minute * 60 * S)).await.unwrap();
        }

        let query = HistoryQuery::new("temp")
            .range(0, 120 * S)
            .bucket_size(120)
            .functions([
                AggregateFunction::First,
                AggregateFunction::Last,
                AggregateFunction::Mean,
            ]);
        let rows = engine.history(&query).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].timestamp, 0);
        assert_eq!(rows[0].get(AggregateFunction::First), Some(&SeriesValue::Float(10.0)));
        assert_eq!(rows[0].get(AggregateFunction::Last), Some(&SeriesValue::Float(14.0)));
        assert_eq!(rows[0].get(AggregateFunction::Mean), Some(&SeriesValue::Float(12.0)));
    }

    #[tokio::test]
    async fn test_second_call_hits_cache() {
        let (_, engine) = engine_with(ValueFormat::Float);
        engine.insert("temp", 1.0, Some(0)).await.unwrap();
        engine.insert("temp", 2.0, Some(10 * S)).await.unwrap();

        let query = HistoryQuery::new("temp").range(0, 10 * S);
        let first = engine.history(&query).await.unwrap();
        let second = engine.history(&query).await.unwrap();
        assert_eq!(first, second);

        let stats = engine.stats();
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.cache_hits, 1);
    }

    #[tokio::test]
    async fn test_other_function_served_from_same_entry() {
        let (_, engine) = engine_with(ValueFormat::Float);
        engine.insert("temp", 1.0, Some(0)).await.unwrap();
        engine.insert("temp", 3.0, Some(S)).await.unwrap();

        let base = HistoryQuery::new("temp").range(0, 2 * S).bucket_size(2);
        engine.history(&base.clone().functions([AggregateFunction::Min])).await.unwrap();
        let rows = engine
            .history(&base.functions([AggregateFunction::Max]))
            .await
            .unwrap();

        assert_eq!(rows[0].get(AggregateFunction::Max), Some(&SeriesValue::Float(3.0)));
        assert_eq!(engine.stats().cache_misses, 1);
    }

    #[tokio::test]
    async fn test_insert_invalidates_cached_range() {
        let (_, engine) = engine_with(ValueFormat::Float);
        engine.insert("temp", 10.0, Some(0)).await.unwrap();
        engine.insert("temp", 20.0, Some(60 * S)).await.unwrap();

        let query = HistoryQuery::new("temp")
            .range(0, 60 * S)
            .bucket_size(60)
            .functions([AggregateFunction::Max]);
        engine.history(&query).await.unwrap();

        engine.insert("temp", 99.0, Some(30 * S)).await.unwrap();
        let rows = engine.history(&query).await.unwrap();
        assert_eq!(rows[0].get(AggregateFunction::Max), Some(&SeriesValue::Float(99.0)));
    }

    #[tokio::test]
    async fn test_range_policy_keeps_unaffected_entries() {
        let (source, _) = engine_with(ValueFormat::Float);
        let cache = Arc::new(MemorySeriesCache::default());
        let engine = SeriesEngine::new(source, cache.clone())
            .with_invalidation(InvalidationPolicy::Range);

        engine.insert("temp", 1.0, Some(0)).await.unwrap();
        engine.insert("temp", 2.0, Some(100 * S)).await.unwrap();

        let early = HistoryQuery::new("temp").range(0, 10 * S).bucket_size(10);
        let late = HistoryQuery::new("temp").range(90 * S, 100 * S).bucket_size(10);
        engine.history(&early).await.unwrap();
        engine.history(&late).await.unwrap();
        assert_eq!(cache.entry_count(), 2);

        engine.insert("temp", 5.0, Some(95 * S)).await.unwrap();
        assert_eq!(cache.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_integer_series_truncates() {
        let (_, engine) = engine_with(ValueFormat::Integer);
        engine.insert("temp", 1.0, Some(0)).await.unwrap();
        engine.insert("temp", 2.0, Some(S)).await.unwrap();

        let rows = engine
            .history(&HistoryQuery::new("temp").range(0, S).bucket_size(10))
            .await
            .unwrap();
        assert_eq!(rows[0].get(AggregateFunction::Mean), Some(&SeriesValue::Integer(1)));
    }

    #[tokio::test]
    async fn test_empty_series_and_unknown_series() {
        let (_, engine) = engine_with(ValueFormat::Float);
        assert!(engine.history(&HistoryQuery::new("temp")).await.unwrap().is_empty());

        let err = engine.history(&HistoryQuery::new("nope")).await.unwrap_err();
        assert!(matches!(err, Error::SeriesNotFound(_)));
        let err = engine.insert("nope", 1.0, None).await.unwrap_err();
        assert!(matches!(err, Error::SeriesNotFound(_)));
        let err = engine.count("nope", None, None).await.unwrap_err();
        assert!(matches!(err, Error::SeriesNotFound(_)));
    }

    #[tokio::test]
    async fn test_explicit_range_over_empty_series_yields_empty_buckets() {
        let (_, engine) = engine_with(ValueFormat::Float);
        let rows = engine
            .history(&HistoryQuery::new("temp").range(0, 30 * S).bucket_size(10))
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.get(AggregateFunction::Mean).is_none()));
    }

    #[tokio::test]
    async fn test_insert_rejects_bad_values() {
        let (_, engine) = engine_with(ValueFormat::Integer);
        assert!(engine
            .insert("temp", f64::NAN, Some(0))
            .await
            .unwrap_err()
            .is_invalid_argument());
        assert!(matches!(
            engine.insert("temp", 1e300, Some(0)).await,
            Err(Error::Format(_))
        ));
        assert_eq!(engine.count("temp", None, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reset_drops_samples_and_cache() {
        let (_, engine) = engine_with(ValueFormat::Float);
        engine.insert("temp", 1.0, Some(0)).await.unwrap();
        engine.insert("temp", 2.0, Some(S)).await.unwrap();
        let query = HistoryQuery::new("temp").range(0, S).bucket_size(1);
        assert!(engine.history(&query).await.unwrap()[0]
            .get(AggregateFunction::Mean)
            .is_some());

        assert_eq!(engine.reset("temp").await.unwrap(), 2);
        let rows = engine.history(&query).await.unwrap();
        assert!(rows.iter().all(|r| r.get(AggregateFunction::Mean).is_none()));
    }

    /// Cache that fails on demand
    #[derive(Default)]
    struct FlakyCache {
        inner: MemorySeriesCache,
        broken: AtomicBool,
    }

    impl FlakyCache {
        fn check(&self) -> std::result::Result<(), CacheError> {
            if self.broken.load(Ordering::SeqCst) {
                Err(CacheError::Connection("down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl SeriesCache for FlakyCache {
        fn backend_id(&self) -> &str {
            "flaky"
        }

        async fn get(
            &self,
            key: &CacheKey,
        ) -> std::result::Result<Option<Vec<BucketRow>>, CacheError> {
            self.check()?;
            self.inner.get(key).await
        }

        async fn put(
            &self,
            key: &CacheKey,
            rows: &[BucketRow],
            ttl: Option<Duration>,
        ) -> std::result::Result<(), CacheError> {
            self.check()?;
            self.inner.put(key, rows, ttl).await
        }

        async fn invalidate_series(&self, series: &str) -> std::result::Result<u64, CacheError> {
            self.check()?;
            self.inner.invalidate_series(series).await
        }

        fn stats(&self) -> CacheStatsSnapshot {
            self.inner.stats()
        }
    }

    #[tokio::test]
    async fn test_failed_invalidation_never_serves_stale_rows() {
        let (source, _) = engine_with(ValueFormat::Float);
        let cache = Arc::new(FlakyCache::default());
        let engine = SeriesEngine::new(source, cache.clone());

        engine.insert("temp", 1.0, Some(0)).await.unwrap();
        let query = HistoryQuery::new("temp")
            .range(0, 10 * S)
            .bucket_size(10)
            .functions([AggregateFunction::Max]);
        engine.history(&query).await.unwrap();

        // invalidation fails, the stale entry stays in the backend
        cache.broken.store(true, Ordering::SeqCst);
        engine.insert("temp", 50.0, Some(5 * S)).await.unwrap();
        let rows = engine.history(&query).await.unwrap();
        assert_eq!(rows[0].get(AggregateFunction::Max), Some(&SeriesValue::Float(50.0)));

        // backend recovers, the retried invalidation clears the old entry
        cache.broken.store(false, Ordering::SeqCst);
        let rows = engine.history(&query).await.unwrap();
        assert_eq!(rows[0].get(AggregateFunction::Max), Some(&SeriesValue::Float(50.0)));
        assert!(engine.stats().degraded >= 2);
    }
}
