//! Cache backend that stores nothing

use async_trait::async_trait;
use std::time::Duration;

use super::{CacheKey, CacheStats, CacheStatsSnapshot, SeriesCache};
use crate::aggregation::BucketRow;
use crate::error::CacheError;

/// Always misses; puts and invalidations are no-ops
#[derive(Debug, Default)]
pub struct NullSeriesCache {
    stats: CacheStats,
}

impl NullSeriesCache {
    /// Create a null cache
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SeriesCache for NullSeriesCache {
    fn backend_id(&self) -> &str {
        "none"
    }

    async fn get(&self, _key: &CacheKey) -> Result<Option<Vec<BucketRow>>, CacheError> {
        self.stats.miss();
        Ok(None)
    }

    async fn put(
        &self,
        _key: &CacheKey,
        _rows: &[BucketRow],
        _ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        Ok(())
    }

    async fn invalidate_series(&self, _series: &str) -> Result<u64, CacheError> {
        Ok(0)
    }

    fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot(0)
    }
}
