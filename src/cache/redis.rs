//! Redis-backed series cache
//!
//! Entries are JSON-encoded bucket rows stored with `SET EX`. Each series
//! keeps a set of its cached ranges so invalidation can find them without
//! `KEYS`/`SCAN`:
//!
//! ```text
//! tsh:{series}:{start}:{end}:{width}   → "[{\"start\":0,\"stats\":{...}}, ...]"
//! tsh:{series}:keys                    → {"0:120000:60000", ...}
//! ```
//!
//! The per-series set has no TTL. Members whose entry already expired are
//! removed the next time the series is invalidated.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::{CacheKey, CacheStats, CacheStatsSnapshot, SeriesCache};
use crate::aggregation::BucketRow;
use crate::error::CacheError;
use crate::redis::{RedisConfig, RedisPool};
use crate::types::Timestamp;

/// Default key prefix
pub const DEFAULT_PREFIX: &str = "tsh";

/// Series cache stored in Redis
pub struct RedisSeriesCache {
    pool: Arc<RedisPool>,
    prefix: String,
    default_ttl: Duration,
    stats: CacheStats,
}

impl RedisSeriesCache {
    /// Wrap an existing pool
    pub fn new(pool: Arc<RedisPool>, default_ttl: Duration) -> Self {
        Self {
            pool,
            prefix: DEFAULT_PREFIX.to_string(),
            default_ttl,
            stats: CacheStats::default(),
        }
    }

    /// Connect to Redis and build the cache
    pub async fn connect(config: RedisConfig, default_ttl: Duration) -> Result<Self, CacheError> {
        let pool = RedisPool::new(config).await?;
        info!(
            url = %crate::redis::util::sanitize_url(&pool.config().url),
            "Redis series cache connected"
        );
        Ok(Self::new(Arc::new(pool), default_ttl))
    }

    /// Use a custom key prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn entry_key(&self, key: &CacheKey) -> String {
        format!(
            "{}:{}:{}",
            self.prefix,
            key.series,
            range_member(key.start, key.end, key.width)
        )
    }

    fn index_key(&self, series: &str) -> String {
        format!("{}:{}:keys", self.prefix, series)
    }

    /// Remove the given range members of `series`, returns entries deleted
    async fn remove_members(&self, series: &str, members: Vec<String>) -> Result<u64, CacheError> {
        if members.is_empty() {
            return Ok(0);
        }

        let index_key = self.index_key(series);
        let entry_keys: Vec<String> = members
            .iter()
            .map(|m| format!("{}:{}:{}", self.prefix, series, m))
            .collect();

        let (deleted,): (u64,) = self
            .pool
            .execute(|mut conn| {
                let (index_key, entry_keys, members) = (&index_key, &entry_keys, &members);
                async move {
                    redis::pipe()
                        .atomic()
                        .cmd("DEL")
                        .arg(entry_keys)
                        .cmd("SREM")
                        .arg(index_key)
                        .arg(members)
                        .ignore()
                        .query_async::<(u64,)>(&mut conn)
                        .await
                }
            })
            .await?;

        self.stats.invalidated(deleted);
        Ok(deleted)
    }

    async fn members(&self, series: &str) -> Result<Vec<String>, CacheError> {
        let index_key = self.index_key(series);
        self.pool
            .execute(|mut conn| {
                let index_key = &index_key;
                async move {
                    redis::cmd("SMEMBERS")
                        .arg(index_key)
                        .query_async::<Vec<String>>(&mut conn)
                        .await
                }
            })
            .await
    }
}

/// `"{start}:{end}:{width}"`
fn range_member(start: Timestamp, end: Timestamp, width: i64) -> String {
    format!("{}:{}:{}", start, end, width)
}

/// Inverse of [`range_member`], `None` for foreign members
fn parse_range_member(member: &str) -> Option<(Timestamp, Timestamp, i64)> {
    let mut parts = member.split(':');
    let start = parts.next()?.parse().ok()?;
    let end = parts.next()?.parse().ok()?;
    let width = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((start, end, width))
}

#[async_trait]
impl SeriesCache for RedisSeriesCache {
    fn backend_id(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<BucketRow>>, CacheError> {
        let entry_key = self.entry_key(key);
        let payload: Option<String> = self
            .pool
            .execute(|mut conn| {
                let entry_key = &entry_key;
                async move {
                    redis::cmd("GET")
                        .arg(entry_key)
                        .query_async::<Option<String>>(&mut conn)
                        .await
                }
            })
            .await?;

        match payload {
            Some(json) => {
                let rows = serde_json::from_str(&json)
                    .map_err(|e| CacheError::Deserialization(e.to_string()))?;
                self.stats.hit();
                Ok(Some(rows))
            },
            None => {
                self.stats.miss();
                Ok(None)
            },
        }
    }

    async fn put(
        &self,
        key: &CacheKey,
        rows: &[BucketRow],
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let payload =
            serde_json::to_string(rows).map_err(|e| CacheError::Serialization(e.to_string()))?;
        let ttl_secs = ttl.unwrap_or(self.default_ttl).as_secs().max(1);
        let entry_key = self.entry_key(key);
        let index_key = self.index_key(&key.series);
        let member = range_member(key.start, key.end, key.width);

        self.pool
            .execute(|mut conn| {
                let (entry_key, index_key, member, payload) =
                    (&entry_key, &index_key, &member, &payload);
                async move {
                    redis::pipe()
                        .atomic()
                        .cmd("SET")
                        .arg(entry_key)
                        .arg(payload)
                        .arg("EX")
                        .arg(ttl_secs)
                        .ignore()
                        .cmd("SADD")
                        .arg(index_key)
                        .arg(member)
                        .ignore()
                        .query_async::<()>(&mut conn)
                        .await
                }
            })
            .await
    }

    async fn invalidate_series(&self, series: &str) -> Result<u64, CacheError> {
        let members = self.members(series).await?;
        self.remove_members(series, members).await
    }

    async fn invalidate_range(&self, series: &str, timestamp: Timestamp) -> Result<u64, CacheError> {
        let members: Vec<String> = self
            .members(series)
            .await?
            .into_iter()
            .filter(|m| match parse_range_member(m) {
                Some((start, end, _)) => timestamp >= start && timestamp <= end,
                // unknown layout, drop it to be safe
                None => true,
            })
            .collect();
        self.remove_members(series, members).await
    }

    fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::BucketStats;

    #[test]
    fn test_range_member_roundtrip() {
        let member = range_member(-5_000, 120_000, 60_000);
        assert_eq!(member, "-5000:120000:60000");
        assert_eq!(parse_range_member(&member), Some((-5_000, 120_000, 60_000)));
        assert_eq!(parse_range_member("1:2"), None);
        assert_eq!(parse_range_member("1:2:3:4"), None);
        assert_eq!(parse_range_member("a:2:3"), None);
    }

    // Needs a local Redis: `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn test_live_put_get_invalidate() {
        let cache = RedisSeriesCache::connect(
            RedisConfig::with_url("redis://127.0.0.1:6379"),
            Duration::from_secs(30),
        )
        .await
        .unwrap()
        .with_prefix(format!("tsh-test-{}", rand::random::<u32>()));

        let key = CacheKey {
            series: "cpu".to_string(),
            start: 0,
            end: 120_000,
            width: 60_000,
        };
        let rows = vec![BucketRow {
            start: 0,
            stats: BucketStats {
                mean: Some(0.1 + 0.2),
                ..BucketStats::empty()
            },
        }];

        cache.put(&key, &rows, None).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(rows));

        assert_eq!(cache.invalidate_range("cpu", 500_000).await.unwrap(), 0);
        assert_eq!(cache.invalidate_range("cpu", 60_000).await.unwrap(), 1);
        assert!(cache.get(&key).await.unwrap().is_none());
    }
}
