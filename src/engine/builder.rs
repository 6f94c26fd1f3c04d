//! Engine builder
//!
//! Wires a [`SampleSource`] and a cache backend chosen by [`Config`] into a
//! [`SeriesEngine`].

use std::sync::Arc;
use tracing::{info, warn};

use super::series::SeriesEngine;
use super::traits::SampleSource;
use crate::cache::{MemorySeriesCache, NullSeriesCache, RedisSeriesCache, SeriesCache};
use crate::config::{CacheBackend, Config};
use crate::error::{Error, Result};
use crate::redis::util::sanitize_url;

/// Builder for a [`SeriesEngine`] with pluggable source and cache
pub struct SeriesEngineBuilder {
    source: Option<Arc<dyn SampleSource>>,
    cache: Option<Arc<dyn SeriesCache>>,
    config: Config,
}

impl SeriesEngineBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            source: None,
            cache: None,
            config: Config::default(),
        }
    }

    /// Set the sample source
    pub fn with_source<S>(mut self, source: S) -> Self
    where
        S: SampleSource,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// Set the sample source from an existing Arc
    ///
    /// Use this when the caller keeps a handle for loading data directly.
    pub fn with_source_arc(mut self, source: Arc<dyn SampleSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Use this cache instead of the one `cache.backend` names
    pub fn with_cache(mut self, cache: Arc<dyn SeriesCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set configuration
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Build the engine
    ///
    /// A Redis backend that cannot be reached is replaced by
    /// [`NullSeriesCache`] so the engine still answers from the source.
    pub async fn build(self) -> Result<SeriesEngine> {
        self.config.validate()?;

        let source = self
            .source
            .ok_or_else(|| Error::Configuration("No sample source configured".to_string()))?;

        let cache = match self.cache {
            Some(cache) => cache,
            None => cache_from_config(&self.config).await,
        };

        let planner = self.config.history.planner()?;
        info!(
            cache = cache.backend_id(),
            invalidation = ?self.config.cache.invalidation,
            max_buckets = self.config.history.max_buckets,
            "Building series engine"
        );

        Ok(SeriesEngine::new(source, cache)
            .with_planner(planner)
            .with_invalidation(self.config.cache.invalidation)
            .with_cache_ttl(Some(self.config.cache.ttl())))
    }
}

impl Default for SeriesEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn cache_from_config(config: &Config) -> Arc<dyn SeriesCache> {
    match config.cache.backend {
        CacheBackend::None => Arc::new(NullSeriesCache::new()),
        CacheBackend::Memory => Arc::new(MemorySeriesCache::new(config.cache.memory_config())),
        CacheBackend::Redis => {
            match RedisSeriesCache::connect(config.redis.redis_config(), config.cache.ttl()).await {
                Ok(cache) => Arc::new(cache.with_prefix(config.redis.key_prefix.clone())),
                Err(e) => {
                    warn!(
                        url = %sanitize_url(&config.redis.url),
                        error = %e,
                        "Redis cache unavailable, continuing without cache"
                    );
                    Arc::new(NullSeriesCache::new())
                },
            }
        },
    }
}
