//! Configuration management for the history engine
//!
//! TOML file support, environment variable overrides and defaults for every
//! field.
//!
//! ```toml
//! [cache]
//! backend = "redis"          # none | memory | redis
//! ttl_secs = 300
//! max_entries = 10000
//! invalidation = "series"    # series | range
//!
//! [redis]
//! url = "redis://127.0.0.1:6379"
//!
//! [history]
//! default_function = "mean"
//! max_buckets = 100000
//!
//! [[history.bucket_table]]
//! max_range_secs = 3600
//! width_secs = 60
//!
//! [monitoring]
//! log_level = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::aggregation::AggregateFunction;
use crate::cache::MemoryCacheConfig;
use crate::engine::InvalidationPolicy;
use crate::error::{Error, Result};
use crate::query::{BucketPlanner, BucketTable, BucketTier, DEFAULT_MAX_BUCKETS};
use crate::redis::{RedisConfig, RetryPolicy};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Result cache
    #[serde(default)]
    pub cache: CacheSection,

    /// Redis connection, used when `cache.backend = "redis"`
    #[serde(default)]
    pub redis: RedisSection,

    /// History query defaults
    #[serde(default)]
    pub history: HistorySection,

    /// Logging
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Cache backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// No caching
    None,
    /// In-process LRU
    #[default]
    Memory,
    /// Shared Redis store
    Redis,
}

impl std::str::FromStr for CacheBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(CacheBackend::None),
            "memory" => Ok(CacheBackend::Memory),
            "redis" => Ok(CacheBackend::Redis),
            other => Err(Error::Configuration(format!("unknown cache backend '{}'", other))),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CacheSection {
    /// Which backend to use
    #[serde(default)]
    pub backend: CacheBackend,

    /// Entry lifetime in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Entry limit of the memory backend
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Which entries an insert drops
    #[serde(default)]
    pub invalidation: InvalidationPolicy,
}

/// Redis configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RedisSection {
    /// Server URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Maximum concurrent commands
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Connect timeout in milliseconds
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Per-command timeout in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Retries after a failed command
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Key prefix
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

/// History query configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HistorySection {
    /// Function used when a caller names none
    #[serde(default = "default_function")]
    pub default_function: AggregateFunction,

    /// Upper bound on buckets per query
    #[serde(default = "default_max_buckets")]
    pub max_buckets: usize,

    /// Override of the auto bucket-width table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_table: Option<Vec<BucketTier>>,
}

/// Monitoring configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Log level (error, warn, info, debug, trace) or a full filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_ttl_secs() -> u64 { 300 }
fn default_max_entries() -> usize { 10_000 }
fn default_redis_url() -> String { "redis://127.0.0.1:6379".to_string() }
fn default_pool_size() -> u32 { 16 }
fn default_connection_timeout_ms() -> u64 { 2_000 }
fn default_command_timeout_ms() -> u64 { 500 }
fn default_max_retries() -> u32 { 1 }
fn default_key_prefix() -> String { "tsh".to_string() }
fn default_function() -> AggregateFunction { AggregateFunction::Mean }
fn default_max_buckets() -> usize { DEFAULT_MAX_BUCKETS }
fn default_log_level() -> String { "info".to_string() }

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            invalidation: InvalidationPolicy::default(),
        }
    }
}

impl Default for RedisSection {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            pool_size: default_pool_size(),
            connection_timeout_ms: default_connection_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            max_retries: default_max_retries(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            default_function: default_function(),
            max_buckets: default_max_buckets(),
            bucket_table: None,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl CacheSection {
    /// Entry lifetime
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Settings for the memory backend
    pub fn memory_config(&self) -> MemoryCacheConfig {
        MemoryCacheConfig::default()
            .with_max_entries(self.max_entries)
            .with_ttl(self.ttl())
    }
}

impl RedisSection {
    /// Connection pool settings
    pub fn redis_config(&self) -> RedisConfig {
        RedisConfig::with_url(self.url.clone())
            .pool_size(self.pool_size)
            .connection_timeout(Duration::from_millis(self.connection_timeout_ms))
            .command_timeout(Duration::from_millis(self.command_timeout_ms))
            .retry_policy(RetryPolicy {
                max_retries: self.max_retries,
                ..Default::default()
            })
    }
}

impl HistorySection {
    /// Planner built from the table override and bucket limit
    pub fn planner(&self) -> Result<BucketPlanner> {
        let table = match &self.bucket_table {
            Some(tiers) => BucketTable::new(tiers.clone())?,
            None => BucketTable::default(),
        };
        Ok(BucketPlanner::new(table, self.max_buckets))
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    ///
    /// Unparsable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(backend) = std::env::var("TSDB_CACHE_BACKEND") {
            if let Ok(b) = backend.parse() {
                self.cache.backend = b;
            }
        }
        if let Ok(ttl) = std::env::var("TSDB_CACHE_TTL_SECS") {
            if let Ok(t) = ttl.parse() {
                self.cache.ttl_secs = t;
            }
        }
        if let Ok(url) = std::env::var("TSDB_REDIS_URL") {
            self.redis.url = url;
        }
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.monitoring.log_level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache.ttl_secs == 0 {
            return Err(Error::Configuration("Cache TTL must be > 0".to_string()));
        }
        if self.cache.backend == CacheBackend::Memory && self.cache.max_entries == 0 {
            return Err(Error::Configuration("Cache max_entries must be > 0".to_string()));
        }
        if self.cache.backend == CacheBackend::Redis {
            self.redis
                .redis_config()
                .validate()
                .map_err(Error::Configuration)?;
        }
        if self.history.max_buckets == 0 {
            return Err(Error::Configuration("max_buckets must be > 0".to_string()));
        }
        // validates the table override
        self.history.planner()?;
        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents).map_err(|e| {
            Error::Configuration(format!("Failed to write config file {}: {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.invalidation, InvalidationPolicy::Series);
        assert_eq!(config.history.default_function, AggregateFunction::Mean);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [cache]
            backend = "none"
            invalidation = "range"

            [history]
            default_function = "max"
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.backend, CacheBackend::None);
        assert_eq!(config.cache.invalidation, InvalidationPolicy::Range);
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.history.default_function, AggregateFunction::Max);
        assert_eq!(config.redis.pool_size, 16);
    }

    #[test]
    fn test_bucket_table_override() {
        let config: Config = toml::from_str(
            r#"
            [[history.bucket_table]]
            max_range_secs = 600
            width_secs = 5

            [[history.bucket_table]]
            max_range_secs = 86400
            width_secs = 600
            "#,
        )
        .unwrap();
        let planner = config.history.planner().unwrap();
        assert_eq!(planner.table().select_width_secs(300), 5);
        assert_eq!(planner.table().select_width_secs(1_000_000), 600);
    }

    #[test]
    fn test_invalid_configs() {
        let mut config = Config::default();
        config.cache.ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cache.backend = CacheBackend::Redis;
        config.redis.url = "localhost:6379".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.history.bucket_table = Some(vec![BucketTier::new(60, 10), BucketTier::new(30, 20)]);
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.toml");

        let mut config = Config::default();
        config.cache.backend = CacheBackend::Redis;
        config.history.bucket_table = Some(vec![BucketTier::new(60, 1)]);
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::from_file("/nonexistent/history.toml"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("TSDB_CACHE_TTL_SECS", "42");
        let config = Config::from_env();
        assert_eq!(config.cache.ttl_secs, 42);
        std::env::remove_var("TSDB_CACHE_TTL_SECS");
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("REDIS".parse::<CacheBackend>().unwrap(), CacheBackend::Redis);
        assert_eq!("off".parse::<CacheBackend>().unwrap(), CacheBackend::None);
        assert!("memcached".parse::<CacheBackend>().is_err());
    }
}
