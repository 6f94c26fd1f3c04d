//! Shared Redis connection for the cache backend
//!
//! One multiplexed connection serves every command. A semaphore caps the
//! commands in flight at `pool_size`, each attempt is bounded by
//! `command_timeout`, and transient failures are retried per [`RetryPolicy`].
//! A stalled server therefore surfaces as [`CacheError::Timeout`] and the
//! engine falls back to uncached reads.
//!
//! ```rust,no_run
//! use tsdb_history::redis::{RedisConfig, RedisPool};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RedisConfig::with_url("redis://localhost:6379")
//!     .pool_size(8)
//!     .command_timeout(Duration::from_millis(250));
//!
//! let pool = RedisPool::new(config).await?;
//! let pong: String = pool
//!     .execute(|mut conn| async move { redis::cmd("PING").query_async(&mut conn).await })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use redis::aio::MultiplexedConnection;
use redis::{Client, ErrorKind, RedisError};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, warn};

use super::util::safe_redis_error;
use crate::error::CacheError;

/// Connection settings for the Redis cache
#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// `redis://` or `rediss://` URL
    pub url: String,
    /// Commands allowed in flight at once
    pub pool_size: u32,
    /// Bound on establishing the connection
    pub connection_timeout: Duration,
    /// Bound on a single command attempt
    pub command_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            pool_size: 16,
            connection_timeout: Duration::from_secs(2),
            command_timeout: Duration::from_millis(500),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl RedisConfig {
    /// Defaults pointed at `url`
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Reject settings the pool cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if !(self.url.starts_with("redis://") || self.url.starts_with("rediss://")) {
            return Err(format!(
                "Redis URL must use redis:// or rediss://, got {:?}",
                self.url
            ));
        }
        if !(1..=1000).contains(&self.pool_size) {
            return Err(format!("Redis pool size must be 1..=1000, got {}", self.pool_size));
        }
        if self.command_timeout.is_zero() {
            return Err("Redis command timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Bounded exponential backoff for transient command failures
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Cap applied before jitter
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Stretch each delay by up to 25%
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt + 1`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let delay_ms = (self.initial_delay.as_millis() as f64 * factor)
            .min(self.max_delay.as_millis() as f64)
            .max(0.0);
        let stretch = if self.jitter {
            1.0 + rand::random::<f64>() * 0.25
        } else {
            1.0
        };
        Duration::from_millis((delay_ms * stretch) as u64)
    }

    /// Whether attempt number `attempt` (0-indexed) may be followed by another
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Multiplexed Redis connection with bounded concurrency
///
/// A connection dropped by the server is reopened lazily by the next
/// command.
pub struct RedisPool {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    in_flight: Semaphore,
    config: RedisConfig,
}

impl RedisPool {
    /// Validate `config` and open the connection
    pub async fn new(config: RedisConfig) -> Result<Self, CacheError> {
        config.validate().map_err(CacheError::Connection)?;
        let client = Client::open(config.url.as_str())
            .map_err(|e| CacheError::Connection(safe_redis_error(&config.url, &e)))?;

        let mut pool = Self {
            client,
            connection: RwLock::new(None),
            in_flight: Semaphore::new(config.pool_size as usize),
            config,
        };
        let conn = pool.open().await?;
        *pool.connection.get_mut() = Some(conn);
        Ok(pool)
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    async fn open(&self) -> Result<MultiplexedConnection, CacheError> {
        let started = Instant::now();
        let conn = tokio::time::timeout(
            self.config.connection_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| CacheError::Timeout)?
        .map_err(|e| CacheError::Connection(safe_redis_error(&self.config.url, &e)))?;

        debug!(elapsed = ?started.elapsed(), "Redis connection opened");
        Ok(conn)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        if let Some(conn) = self.connection.read().await.as_ref() {
            return Ok(conn.clone());
        }

        let mut slot = self.connection.write().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.open().await?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Run `f` on the shared connection
    ///
    /// `f` is called again for each retry, with a fresh connection handle.
    pub async fn execute<F, Fut, T>(&self, f: F) -> Result<T, CacheError>
    where
        F: Fn(MultiplexedConnection) -> Fut,
        Fut: Future<Output = Result<T, RedisError>>,
    {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| CacheError::Connection("Redis pool closed".to_string()))?;

        let mut attempt = 0;
        loop {
            let conn = self.connection().await?;
            let err = match tokio::time::timeout(self.config.command_timeout, f(conn)).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    if e.is_connection_dropped() || e.is_io_error() {
                        *self.connection.write().await = None;
                    }
                    let err = CacheError::Connection(safe_redis_error(&self.config.url, &e));
                    if !is_transient(&e) {
                        return Err(err);
                    }
                    err
                },
                Err(_) => CacheError::Timeout,
            };

            if !self.config.retry_policy.should_retry(attempt) {
                return Err(err);
            }
            let delay = self.config.retry_policy.delay_for_attempt(attempt);
            warn!(attempt = attempt + 1, ?delay, error = %err, "Redis command failed, retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn is_transient(e: &RedisError) -> bool {
    e.is_connection_dropped()
        || e.is_timeout()
        || e.is_io_error()
        || e.kind() == ErrorKind::BusyLoadingError
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RedisConfig::default();
        assert_eq!(config.pool_size, 16);
        assert_eq!(config.retry_policy.max_retries, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(RedisConfig::with_url("").validate().is_err());
        assert!(RedisConfig::with_url("http://localhost").validate().is_err());
        assert!(RedisConfig::with_url("redis://localhost").pool_size(0).validate().is_err());
        assert!(RedisConfig::with_url("redis://localhost").pool_size(1001).validate().is_err());
        assert!(RedisConfig::with_url("redis://localhost")
            .command_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(RedisConfig::with_url("rediss://localhost").pool_size(4).validate().is_ok());
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter: false,
            ..Default::default()
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(100),
            ..Default::default()
        };
        for _ in 0..50 {
            let delay = policy.delay_for_attempt(0);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(125));
        }
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy {
            max_retries: 2,
            ..Default::default()
        };
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
        assert!(!RetryPolicy::none().should_retry(0));
    }

    #[test]
    fn test_transient_errors() {
        let io = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(is_transient(&io));

        let loading = RedisError::from((ErrorKind::BusyLoadingError, "loading"));
        assert!(is_transient(&loading));

        let auth = RedisError::from((ErrorKind::AuthenticationFailed, "denied"));
        assert!(!is_transient(&auth));
    }

    #[tokio::test]
    async fn test_connect_failure_is_cache_error() {
        // nothing listens on port 1
        let config = RedisConfig::with_url("redis://127.0.0.1:1")
            .connection_timeout(Duration::from_millis(200));
        let err = RedisPool::new(config).await.err();
        assert!(matches!(
            err,
            Some(CacheError::Connection(_)) | Some(CacheError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_never_connects() {
        let err = RedisPool::new(RedisConfig::with_url("http://localhost")).await.err();
        assert!(matches!(err, Some(CacheError::Connection(msg)) if msg.contains("redis://")));
    }
}
