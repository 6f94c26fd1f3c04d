//! tsdb-history - bucketed history queries over time series
//!
//! This library provides:
//! - Bucket planning with an automatic "nice width" table
//! - Streaming per-bucket aggregation (min, max, first, last, mean, stddev)
//! - Per-series value formats (integer, float, fixed decimal, raw)
//! - A pluggable result cache (none, in-process LRU, Redis) with
//!   insert-driven invalidation
//!
//! ```
//! use std::sync::Arc;
//! use tsdb_history::{AggregateFunction, HistoryQuery, InMemorySampleSource, Sample, SeriesEngine, SeriesInfo};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let source = Arc::new(InMemorySampleSource::new());
//! source.create_series(SeriesInfo::new("cpu")).unwrap();
//! source
//!     .load("cpu", vec![Sample::new(0, 10.0), Sample::new(30_000, 14.0)])
//!     .unwrap();
//!
//! let engine = SeriesEngine::uncached(source);
//! let query = HistoryQuery::new("cpu")
//!     .range(0, 60_000)
//!     .bucket_size(60)
//!     .functions([AggregateFunction::Max]);
//! let rows = engine.history(&query).await.unwrap();
//! assert_eq!(rows.len(), 1);
//! # });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Per-bucket aggregation
pub mod aggregation;

/// Result caching backends
pub mod cache;

/// Configuration management with TOML support
pub mod config;

/// Engine, sample sources and builder
pub mod engine;

pub mod error;

/// Value formats and casting
pub mod format;

/// Query model and bucket planning
pub mod query;

/// Redis connection pooling for the shared cache
pub mod redis;

pub mod types;

// Re-export main types
pub use aggregation::AggregateFunction;
pub use config::Config;
pub use engine::{InMemorySampleSource, SampleSource, SeriesEngine, SeriesEngineBuilder};
pub use error::{Error, Result};
pub use format::SeriesValue;
pub use query::{HistoryQuery, HistoryRow};
pub use types::{Sample, SeriesInfo, TimeRange, Timestamp, ValueFormat};
