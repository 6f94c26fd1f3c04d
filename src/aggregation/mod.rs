//! Bucket aggregation
//!
//! Turns an ordered sample stream into one row per bucket of a
//! [`BucketPlan`](crate::query::planner::BucketPlan).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │        Ordered sample stream        │
//! │   (SampleSource::read_range)        │
//! └─────────────────────────────────────┘
//!                  ↓
//! ┌─────────────────────────────────────┐
//! │         BucketAggregator            │
//! │  one Accumulator per open bucket    │
//! └─────────────────────────────────────┘
//!                  ↓
//! ┌─────────────────────────────────────┐
//! │           BucketRow list            │
//! │  every function, every bucket       │
//! └─────────────────────────────────────┘
//! ```
//!
//! Rows carry all supported functions so one cached aggregation serves any
//! later subset of functions over the same plan.
//!
//! # Example
//!
//! ```rust
//! use tsdb_history::aggregation::{aggregate, AggregateFunction};
//! use tsdb_history::query::BucketPlan;
//! use tsdb_history::types::Sample;
//!
//! let plan = BucketPlan { start: 0, end: 120_000, width: 120_000 };
//! let samples = vec![
//!     Sample::new(0, 10.0),
//!     Sample::new(60_000, 12.0),
//!     Sample::new(120_000, 14.0),
//! ];
//! let rows = aggregate(samples, plan).unwrap();
//! assert_eq!(rows.len(), 1);
//! assert_eq!(rows[0].stats.value(AggregateFunction::Mean), Some(12.0));
//! ```

pub mod bucket;
pub mod functions;

pub use bucket::{aggregate, Accumulator, BucketAggregator, BucketRow, BucketStats, PushOutcome};
pub use functions::AggregateFunction;
