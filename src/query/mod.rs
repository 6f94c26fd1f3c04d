//! History queries
//!
//! A history query goes through two pure steps before any I/O happens:
//!
//! ```text
//! HistoryQuery
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Validate   │  functions, exclusive bucket options, range order
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │    Plan     │  BucketPlanner → BucketPlan {start, end, width}
//! └─────────────┘
//!      │
//!      ▼
//!  SeriesEngine (cache probe, aggregation, cast to HistoryRow)
//! ```

pub mod history;
pub mod planner;

pub use history::{HistoryQuery, HistoryRow};
pub use planner::{
    BucketPlan, BucketPlanner, BucketTable, BucketTier, DEFAULT_BUCKET_TIERS, DEFAULT_MAX_BUCKETS,
};
