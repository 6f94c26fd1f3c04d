//! Bucket Planner - maps a requested range to a concrete bucket layout
//!
//! Given `[frm, to]` and at most one of `num_buckets` / `bucket_size`, the
//! planner produces a [`BucketPlan`] of `{start, end, width}`.
//!
//! # Width selection
//!
//! ```text
//! bucket_size given   → width = bucket_size seconds, start = frm, end = to
//! num_buckets given   → width = ceil((to - frm) / n) rounded up to whole seconds
//! neither given       → width from the BucketTable, start/end aligned to width
//! ```
//!
//! Auto-selected plans are aligned to whole multiples of the width so that
//! overlapping user ranges that round to the same aligned range share a
//! cache key.
//!
//! # Bucket layout
//!
//! Buckets are half-open `[start + i*width, start + (i+1)*width)` except the
//! last one, which is closed on the right so that a sample sitting exactly on
//! `end` is counted. The plan always has `max(1, ceil((end - start) / width))`
//! buckets.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{TimeRange, Timestamp, MILLIS_PER_SECOND};

// ============================================================================
// Bucket Table
// ============================================================================

/// One row of the auto bucket-width table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketTier {
    /// Largest range length (seconds) served by this tier
    pub max_range_secs: i64,
    /// Bucket width (seconds) used for ranges up to `max_range_secs`
    pub width_secs: i64,
}

impl BucketTier {
    /// Create a tier
    pub const fn new(max_range_secs: i64, width_secs: i64) -> Self {
        Self {
            max_range_secs,
            width_secs,
        }
    }
}

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// Default "nice" widths, keyed by the longest range they serve
pub const DEFAULT_BUCKET_TIERS: &[BucketTier] = &[
    BucketTier::new(5 * MINUTE, 1),
    BucketTier::new(30 * MINUTE, 10),
    BucketTier::new(HOUR, 15),
    BucketTier::new(6 * HOUR, MINUTE),
    BucketTier::new(DAY, 5 * MINUTE),
    BucketTier::new(7 * DAY, 30 * MINUTE),
    BucketTier::new(30 * DAY, HOUR),
    BucketTier::new(90 * DAY, 3 * HOUR),
    BucketTier::new(365 * DAY, DAY),
    BucketTier::new(5 * 365 * DAY, 7 * DAY),
];

/// Monotonically increasing table of `(max_range_secs, width_secs)` tiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketTable {
    tiers: Vec<BucketTier>,
}

impl BucketTable {
    /// Build a table, validating that it is non-empty and monotonic
    pub fn new(tiers: Vec<BucketTier>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(Error::Configuration(
                "bucket table must have at least one tier".to_string(),
            ));
        }

        for tier in &tiers {
            if tier.max_range_secs <= 0 || tier.width_secs <= 0 {
                return Err(Error::Configuration(format!(
                    "bucket tier {:?} must have positive range and width",
                    tier
                )));
            }
        }

        for pair in tiers.windows(2) {
            if pair[1].max_range_secs <= pair[0].max_range_secs {
                return Err(Error::Configuration(format!(
                    "bucket tier thresholds must increase: {} then {}",
                    pair[0].max_range_secs, pair[1].max_range_secs
                )));
            }
            if pair[1].width_secs < pair[0].width_secs {
                return Err(Error::Configuration(format!(
                    "bucket tier widths must not shrink: {} then {}",
                    pair[0].width_secs, pair[1].width_secs
                )));
            }
        }

        Ok(Self { tiers })
    }

    /// The tiers in ascending order
    pub fn tiers(&self) -> &[BucketTier] {
        &self.tiers
    }

    /// Width (seconds) for a range of `range_secs` seconds
    ///
    /// Picks the smallest threshold `>= range_secs`; ranges beyond the last
    /// threshold get the widest width.
    pub fn select_width_secs(&self, range_secs: i64) -> i64 {
        self.tiers
            .iter()
            .find(|tier| tier.max_range_secs >= range_secs)
            .or_else(|| self.tiers.last())
            .map(|tier| tier.width_secs)
            .unwrap_or(1)
    }
}

impl Default for BucketTable {
    fn default() -> Self {
        Self {
            tiers: DEFAULT_BUCKET_TIERS.to_vec(),
        }
    }
}

// ============================================================================
// Bucket Plan
// ============================================================================

/// Concrete bucket layout for one query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketPlan {
    /// Start of the first bucket (ms)
    pub start: Timestamp,
    /// End of the covered range (ms), inclusive
    pub end: Timestamp,
    /// Bucket width (ms), always a whole number of seconds
    pub width: i64,
}

impl BucketPlan {
    /// Number of buckets, `max(1, ceil((end - start) / width))`
    pub fn bucket_count(&self) -> usize {
        let span = self.end.saturating_sub(self.start);
        let count = span / self.width + i64::from(span % self.width != 0);
        count.max(1) as usize
    }

    /// Start timestamp of bucket `index`
    pub fn bucket_start(&self, index: usize) -> Timestamp {
        self.start + index as i64 * self.width
    }

    /// Bucket a timestamp falls into, `None` outside `[start, end]`
    pub fn bucket_index(&self, timestamp: Timestamp) -> Option<usize> {
        if timestamp < self.start || timestamp > self.end {
            return None;
        }
        let index = ((timestamp - self.start) / self.width) as usize;
        Some(index.min(self.bucket_count() - 1))
    }

    /// Width in seconds
    pub fn width_secs(&self) -> i64 {
        self.width / MILLIS_PER_SECOND
    }

    /// Closed range of samples the plan covers
    pub fn range(&self) -> TimeRange {
        TimeRange {
            start: self.start,
            end: self.end,
        }
    }
}

// ============================================================================
// Planner
// ============================================================================

/// Default upper bound on buckets per plan
pub const DEFAULT_MAX_BUCKETS: usize = 100_000;

/// Pure planner turning a requested range into a [`BucketPlan`]
#[derive(Debug, Clone)]
pub struct BucketPlanner {
    table: BucketTable,
    max_buckets: usize,
}

impl Default for BucketPlanner {
    fn default() -> Self {
        Self::new(BucketTable::default(), DEFAULT_MAX_BUCKETS)
    }
}

impl BucketPlanner {
    /// Create a planner with a custom table and bucket limit
    pub fn new(table: BucketTable, max_buckets: usize) -> Self {
        Self {
            table,
            max_buckets: max_buckets.max(1),
        }
    }

    /// The auto-selection table
    pub fn table(&self) -> &BucketTable {
        &self.table
    }

    /// Plan buckets for `[frm, to]` (ms)
    ///
    /// `num_buckets` and `bucket_size` (seconds) are mutually exclusive; with
    /// neither the width comes from the bucket table.
    pub fn plan(
        &self,
        frm: Timestamp,
        to: Timestamp,
        num_buckets: Option<i64>,
        bucket_size: Option<i64>,
    ) -> Result<BucketPlan> {
        if frm > to {
            return Err(Error::invalid(format!(
                "range start {} is after end {}",
                frm, to
            )));
        }
        let span = to
            .checked_sub(frm)
            .ok_or_else(|| Error::invalid("range length overflows"))?;

        let plan = match (num_buckets, bucket_size) {
            (Some(_), Some(_)) => {
                return Err(Error::invalid(
                    "num_buckets and bucket_size are mutually exclusive",
                ));
            },
            (Some(n), None) => {
                if n <= 0 {
                    return Err(Error::invalid(format!("num_buckets must be > 0, got {}", n)));
                }
                let per_bucket = ceil_div(span, n);
                let width = ceil_div(per_bucket.max(1), MILLIS_PER_SECOND)
                    .checked_mul(MILLIS_PER_SECOND)
                    .ok_or_else(|| Error::invalid("bucket width overflows"))?;
                BucketPlan {
                    start: frm,
                    end: to,
                    width,
                }
            },
            (None, Some(size)) => {
                if size <= 0 {
                    return Err(Error::invalid(format!(
                        "bucket_size must be > 0, got {}",
                        size
                    )));
                }
                let width = size
                    .checked_mul(MILLIS_PER_SECOND)
                    .ok_or_else(|| Error::invalid(format!("bucket_size {} too large", size)))?;
                BucketPlan {
                    start: frm,
                    end: to,
                    width,
                }
            },
            (None, None) => {
                let range_secs = ceil_div(span, MILLIS_PER_SECOND);
                let width = self
                    .table
                    .select_width_secs(range_secs)
                    .checked_mul(MILLIS_PER_SECOND)
                    .ok_or_else(|| Error::invalid("bucket width overflows"))?;
                let start = floor_div(frm, width)
                    .checked_mul(width)
                    .ok_or_else(|| Error::invalid("aligned range start overflows"))?;
                let end = ceil_div(to, width)
                    .checked_mul(width)
                    .ok_or_else(|| Error::invalid("aligned range end overflows"))?;
                BucketPlan { start, end, width }
            },
        };

        if plan.end.checked_sub(plan.start).is_none() {
            return Err(Error::invalid("aligned range span overflows"));
        }

        let count = plan.bucket_count();
        if count > self.max_buckets {
            return Err(Error::invalid(format!(
                "plan needs {} buckets, limit is {}",
                count, self.max_buckets
            )));
        }

        Ok(plan)
    }
}

fn floor_div(a: i64, b: i64) -> i64 {
    a.div_euclid(b)
}

fn ceil_div(a: i64, b: i64) -> i64 {
    let q = a.div_euclid(b);
    if a.rem_euclid(b) == 0 {
        q
    } else {
        q + 1
    }
}
