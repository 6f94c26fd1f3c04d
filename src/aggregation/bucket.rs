//! Single-pass bucket aggregation
//!
//! [`BucketAggregator`] consumes samples in non-decreasing timestamp order and
//! keeps one running [`Accumulator`] for the current bucket. When a sample
//! lands past the current bucket, the finished row is emitted and any
//! buckets skipped in between are emitted as empty rows, so the output always
//! has exactly `plan.bucket_count()` rows.
//!
//! Every supported function is computed in the same pass:
//!
//! - `min` / `max`: running comparison
//! - `first`: value of the first sample seen in the bucket
//! - `last`: overwritten by every sample
//! - `mean`: running mean (Welford), no intermediate sum
//! - `stddev`: Welford's online algorithm, population form, needs >= 2 samples
//!
//! An empty bucket yields `None` for every function.

use serde::{Deserialize, Serialize};

use super::functions::AggregateFunction;
use crate::query::planner::BucketPlan;
use crate::types::{Sample, Timestamp};

// ============================================================================
// Bucket Results
// ============================================================================

/// Value of every supported function for one bucket
///
/// `None` means the bucket had too few samples for that function.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BucketStats {
    /// Smallest sample value
    pub min: Option<f64>,
    /// Largest sample value
    pub max: Option<f64>,
    /// Earliest sample value
    pub first: Option<f64>,
    /// Latest sample value
    pub last: Option<f64>,
    /// Arithmetic mean
    pub mean: Option<f64>,
    /// Population standard deviation
    pub stddev: Option<f64>,
}

impl BucketStats {
    /// Stats of a bucket without samples
    pub fn empty() -> Self {
        Self::default()
    }

    /// Value for one function
    pub fn value(&self, function: AggregateFunction) -> Option<f64> {
        match function {
            AggregateFunction::Min => self.min,
            AggregateFunction::Max => self.max,
            AggregateFunction::First => self.first,
            AggregateFunction::Last => self.last,
            AggregateFunction::Mean => self.mean,
            AggregateFunction::StdDev => self.stddev,
        }
    }

    /// True when no function produced a value
    pub fn is_empty(&self) -> bool {
        AggregateFunction::ALL
            .iter()
            .all(|f| self.value(*f).is_none())
    }
}

/// Aggregated result of one bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketRow {
    /// Start of the bucket (ms)
    pub start: Timestamp,
    /// All supported functions for this bucket
    pub stats: BucketStats,
}

impl BucketRow {
    /// Values of the requested functions, in request order
    pub fn select(&self, functions: &[AggregateFunction]) -> Vec<(AggregateFunction, Option<f64>)> {
        functions
            .iter()
            .map(|f| (*f, self.stats.value(*f)))
            .collect()
    }
}

// ============================================================================
// Accumulator
// ============================================================================

/// Running state for one bucket
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    count: u64,
    min: f64,
    max: f64,
    first: Option<f64>,
    last: Option<f64>,
    // Welford state
    running_mean: f64,
    m2: f64,
}

impl Accumulator {
    /// Fold one value into the bucket
    pub fn add(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.first = Some(value);
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.last = Some(value);

        let delta = value - self.running_mean;
        self.running_mean += delta / self.count as f64;
        self.m2 += delta * (value - self.running_mean);
    }

    /// Number of values folded in
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Finalize into per-function values
    pub fn finish(&self) -> BucketStats {
        if self.count == 0 {
            return BucketStats::empty();
        }

        let n = self.count as f64;
        BucketStats {
            min: Some(self.min),
            max: Some(self.max),
            first: self.first,
            last: self.last,
            mean: Some(self.running_mean),
            stddev: (self.count >= 2).then(|| (self.m2 / n).sqrt()),
        }
    }
}

// ============================================================================
// Aggregator
// ============================================================================

/// Outcome of pushing one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Sample folded into a bucket
    Accepted,
    /// Sample lies outside the plan and was ignored
    OutOfRange,
    /// Sample is older than one already consumed
    OutOfOrder {
        /// Timestamp of the newest sample seen so far
        previous: Timestamp,
    },
}

/// Streaming aggregator over one [`BucketPlan`]
#[derive(Debug)]
pub struct BucketAggregator {
    plan: BucketPlan,
    bucket_count: usize,
    current: usize,
    acc: Accumulator,
    rows: Vec<BucketRow>,
    newest: Option<Timestamp>,
}

impl BucketAggregator {
    /// Start aggregating for `plan`
    pub fn new(plan: BucketPlan) -> Self {
        let bucket_count = plan.bucket_count();
        Self {
            plan,
            bucket_count,
            current: 0,
            acc: Accumulator::default(),
            rows: Vec::with_capacity(bucket_count),
            newest: None,
        }
    }

    /// Consume the next sample
    pub fn push(&mut self, sample: Sample) -> PushOutcome {
        if let Some(previous) = self.newest {
            if sample.timestamp < previous {
                return PushOutcome::OutOfOrder { previous };
            }
        }

        let Some(index) = self.plan.bucket_index(sample.timestamp) else {
            return PushOutcome::OutOfRange;
        };
        self.newest = Some(sample.timestamp);

        while self.current < index {
            self.emit();
        }
        self.acc.add(sample.value);
        PushOutcome::Accepted
    }

    /// Close the current bucket and move to the next one
    fn emit(&mut self) {
        let acc = std::mem::take(&mut self.acc);
        self.rows.push(BucketRow {
            start: self.plan.bucket_start(self.current),
            stats: acc.finish(),
        });
        self.current += 1;
    }

    /// Emit the remaining buckets and return every row
    pub fn finish(mut self) -> Vec<BucketRow> {
        while self.current < self.bucket_count {
            self.emit();
        }
        self.rows
    }
}

/// Aggregate an already-ordered sample sequence
///
/// Out-of-range samples are skipped. Returns the offending sample's outcome
/// if the sequence is not ordered.
pub fn aggregate<I>(samples: I, plan: BucketPlan) -> Result<Vec<BucketRow>, PushOutcome>
where
    I: IntoIterator<Item = Sample>,
{
    let mut aggregator = BucketAggregator::new(plan);
    for sample in samples {
        if let outcome @ PushOutcome::OutOfOrder { .. } = aggregator.push(sample) {
            return Err(outcome);
        }
    }
    Ok(aggregator.finish())
}
