//! Collaborator traits the history engine is built on

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::error::StoreError;
use crate::types::{Sample, SeriesInfo, TimeRange, Timestamp};

/// Ordered stream of samples returned by [`SampleSource::read_range`]
pub type SampleStream = Pin<Box<dyn Stream<Item = Result<Sample, StoreError>> + Send>>;

// =============================================================================
// SampleSource Trait
// =============================================================================

/// Raw sample reader and writer for named series
///
/// Implementations apply their own timeouts; the engine propagates any
/// [`StoreError`] to its caller without retrying.
#[async_trait]
pub trait SampleSource: Send + Sync + 'static {
    /// Unique identifier for this source
    fn source_id(&self) -> &str;

    /// Metadata of `series`, `None` if it does not exist
    async fn describe(&self, series: &str) -> Result<Option<SeriesInfo>, StoreError>;

    /// Timestamp of the oldest sample, `None` for an empty series
    async fn first_timestamp(&self, series: &str) -> Result<Option<Timestamp>, StoreError>;

    /// Timestamp of the newest sample, `None` for an empty series
    async fn last_timestamp(&self, series: &str) -> Result<Option<Timestamp>, StoreError>;

    /// Stream the samples in `range` (both ends inclusive)
    ///
    /// Samples must arrive in non-decreasing timestamp order. Samples with
    /// equal timestamps keep insertion order.
    fn read_range(&self, series: &str, range: TimeRange) -> SampleStream;

    /// Number of samples between the optional bounds (inclusive)
    async fn count(
        &self,
        series: &str,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
    ) -> Result<u64, StoreError>;

    /// Persist one sample and mark the series as updated
    async fn insert_sample(&self, series: &str, sample: Sample) -> Result<(), StoreError>;

    /// Delete every sample of `series`, returns how many were removed
    async fn delete_samples(&self, series: &str) -> Result<u64, StoreError>;
}
