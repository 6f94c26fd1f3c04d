//! In-memory sample source
//!
//! Keeps every series as a timestamp-sorted `Vec<Sample>` behind a
//! `parking_lot::RwLock`. Inserts may arrive out of order; they are placed
//! after any existing samples with the same timestamp so duplicates keep
//! arrival order.

use async_trait::async_trait;
use futures::stream;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::traits::{SampleSource, SampleStream};
use crate::error::StoreError;
use crate::types::{Sample, SeriesInfo, TimeRange, Timestamp};

#[derive(Debug)]
struct SeriesData {
    info: SeriesInfo,
    samples: Vec<Sample>,
}

impl SeriesData {
    /// Index range of the samples inside `range`
    fn bounds(&self, range: TimeRange) -> (usize, usize) {
        let lo = self.samples.partition_point(|s| s.timestamp < range.start);
        let hi = self.samples.partition_point(|s| s.timestamp <= range.end);
        (lo, hi.max(lo))
    }
}

/// Sample source backed by process memory
#[derive(Debug, Default)]
pub struct InMemorySampleSource {
    series: RwLock<HashMap<String, SeriesData>>,
}

impl InMemorySampleSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new series
    pub fn create_series(&self, info: SeriesInfo) -> Result<(), StoreError> {
        let mut series = self.series.write();
        if series.contains_key(&info.name) {
            return Err(StoreError::SeriesExists(info.name));
        }
        series.insert(
            info.name.clone(),
            SeriesData {
                info,
                samples: Vec::new(),
            },
        );
        Ok(())
    }

    /// Append many samples at once, in any order
    pub fn load(&self, series: &str, samples: impl IntoIterator<Item = Sample>) -> Result<usize, StoreError> {
        let mut all = self.series.write();
        let data = all
            .get_mut(series)
            .ok_or_else(|| StoreError::UnknownSeries(series.to_string()))?;

        let before = data.samples.len();
        data.samples.extend(samples);
        // stable sort keeps arrival order of equal timestamps
        data.samples.sort_by_key(|s| s.timestamp);
        data.info.touch();
        Ok(data.samples.len() - before)
    }

    /// Names of all series
    pub fn series_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.series.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl SampleSource for InMemorySampleSource {
    fn source_id(&self) -> &str {
        "memory"
    }

    async fn describe(&self, series: &str) -> Result<Option<SeriesInfo>, StoreError> {
        Ok(self.series.read().get(series).map(|d| d.info.clone()))
    }

    async fn first_timestamp(&self, series: &str) -> Result<Option<Timestamp>, StoreError> {
        let all = self.series.read();
        let data = all
            .get(series)
            .ok_or_else(|| StoreError::UnknownSeries(series.to_string()))?;
        Ok(data.samples.first().map(|s| s.timestamp))
    }

    async fn last_timestamp(&self, series: &str) -> Result<Option<Timestamp>, StoreError> {
        let all = self.series.read();
        let data = all
            .get(series)
            .ok_or_else(|| StoreError::UnknownSeries(series.to_string()))?;
        Ok(data.samples.last().map(|s| s.timestamp))
    }

    fn read_range(&self, series: &str, range: TimeRange) -> SampleStream {
        // snapshot under the lock, the stream itself holds no lock
        let snapshot = {
            let all = self.series.read();
            match all.get(series) {
                Some(data) => {
                    let (lo, hi) = data.bounds(range);
                    Ok(data.samples[lo..hi].to_vec())
                },
                None => Err(StoreError::UnknownSeries(series.to_string())),
            }
        };

        match snapshot {
            Ok(samples) => Box::pin(stream::iter(
                samples.into_iter().map(Ok::<Sample, StoreError>),
            )),
            Err(e) => Box::pin(stream::once(async move { Err::<Sample, StoreError>(e) })),
        }
    }

    async fn count(
        &self,
        series: &str,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
    ) -> Result<u64, StoreError> {
        let all = self.series.read();
        let data = all
            .get(series)
            .ok_or_else(|| StoreError::UnknownSeries(series.to_string()))?;
        let range = TimeRange {
            start: from.unwrap_or(Timestamp::MIN),
            end: to.unwrap_or(Timestamp::MAX),
        };
        if range.start > range.end {
            return Ok(0);
        }
        let (lo, hi) = data.bounds(range);
        Ok((hi - lo) as u64)
    }

    async fn insert_sample(&self, series: &str, sample: Sample) -> Result<(), StoreError> {
        let mut all = self.series.write();
        let data = all
            .get_mut(series)
            .ok_or_else(|| StoreError::UnknownSeries(series.to_string()))?;

        let at = data.samples.partition_point(|s| s.timestamp <= sample.timestamp);
        data.samples.insert(at, sample);
        data.info.touch();
        Ok(())
    }

    async fn delete_samples(&self, series: &str) -> Result<u64, StoreError> {
        let mut all = self.series.write();
        let data = all
            .get_mut(series)
            .ok_or_else(|| StoreError::UnknownSeries(series.to_string()))?;
        let removed = data.samples.len() as u64;
        data.samples.clear();
        data.info.touch();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn source_with(name: &str) -> InMemorySampleSource {
        let source = InMemorySampleSource::new();
        source.create_series(SeriesInfo::new(name)).unwrap();
        source
    }

    #[tokio::test]
    async fn test_out_of_order_inserts_are_sorted() {
        let source = source_with("cpu");
        for (ts, v) in [(30, 3.0), (10, 1.0), (20, 2.0), (20, 2.5)] {
            source.insert_sample("cpu", Sample::new(ts, v)).await.unwrap();
        }

        let samples: Vec<Sample> = source
            .read_range("cpu", TimeRange::unbounded())
            .try_collect()
            .await
            .unwrap();
        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 2.5, 3.0]);

        assert_eq!(source.first_timestamp("cpu").await.unwrap(), Some(10));
        assert_eq!(source.last_timestamp("cpu").await.unwrap(), Some(30));
    }

    #[tokio::test]
    async fn test_range_and_count_are_inclusive() {
        let source = source_with("cpu");
        source
            .load("cpu", (0..10).map(|i| Sample::new(i * 10, i as f64)))
            .unwrap();

        let range = TimeRange::new(20, 50).unwrap();
        let samples: Vec<Sample> = source.read_range("cpu", range).try_collect().await.unwrap();
        assert_eq!(samples.len(), 4);
        assert_eq!(source.count("cpu", Some(20), Some(50)).await.unwrap(), 4);
        assert_eq!(source.count("cpu", None, None).await.unwrap(), 10);
        assert_eq!(source.count("cpu", Some(1000), None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_series() {
        let source = InMemorySampleSource::new();
        assert!(source.describe("nope").await.unwrap().is_none());
        assert!(matches!(
            source.insert_sample("nope", Sample::new(0, 1.0)).await,
            Err(StoreError::UnknownSeries(_))
        ));
        let result: Result<Vec<Sample>, _> = source
            .read_range("nope", TimeRange::unbounded())
            .try_collect()
            .await;
        assert!(matches!(result, Err(StoreError::UnknownSeries(_))));
    }

    #[tokio::test]
    async fn test_duplicate_series_rejected() {
        let source = source_with("cpu");
        assert!(matches!(
            source.create_series(SeriesInfo::new("cpu")),
            Err(StoreError::SeriesExists(_))
        ));
    }

    #[tokio::test]
    async fn test_insert_touches_updated() {
        let source = source_with("cpu");
        let before = source.describe("cpu").await.unwrap().unwrap().updated;
        source.insert_sample("cpu", Sample::new(1, 1.0)).await.unwrap();
        let after = source.describe("cpu").await.unwrap().unwrap().updated;
        assert!(after >= before);
    }

    #[tokio::test]
    async fn test_delete_samples() {
        let source = source_with("cpu");
        source.load("cpu", vec![Sample::new(1, 1.0), Sample::new(2, 2.0)]).unwrap();
        assert_eq!(source.delete_samples("cpu").await.unwrap(), 2);
        assert_eq!(source.first_timestamp("cpu").await.unwrap(), None);
        assert!(source.describe("cpu").await.unwrap().is_some());
    }
}
