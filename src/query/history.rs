//! History request and response types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::aggregation::{AggregateFunction, BucketRow};
use crate::error::{Error, Result};
use crate::format::{cast, SeriesValue};
use crate::types::{Timestamp, ValueFormat};

/// A bucketed history request
///
/// `from` and `to` default to the first and last sample of the series.
/// At most one of `num_buckets` and `bucket_size` (seconds) may be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    /// Series name
    pub series: String,
    /// Inclusive range start (ms)
    pub from: Option<Timestamp>,
    /// Inclusive range end (ms)
    pub to: Option<Timestamp>,
    /// Requested number of buckets
    pub num_buckets: Option<i64>,
    /// Requested bucket width in seconds
    pub bucket_size: Option<i64>,
    /// Functions to return, in output order
    pub functions: Vec<AggregateFunction>,
}

impl HistoryQuery {
    /// Query over the whole series using `mean`
    pub fn new(series: impl Into<String>) -> Self {
        Self {
            series: series.into(),
            from: None,
            to: None,
            num_buckets: None,
            bucket_size: None,
            functions: vec![AggregateFunction::Mean],
        }
    }

    /// Set the range start
    pub fn from(mut self, from: Timestamp) -> Self {
        self.from = Some(from);
        self
    }

    /// Set the range end
    pub fn to(mut self, to: Timestamp) -> Self {
        self.to = Some(to);
        self
    }

    /// Set both ends of the range
    pub fn range(self, from: Timestamp, to: Timestamp) -> Self {
        self.from(from).to(to)
    }

    /// Ask for roughly `n` buckets
    pub fn num_buckets(mut self, n: i64) -> Self {
        self.num_buckets = Some(n);
        self
    }

    /// Use a fixed bucket width in seconds
    pub fn bucket_size(mut self, secs: i64) -> Self {
        self.bucket_size = Some(secs);
        self
    }

    /// Replace the requested functions
    pub fn functions(mut self, functions: impl IntoIterator<Item = AggregateFunction>) -> Self {
        self.functions = functions.into_iter().collect();
        self
    }

    /// Check the arguments that do not depend on the stored data
    pub fn validate(&self) -> Result<()> {
        if self.series.is_empty() {
            return Err(Error::invalid("series name cannot be empty"));
        }
        if self.functions.is_empty() {
            return Err(Error::invalid("at least one aggregation function is required"));
        }
        if self.num_buckets.is_some() && self.bucket_size.is_some() {
            return Err(Error::invalid(
                "num_buckets and bucket_size are mutually exclusive",
            ));
        }
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(Error::invalid(format!(
                    "range start {} is after end {}",
                    from, to
                )));
            }
        }
        Ok(())
    }
}

/// One returned bucket, values cast to the series format
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRow {
    /// Bucket start (ms)
    pub timestamp: Timestamp,
    /// Value per requested function, `None` for an empty bucket
    pub values: BTreeMap<AggregateFunction, Option<SeriesValue>>,
}

impl HistoryRow {
    /// Project a cached row onto the requested functions and cast it
    pub fn from_bucket(
        row: &BucketRow,
        functions: &[AggregateFunction],
        format: ValueFormat,
    ) -> Result<Self> {
        let mut values = BTreeMap::new();
        for (function, value) in row.select(functions) {
            let value = value.map(|v| cast(v, format)).transpose()?;
            values.insert(function, value);
        }
        Ok(Self {
            timestamp: row.start,
            values,
        })
    }

    /// Value of one function, flattened
    pub fn get(&self, function: AggregateFunction) -> Option<&SeriesValue> {
        self.values.get(&function).and_then(|v| v.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::BucketStats;

    #[test]
    fn test_validate() {
        assert!(HistoryQuery::new("cpu").validate().is_ok());
        assert!(HistoryQuery::new("").validate().is_err());
        assert!(HistoryQuery::new("cpu")
            .functions(Vec::new())
            .validate()
            .unwrap_err()
            .is_invalid_argument());
        assert!(HistoryQuery::new("cpu")
            .num_buckets(10)
            .bucket_size(60)
            .validate()
            .is_err());
        assert!(HistoryQuery::new("cpu").range(10, 5).validate().is_err());
    }

    #[test]
    fn test_from_bucket_casts_and_projects() {
        let row = BucketRow {
            start: 60_000,
            stats: BucketStats {
                min: Some(1.2),
                max: Some(9.8),
                first: Some(1.2),
                last: Some(9.8),
                mean: Some(5.5),
                stddev: Some(4.3),
            },
        };
        let out = HistoryRow::from_bucket(
            &row,
            &[AggregateFunction::Max, AggregateFunction::Mean],
            ValueFormat::Integer,
        )
        .unwrap();
        assert_eq!(out.timestamp, 60_000);
        assert_eq!(out.values.len(), 2);
        assert_eq!(out.get(AggregateFunction::Max), Some(&SeriesValue::Integer(9)));
        assert_eq!(out.get(AggregateFunction::Mean), Some(&SeriesValue::Integer(5)));
        assert_eq!(out.get(AggregateFunction::Min), None);
    }

    #[test]
    fn test_empty_bucket_keeps_none() {
        let row = BucketRow {
            start: 0,
            stats: BucketStats::empty(),
        };
        let out = HistoryRow::from_bucket(&row, &[AggregateFunction::Mean], ValueFormat::Float)
            .unwrap();
        assert_eq!(out.values.get(&AggregateFunction::Mean), Some(&None));

        let json = serde_json::to_string(&out).unwrap();
        assert_eq!(json, r#"{"timestamp":0,"values":{"mean":null}}"#);
    }
}
