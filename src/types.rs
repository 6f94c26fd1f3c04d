//! Core data types used throughout the history engine
//!
//! # Key Types
//!
//! - **`Timestamp`**: Unix time in milliseconds
//! - **`Sample`**: A single raw measurement (timestamp + value)
//! - **`TimeRange`**: Closed time window `[start, end]` used by range reads
//! - **`SeriesInfo`**: Series metadata owned by the sample source
//! - **`ValueFormat`** / **`SeriesClass`**: closed sets of series formats and classes
//!
//! # Example
//!
//! ```rust
//! use tsdb_history::types::{Sample, SeriesInfo, TimeRange, ValueFormat};
//!
//! let sample = Sample::new(60_000, 12.0);
//! let range = TimeRange::new(0, 120_000).unwrap();
//! assert!(range.contains(sample.timestamp));
//!
//! let info = SeriesInfo::new("therm.office").with_format(ValueFormat::Decimal { precision: 2 });
//! assert_eq!(info.format, ValueFormat::Decimal { precision: 2 });
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Unix timestamp in milliseconds since epoch
pub type Timestamp = i64;

/// Milliseconds per second, the unit bucket widths are expressed in
pub const MILLIS_PER_SECOND: i64 = 1_000;

/// Current wall-clock time as a [`Timestamp`]
pub fn now_millis() -> Timestamp {
    Utc::now().timestamp_millis()
}

/// A single raw sample of a series
///
/// Samples are immutable once written. Timestamps are not required to be
/// unique within a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Unix timestamp in milliseconds
    pub timestamp: Timestamp,

    /// Numeric value of the sample
    pub value: f64,
}

impl Sample {
    /// Create a new sample
    pub fn new(timestamp: Timestamp, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Closed time range `[start, end]`, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// First timestamp included in the range
    pub start: Timestamp,
    /// Last timestamp included in the range
    pub end: Timestamp,
}

impl TimeRange {
    /// Create a range, rejecting `start > end`
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, Error> {
        if start > end {
            return Err(Error::invalid(format!(
                "range start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Range covering every representable timestamp
    pub fn unbounded() -> Self {
        Self {
            start: Timestamp::MIN,
            end: Timestamp::MAX,
        }
    }

    /// Build a range from optional bounds, open bounds become unbounded
    pub fn from_bounds(start: Option<Timestamp>, end: Option<Timestamp>) -> Result<Self, Error> {
        Self::new(
            start.unwrap_or(Timestamp::MIN),
            end.unwrap_or(Timestamp::MAX),
        )
    }

    /// Check if a timestamp falls inside the range
    pub fn contains(&self, timestamp: Timestamp) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

/// How the values of a series are interpreted when handed back to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum ValueFormat {
    /// Signed 64-bit integer
    #[default]
    Integer,
    /// IEEE 754 double
    Float,
    /// Fixed-precision decimal with `precision` fractional digits
    Decimal {
        /// Number of fractional digits kept after rounding
        precision: u32,
    },
    /// Opaque text, returned as-is
    Raw,
}

impl ValueFormat {
    /// Largest supported decimal precision
    pub const MAX_PRECISION: u32 = 18;

    /// Decimal format with the default precision of two digits
    pub fn decimal() -> Self {
        ValueFormat::Decimal { precision: 2 }
    }
}

impl fmt::Display for ValueFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueFormat::Integer => write!(f, "int"),
            ValueFormat::Float => write!(f, "float"),
            ValueFormat::Decimal { precision } => write!(f, "decimal({})", precision),
            ValueFormat::Raw => write!(f, "raw"),
        }
    }
}

/// Informational series class, does not change aggregation math
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SeriesClass {
    /// Value moves up and down
    Gauge,
    /// Value only grows over time
    Counter,
    /// Unknown or irrelevant
    #[default]
    Undefined,
}

impl FromStr for SeriesClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gauge" | "gau" => Ok(SeriesClass::Gauge),
            "counter" | "cou" => Ok(SeriesClass::Counter),
            "undefined" | "und" => Ok(SeriesClass::Undefined),
            other => Err(Error::invalid(format!("unknown series class '{}'", other))),
        }
    }
}

/// Series metadata
///
/// Owned by the sample source; the engine only reads `format` to cast
/// aggregated results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesInfo {
    /// Unique series name
    pub name: String,
    /// Value format used when returning results
    pub format: ValueFormat,
    /// Gauge / counter / undefined
    pub class: SeriesClass,
    /// When the series was created
    pub created: DateTime<Utc>,
    /// Last time the series or any of its samples changed
    pub updated: DateTime<Utc>,
}

impl SeriesInfo {
    /// Create metadata for a new integer series of undefined class
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            format: ValueFormat::default(),
            class: SeriesClass::default(),
            created: now,
            updated: now,
        }
    }

    /// Set the value format
    pub fn with_format(mut self, format: ValueFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the series class
    pub fn with_class(mut self, class: SeriesClass) -> Self {
        self.class = class;
        self
    }

    /// Mark the series as modified now
    pub fn touch(&mut self) {
        self.updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range_validation() {
        assert!(TimeRange::new(10, 5).is_err());
        let range = TimeRange::new(5, 5).unwrap();
        assert!(range.contains(5));
        assert!(!range.contains(6));
    }

    #[test]
    fn test_time_range_from_bounds() {
        let range = TimeRange::from_bounds(None, Some(100)).unwrap();
        assert_eq!(range.start, Timestamp::MIN);
        assert!(range.contains(-5));
        assert!(!range.contains(101));
        assert!(TimeRange::from_bounds(Some(2), Some(1)).is_err());
    }

    #[test]
    fn test_series_class_parse() {
        assert_eq!("gauge".parse::<SeriesClass>().unwrap(), SeriesClass::Gauge);
        assert_eq!("COU".parse::<SeriesClass>().unwrap(), SeriesClass::Counter);
        assert!("histogram".parse::<SeriesClass>().is_err());
    }

    #[test]
    fn test_series_info_builder() {
        let info = SeriesInfo::new("net.sessions")
            .with_format(ValueFormat::Float)
            .with_class(SeriesClass::Counter);
        assert_eq!(info.name, "net.sessions");
        assert_eq!(info.format, ValueFormat::Float);
        assert_eq!(info.class, SeriesClass::Counter);
        assert!(info.updated >= info.created);
    }

    #[test]
    fn test_value_format_serde() {
        let json = serde_json::to_string(&ValueFormat::Decimal { precision: 3 }).unwrap();
        assert_eq!(json, r#"{"kind":"decimal","precision":3}"#);
        let back: ValueFormat = serde_json::from_str(r#"{"kind":"raw"}"#).unwrap();
        assert_eq!(back, ValueFormat::Raw);
    }
}
