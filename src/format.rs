//! Casting aggregated values to a series' declared format
//!
//! Aggregation always runs on `f64`. Before rows leave the engine every value
//! is cast to the [`ValueFormat`] of its series:
//!
//! - `Integer` truncates toward zero
//! - `Float` passes the value through
//! - `Decimal` rounds half away from zero to the configured precision
//! - `Raw` renders the value as text
//!
//! Non-finite values and values outside the target range fail with
//! [`Error::Format`].

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::types::ValueFormat;

/// A value cast to its series format
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SeriesValue {
    /// Integer series value
    Integer(i64),
    /// Floating-point series value
    Float(f64),
    /// Fixed-precision decimal series value
    Decimal(FixedDecimal),
    /// Raw series value
    Raw(String),
}

impl SeriesValue {
    /// Numeric view of the value, `None` for unparsable raw text
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SeriesValue::Integer(v) => Some(*v as f64),
            SeriesValue::Float(v) => Some(*v),
            SeriesValue::Decimal(d) => Some(d.to_f64()),
            SeriesValue::Raw(s) => s.parse().ok(),
        }
    }
}

impl fmt::Display for SeriesValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesValue::Integer(v) => write!(f, "{}", v),
            SeriesValue::Float(v) => write!(f, "{}", v),
            SeriesValue::Decimal(d) => write!(f, "{}", d),
            SeriesValue::Raw(s) => f.write_str(s),
        }
    }
}

/// Decimal number stored as `mantissa * 10^-scale`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedDecimal {
    mantissa: i64,
    scale: u32,
}

impl FixedDecimal {
    /// Round `value` half away from zero to `scale` fractional digits
    pub fn from_f64(value: f64, scale: u32) -> Result<Self> {
        if scale > ValueFormat::MAX_PRECISION {
            return Err(Error::Format(format!(
                "decimal precision {} exceeds {}",
                scale,
                ValueFormat::MAX_PRECISION
            )));
        }
        let scaled = (value * 10f64.powi(scale as i32)).round();
        let mantissa = checked_i64(scaled)
            .ok_or_else(|| Error::Format(format!("{} does not fit decimal({})", value, scale)))?;
        Ok(Self { mantissa, scale })
    }

    /// Unscaled integer representation
    pub fn mantissa(&self) -> i64 {
        self.mantissa
    }

    /// Number of fractional digits
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Approximate floating-point value
    pub fn to_f64(&self) -> f64 {
        self.mantissa as f64 / 10f64.powi(self.scale as i32)
    }
}

impl fmt::Display for FixedDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let abs = self.mantissa.unsigned_abs();
        if self.scale == 0 {
            return write!(f, "{}{}", sign, abs);
        }
        let divisor = 10u64.pow(self.scale);
        write!(
            f,
            "{}{}.{:0width$}",
            sign,
            abs / divisor,
            abs % divisor,
            width = self.scale as usize
        )
    }
}

// Decimals go over the wire as strings so no precision is lost in JSON
impl Serialize for FixedDecimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Convert a finite, already-integral f64 into i64 without wrapping
fn checked_i64(value: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which itself does not fit
    if value.is_finite() && value >= i64::MIN as f64 && value < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

/// Cast an aggregated value to the given series format
pub fn cast(value: f64, format: ValueFormat) -> Result<SeriesValue> {
    if !value.is_finite() {
        return Err(Error::Format(format!(
            "non-finite value {} cannot be cast to {}",
            value, format
        )));
    }

    match format {
        ValueFormat::Integer => checked_i64(value.trunc())
            .map(SeriesValue::Integer)
            .ok_or_else(|| Error::Format(format!("{} does not fit an integer", value))),
        ValueFormat::Float => Ok(SeriesValue::Float(value)),
        ValueFormat::Decimal { precision } => {
            FixedDecimal::from_f64(value, precision).map(SeriesValue::Decimal)
        },
        ValueFormat::Raw => Ok(SeriesValue::Raw(value.to_string())),
    }
}

impl FromStr for ValueFormat {
    type Err = Error;

    /// Parse `int`, `float`, `raw`, `decimal` or `decimal:<precision>`
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "int" | "integer" => return Ok(ValueFormat::Integer),
            "flo" | "float" => return Ok(ValueFormat::Float),
            "raw" => return Ok(ValueFormat::Raw),
            "dec" | "decimal" => return Ok(ValueFormat::decimal()),
            _ => {},
        }

        if let Some(precision) = lower
            .strip_prefix("decimal:")
            .or_else(|| lower.strip_prefix("dec:"))
        {
            let precision: u32 = precision
                .parse()
                .map_err(|_| Error::invalid(format!("invalid decimal precision '{}'", precision)))?;
            if precision > ValueFormat::MAX_PRECISION {
                return Err(Error::invalid(format!(
                    "decimal precision {} exceeds {}",
                    precision,
                    ValueFormat::MAX_PRECISION
                )));
            }
            return Ok(ValueFormat::Decimal { precision });
        }

        Err(Error::invalid(format!("unknown value format '{}'", s)))
    }
}
