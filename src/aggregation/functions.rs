//! Aggregation function identifiers
//!
//! The supported set is closed: `min`, `max`, `first`, `last`, `mean` and
//! `stddev`. Anything else is rejected at parse time with
//! [`Error::InvalidArgument`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Summary function applied to the samples of one bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    /// Smallest value in the bucket
    Min,
    /// Largest value in the bucket
    Max,
    /// Value of the earliest sample in the bucket
    First,
    /// Value of the latest sample in the bucket
    Last,
    /// Arithmetic mean
    Mean,
    /// Population standard deviation (needs at least two samples)
    StdDev,
}

impl AggregateFunction {
    /// Every supported function, in canonical order
    pub const ALL: [AggregateFunction; 6] = [
        AggregateFunction::Min,
        AggregateFunction::Max,
        AggregateFunction::First,
        AggregateFunction::Last,
        AggregateFunction::Mean,
        AggregateFunction::StdDev,
    ];

    /// Canonical lowercase name
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::First => "first",
            AggregateFunction::Last => "last",
            AggregateFunction::Mean => "mean",
            AggregateFunction::StdDev => "stddev",
        }
    }

    /// Parse a list of identifiers, failing on the first unsupported one
    ///
    /// Duplicates are dropped; order of first appearance is kept.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<AggregateFunction>> {
        let mut functions = Vec::with_capacity(names.len());
        for name in names {
            let function: AggregateFunction = name.as_ref().parse()?;
            if !functions.contains(&function) {
                functions.push(function);
            }
        }
        Ok(functions)
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggregateFunction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "min" => Ok(AggregateFunction::Min),
            "max" => Ok(AggregateFunction::Max),
            "first" => Ok(AggregateFunction::First),
            "last" => Ok(AggregateFunction::Last),
            "mean" | "avg" | "average" => Ok(AggregateFunction::Mean),
            "stddev" | "std" => Ok(AggregateFunction::StdDev),
            _ => Err(Error::invalid(format!(
                "'{}' is not a supported aggregation function",
                s
            ))),
        }
    }
}
