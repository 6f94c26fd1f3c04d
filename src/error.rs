//! Error types for the history engine

use thiserror::Error;

/// Main error type returned by the engine
#[derive(Error, Debug)]
pub enum Error {
    /// The caller passed an invalid range, bucket option or function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A value could not be cast to the series' declared format
    #[error("Format error: {0}")]
    Format(String),

    /// The series is not known to the sample source
    #[error("Series not found: {0}")]
    SeriesNotFound(String),

    /// Sample source or persistence failure
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Shorthand for an [`Error::InvalidArgument`]
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// Whether this error was caused by the caller's arguments
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownSeries(name) => Error::SeriesNotFound(name),
            other => Error::Store(other),
        }
    }
}

/// Sample source errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// The named series does not exist
    #[error("Unknown series: {0}")]
    UnknownSeries(String),

    /// A series with this name already exists
    #[error("Series already exists: {0}")]
    SeriesExists(String),

    /// The source yielded samples out of timestamp order
    #[error("Samples out of order in {series}: {timestamp} after {previous}")]
    OutOfOrder {
        /// Series being read
        series: String,
        /// Timestamp of the previous sample
        previous: i64,
        /// Timestamp of the offending sample
        timestamp: i64,
    },

    /// The backing store is unavailable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Any other backend failure
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Cache store errors
///
/// These never reach the caller of `history` or `insert`; the engine logs
/// them and degrades to uncached operation.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Connection to the cache backend failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// A cache command timed out
    #[error("Command timeout")]
    Timeout,

    /// Entry could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Entry could not be decoded
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
