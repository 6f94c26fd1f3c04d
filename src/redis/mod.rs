//! Redis plumbing shared by the Redis cache backend
//!
//! # Key layout
//!
//! ```text
//! {prefix}:{series}:{start}:{end}:{width}   → STRING (JSON bucket rows, SET EX ttl)
//! {prefix}:{series}:keys                    → SET of "{start}:{end}:{width}"
//! ```
//!
//! The default prefix is `tsh`. See [`crate::cache::RedisSeriesCache`].

pub mod connection;
pub mod util;

pub use connection::{RedisConfig, RedisPool, RetryPolicy};
