//! History engine: sample sources, the engine itself and its builder

pub mod builder;
pub mod memory;
pub mod series;
pub mod traits;

pub use builder::SeriesEngineBuilder;
pub use memory::InMemorySampleSource;
pub use series::{EngineStats, EngineStatsSnapshot, InvalidationPolicy, SeriesEngine};
pub use traits::{SampleSource, SampleStream};
