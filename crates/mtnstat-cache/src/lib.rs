//! Aggregator / Cache: TTL-based memoization with stale-while-revalidate and
//! single-flight refresh coalescing, plus the mountain snapshot assembler
//! that uses it.

mod cache;
mod providers;
mod snapshot;

pub use cache::{sweep_interval as cache_sweep_interval, StaleRead, TtlCache};
pub use providers::{
    NullSnowTelemetryProvider, NullWeatherProvider, SnowTelemetryProvider, SnowTelemetryReading,
    WeatherProvider, WeatherReading,
};
pub use snapshot::{Aggregator, MountainSnapshot};
