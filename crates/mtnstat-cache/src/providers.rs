use async_trait::async_trait;

/// Current-conditions reading from a NOAA-equivalent weather adapter.
#[derive(Debug, Clone)]
pub struct WeatherReading {
    pub temperature_f: f64,
    pub wind_mph: f64,
    pub freezing_level_ft: f64,
    pub snowfall_24h_in: f64,
    pub snowfall_48h_in: f64,
}

/// Snow telemetry reading from a SNOTEL-equivalent adapter.
#[derive(Debug, Clone)]
pub struct SnowTelemetryReading {
    pub snow_depth_in: f64,
    pub snow_water_equivalent_in: f64,
}

/// Third-party weather/snow APIs are out of scope; this interface exists so
/// a real adapter can be substituted without touching the Aggregator. The
/// default implementation returns `None`, matching "each subquery is
/// independently fallible; absent data does not fail the snapshot."
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current_conditions(&self, canonical_url: &str) -> Option<WeatherReading>;
}

#[async_trait]
pub trait SnowTelemetryProvider: Send + Sync {
    async fn latest_reading(&self, canonical_url: &str) -> Option<SnowTelemetryReading>;
}

/// No-op provider used when no real adapter is configured.
pub struct NullWeatherProvider;

#[async_trait]
impl WeatherProvider for NullWeatherProvider {
    async fn current_conditions(&self, _canonical_url: &str) -> Option<WeatherReading> {
        None
    }
}

pub struct NullSnowTelemetryProvider;

#[async_trait]
impl SnowTelemetryProvider for NullSnowTelemetryProvider {
    async fn latest_reading(&self, _canonical_url: &str) -> Option<SnowTelemetryReading> {
        None
    }
}
