use chrono::{DateTime, Utc};
use mtnstat_common::{Result, ScrapedStatus};
use mtnstat_config::ConfigRegistry;
use mtnstat_storage::StatusStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::cache::TtlCache;
use crate::providers::{SnowTelemetryProvider, WeatherProvider};

const LAPSE_RATE_F_PER_1000FT: f64 = 3.5;
const REFERENCE_ELEVATION_FT: f64 = 0.0;
const SNAPSHOT_TTL: Duration = Duration::from_secs(600);

/// Read-side document blending the latest scraped status with derived
/// weather metrics, served from cache with stale-while-revalidate.
#[derive(Debug, Clone, Serialize)]
pub struct MountainSnapshot {
    pub mountain_id: String,
    pub display_name: String,
    pub status: Option<ScrapedStatus>,
    pub temperature_estimate_f: Option<f64>,
    pub rain_risk_score: Option<f64>,
    pub powder_score: Option<f64>,
    pub powder_verdict: Option<String>,
    pub data_sources: HashMap<String, bool>,
    pub generated_at: DateTime<Utc>,
}

/// One read-side function fanning out to the store and external weather
/// providers, combining them into a snapshot, and memoizing it.
pub struct Aggregator {
    registry: Arc<ConfigRegistry>,
    store: Arc<dyn StatusStore>,
    weather: Arc<dyn WeatherProvider>,
    snow: Arc<dyn SnowTelemetryProvider>,
    cache: Arc<TtlCache<Arc<MountainSnapshot>>>,
}

impl Aggregator {
    pub fn new(
        registry: Arc<ConfigRegistry>,
        store: Arc<dyn StatusStore>,
        weather: Arc<dyn WeatherProvider>,
        snow: Arc<dyn SnowTelemetryProvider>,
    ) -> Self {
        Self {
            registry,
            store,
            weather,
            snow,
            cache: Arc::new(TtlCache::with_default_ttl()),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_mountain_snapshot(&self, id: &str) -> Result<Option<Arc<MountainSnapshot>>> {
        let Some(cfg) = self.registry.get(id) else {
            return Ok(None);
        };
        let mountain_id = cfg.id.clone();
        let display_name = cfg.display_name.clone();
        let canonical_url = cfg.canonical_url.clone();

        let store = self.store.clone();
        let weather = self.weather.clone();
        let snow = self.snow.clone();

        let snapshot = self
            .cache
            .with_cache(&mountain_id.clone(), SNAPSHOT_TTL, move || {
                let mountain_id = mountain_id.clone();
                async move {
                    Ok(Arc::new(
                        build_snapshot(&mountain_id, &display_name, &canonical_url, store, weather, snow)
                            .await,
                    ))
                }
            })
            .await?;

        Ok(Some(snapshot))
    }

    /// Evicts expired, non-refreshing snapshot entries. Meant to be driven by
    /// a periodic timer, not called on the request path.
    pub fn sweep_cache(&self) {
        self.cache.sweep();
    }
}

async fn build_snapshot(
    mountain_id: &str,
    display_name: &str,
    canonical_url: &str,
    store: Arc<dyn StatusStore>,
    weather: Arc<dyn WeatherProvider>,
    snow: Arc<dyn SnowTelemetryProvider>,
) -> MountainSnapshot {
    let mut data_sources = HashMap::new();
    let mountain_id_owned = mountain_id.to_string();

    let (status_result, weather_result, snow_result) = tokio::join!(
        store.get_latest(&mountain_id_owned),
        weather.current_conditions(canonical_url),
        snow.latest_reading(canonical_url),
    );

    let status = match status_result {
        Ok(s) => {
            data_sources.insert("scraped_status".to_string(), s.is_some());
            s
        }
        Err(_) => {
            data_sources.insert("scraped_status".to_string(), false);
            None
        }
    };

    data_sources.insert("weather".to_string(), weather_result.is_some());
    data_sources.insert("snow_telemetry".to_string(), snow_result.is_some());

    let temperature_estimate_f = weather_result
        .as_ref()
        .map(|w| lapse_rate_estimate(w.temperature_f, REFERENCE_ELEVATION_FT));

    let rain_risk_score = weather_result.as_ref().map(|w| rain_risk(w.freezing_level_ft));

    let powder_score = weather_result
        .as_ref()
        .map(|w| powder_score(w, rain_risk_score.unwrap_or(0.0)));

    let powder_verdict = powder_score.map(verdict_for_score);

    MountainSnapshot {
        mountain_id: mountain_id.to_string(),
        display_name: display_name.to_string(),
        status,
        temperature_estimate_f,
        rain_risk_score,
        powder_score,
        powder_verdict,
        data_sources,
        generated_at: Utc::now(),
    }
}

/// Per-elevation temperature estimate via a fixed lapse rate anchored at a
/// reference elevation.
fn lapse_rate_estimate(base_temp_f: f64, target_elevation_ft: f64) -> f64 {
    let delta_1000ft = (target_elevation_ft - REFERENCE_ELEVATION_FT) / 1000.0;
    base_temp_f - delta_1000ft * LAPSE_RATE_F_PER_1000FT
}

/// Rain-risk score from freezing level: low freezing levels mean snow, high
/// freezing levels (relative to typical base/summit elevations) mean rain.
fn rain_risk(freezing_level_ft: f64) -> f64 {
    let risk = (freezing_level_ft - 4000.0) / 4000.0;
    risk.clamp(0.0, 10.0)
}

/// Weighted composite: 24h snowfall, 48h snowfall, temperature, wind, rain
/// risk, clamped to [0, 10].
fn powder_score(weather: &crate::providers::WeatherReading, rain_risk: f64) -> f64 {
    let snow_24h_component = (weather.snowfall_24h_in / 12.0 * 10.0).min(10.0);
    let snow_48h_component = (weather.snowfall_48h_in / 24.0 * 10.0).min(10.0);
    let temp_component = if weather.temperature_f < 32.0 { 10.0 } else { 3.0 };
    let wind_penalty = (weather.wind_mph / 30.0 * 10.0).min(10.0);
    let rain_penalty = rain_risk;

    let raw = snow_24h_component * 0.35
        + snow_48h_component * 0.25
        + temp_component * 0.15
        + (10.0 - wind_penalty) * 0.15
        + (10.0 - rain_penalty) * 0.10;

    raw.clamp(0.0, 10.0)
}

fn verdict_for_score(score: f64) -> String {
    match score {
        s if s >= 8.0 => "epic".to_string(),
        s if s >= 6.0 => "great".to_string(),
        s if s >= 4.0 => "good".to_string(),
        s if s >= 2.0 => "marginal".to_string(),
        _ => "poor".to_string(),
    }
}
