use async_trait::async_trait;
use chrono::Utc;
use mtnstat_common::{MtnError, Result, ScrapedStatus};
use mtnstat_config::{JsonApiParams, MountainConfig, StrategyParams, TransformRule};
use mtnstat_fetch::Fetcher;
use reqwest::Method;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Fetches a JSON endpoint and applies a declarative transform mapping
/// provider paths to the normalized semantic fields.
pub struct JsonApiScraper {
    fetcher: Fetcher,
}

impl JsonApiScraper {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl crate::Scraper for JsonApiScraper {
    #[instrument(skip(self, cfg, cancel), fields(mountain_id = %cfg.id))]
    async fn scrape(
        &self,
        cfg: &MountainConfig,
        cancel: &CancellationToken,
    ) -> Result<ScrapedStatus> {
        let params = match &cfg.strategy {
            StrategyParams::JsonApi(p) => p,
            other => {
                return Err(MtnError::StrategyUnsupported(format!(
                    "json api scraper invoked for strategy {}",
                    other.name()
                )))
            }
        };

        let method = match params.method {
            mtnstat_config::HttpMethod::Get => Method::GET,
            mtnstat_config::HttpMethod::Post => Method::POST,
        };

        let resp = self
            .fetcher
            .fetch(&params.endpoint, method, &params.headers, None, cancel)
            .await?;

        let body: Value = serde_json::from_slice(&resp.body)
            .map_err(|e| MtnError::UpstreamError {
                status: resp.status,
                message: format!("non-JSON response body: {e}"),
            })?;

        Ok(apply_transform(
            &body,
            params,
            &cfg.id,
            &cfg.canonical_url,
            cfg.data_url(),
        ))
    }
}

fn lookup<'a>(body: &'a Value, dotted_path: &str) -> Option<&'a Value> {
    let mut cursor = body;
    for segment in dotted_path.split('.') {
        cursor = cursor.get(segment)?;
    }
    Some(cursor)
}

fn as_u32(value: &Value) -> Option<u32> {
    value.as_u64().map(|v| v as u32).or_else(|| {
        value
            .as_str()
            .and_then(|s| s.parse::<u32>().ok())
    })
}

/// Applies the config's transform, then merges with safe defaults (missing
/// counts -> 0, missing `is_open` -> false, missing `percent_open` -> absent).
pub fn apply_transform(
    body: &Value,
    params: &JsonApiParams,
    mountain_id: &str,
    source_url: &str,
    data_url: &str,
) -> ScrapedStatus {
    let mut lifts_open = 0u32;
    let mut lifts_total = 0u32;
    let mut runs_open = 0u32;
    let mut runs_total = 0u32;
    let mut percent_open = None;
    let mut is_open = false;
    let mut message = None;

    for (field, rule) in &params.transform {
        match rule {
            TransformRule::Path { path } => {
                if let Some(v) = lookup(body, path) {
                    match field.as_str() {
                        "lifts_open" => lifts_open = as_u32(v).unwrap_or(0),
                        "lifts_total" => lifts_total = as_u32(v).unwrap_or(0),
                        "runs_open" => runs_open = as_u32(v).unwrap_or(0),
                        "runs_total" => runs_total = as_u32(v).unwrap_or(0),
                        "message" => message = v.as_str().map(|s| s.to_string()),
                        _ => {}
                    }
                }
            }
            TransformRule::Ratio {
                open_path,
                total_path,
            } => {
                let open = lookup(body, open_path).and_then(as_u32).unwrap_or(0);
                let total = lookup(body, total_path).and_then(as_u32).unwrap_or(0);
                match field.as_str() {
                    "lifts_open" => {
                        lifts_open = open;
                        lifts_total = total;
                    }
                    "runs_open" => {
                        runs_open = open;
                        runs_total = total;
                    }
                    _ => {}
                }
            }
            TransformRule::Percent { path } => {
                if field == "percent_open" {
                    percent_open = lookup(body, path).and_then(as_u32).map(|v| v.min(100) as u8);
                }
            }
            TransformRule::PresenceBool { path } => {
                if field == "is_open" {
                    is_open = lookup(body, path)
                        .map(|v| v.as_bool().unwrap_or(!v.is_null()))
                        .unwrap_or(false);
                }
            }
        }
    }

    ScrapedStatus {
        mountain_id: mountain_id.to_string(),
        is_open,
        percent_open,
        lifts_open,
        lifts_total,
        runs_open,
        runs_total,
        acres_open: None,
        acres_total: None,
        message,
        source_url: source_url.to_string(),
        data_url: data_url.to_string(),
        scraped_at: Utc::now(),
    }
}
