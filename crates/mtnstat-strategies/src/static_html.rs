use async_trait::async_trait;
use chrono::Utc;
use mtnstat_common::{MtnError, Result, ScrapedStatus};
use mtnstat_config::{MountainConfig, StaticHtmlParams, StrategyParams};
use mtnstat_fetch::Fetcher;
use scraper::{Html, Selector};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::parsing::{derive_is_open, parse_percent, parse_ratio};

/// Cheerio-style DOM querying via CSS selectors plus the ratio/percent
/// parsers, per the static-HTML strategy.
pub struct StaticHtmlScraper {
    fetcher: Fetcher,
}

impl StaticHtmlScraper {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl crate::Scraper for StaticHtmlScraper {
    #[instrument(skip(self, cfg, cancel), fields(mountain_id = %cfg.id))]
    async fn scrape(
        &self,
        cfg: &MountainConfig,
        cancel: &CancellationToken,
    ) -> Result<ScrapedStatus> {
        let params = match &cfg.strategy {
            StrategyParams::StaticHtml(p) => p,
            other => {
                return Err(MtnError::StrategyUnsupported(format!(
                    "static html scraper invoked for strategy {}",
                    other.name()
                )))
            }
        };

        let url = cfg.data_url().to_string();
        let resp = self.fetcher.get(&url, &HashMap::new(), cancel).await?;
        let body = String::from_utf8_lossy(&resp.body).into_owned();

        let status = extract(&body, params, &cfg.id, &cfg.canonical_url, &url)?;
        Ok(status)
    }
}

/// Parses an already-fetched HTML document against the configured
/// selectors. Split out from `scrape` so the headless strategy can reuse it.
pub fn extract(
    body: &str,
    params: &StaticHtmlParams,
    mountain_id: &str,
    source_url: &str,
    data_url: &str,
) -> Result<ScrapedStatus> {
    let document = Html::parse_document(body);

    let (lifts_open, lifts_total) = ratio_field(&document, params, "lifts_open");
    let (runs_open, runs_total) = ratio_field(&document, params, "runs_open");
    let percent_open = text_field(&document, params, "percent_open")
        .and_then(|t| parse_percent(&t));
    let acres = ratio_field_f64(&document, params, "acres_open");
    let status_text = text_field(&document, params, "status").unwrap_or_default();
    let message = text_field(&document, params, "message");

    Ok(ScrapedStatus {
        mountain_id: mountain_id.to_string(),
        is_open: derive_is_open(&status_text),
        percent_open,
        lifts_open,
        lifts_total,
        runs_open,
        runs_total,
        acres_open: acres.map(|(o, _)| o),
        acres_total: acres.map(|(_, t)| t),
        message,
        source_url: source_url.to_string(),
        data_url: data_url.to_string(),
        scraped_at: Utc::now(),
    })
}

fn text_field(document: &Html, params: &StaticHtmlParams, key: &str) -> Option<String> {
    let selector_str = params.selectors.get(key)?;
    let selector = Selector::parse(selector_str).ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
}

fn matched_count(document: &Html, params: &StaticHtmlParams, key: &str) -> usize {
    let Some(selector_str) = params.selectors.get(key) else {
        return 0;
    };
    let Ok(selector) = Selector::parse(selector_str) else {
        return 0;
    };
    document.select(&selector).count()
}

/// Ratio field with a "count open-class nodes" fallback when no numeric
/// ratio text is present.
fn ratio_field(document: &Html, params: &StaticHtmlParams, key: &str) -> (u32, u32) {
    let Some(text) = text_field(document, params, key) else {
        return (0, 0);
    };
    if let Some((open, total)) = parse_ratio(&text) {
        return (open, total);
    }
    let count = matched_count(document, params, key);
    if count > 0 {
        (count as u32, count as u32)
    } else {
        (0, 0)
    }
}

fn ratio_field_f64(document: &Html, params: &StaticHtmlParams, key: &str) -> Option<(f64, f64)> {
    let text = text_field(document, params, key)?;
    let (open, total) = parse_ratio(&text)?;
    Some((open as f64, total as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mtnstat_config::StaticHtmlParams;

    fn params(pairs: &[(&str, &str)]) -> StaticHtmlParams {
        StaticHtmlParams {
            selectors: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn two_sided_ratios_scenario_s1() {
        let html = r#"
            <html><body>
                <div class="lifts">8 / 10</div>
                <div class="runs">70 / 82</div>
                <div class="st">OPEN FOR SEASON</div>
            </body></html>
        "#;
        let p = params(&[
            ("lifts_open", ".lifts"),
            ("runs_open", ".runs"),
            ("status", ".st"),
        ]);
        let status = extract(html, &p, "alpine", "https://a.example", "https://a.example").unwrap();
        assert_eq!(status.lifts_open, 8);
        assert_eq!(status.lifts_total, 10);
        assert_eq!(status.runs_open, 70);
        assert_eq!(status.runs_total, 82);
        assert!(status.is_open);
    }

    #[test]
    fn count_fallback_scenario_s2() {
        let html = r#"
            <html><body>
                <div class="status-open"></div>
                <div class="status-open"></div>
                <div class="status-open"></div>
                <div class="status-open"></div>
                <div class="status-open"></div>
                <div class="status-open"></div>
                <div class="status-open"></div>
                <div class="status-open"></div>
                <div class="status-open"></div>
            </body></html>
        "#;
        let p = params(&[("lifts_open", "div.status-open")]);
        let status = extract(html, &p, "x", "u", "u").unwrap();
        assert_eq!(status.lifts_open, 9);
        assert_eq!(status.lifts_total, 9);
    }

    #[test]
    fn all_zero_counts_is_a_valid_preseason_result() {
        let html = "<html><body><div class=\"st\">Opening Soon</div></body></html>";
        let p = params(&[("status", ".st")]);
        let status = extract(html, &p, "x", "u", "u").unwrap();
        assert_eq!(status.lifts_total, 0);
        assert_eq!(status.runs_total, 0);
    }

    #[test]
    fn malformed_html_yields_best_effort_result_not_an_error() {
        let html = "<div class=\"lifts\">8/10<div>";
        let p = params(&[("lifts_open", ".lifts")]);
        let status = extract(html, &p, "x", "u", "u").unwrap();
        assert_eq!(status.lifts_open, 8);
        assert_eq!(status.lifts_total, 10);
    }
}
