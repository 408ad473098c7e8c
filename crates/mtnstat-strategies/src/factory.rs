use mtnstat_config::{MountainConfig, StrategyParams};
use mtnstat_fetch::Fetcher;
use std::sync::Arc;

use crate::{HeadlessBrowserScraper, JsonApiScraper, Scraper, StaticHtmlScraper};

/// Maps a config's declared strategy tag to a constructed scraper. The
/// headless scraper is constructed lazily by its own engine field, not by
/// this factory, so importing it costs nothing until a scrape actually runs.
pub fn create_scraper(
    cfg: &MountainConfig,
    fetcher: Fetcher,
    headless: Arc<HeadlessBrowserScraper>,
) -> Arc<dyn Scraper> {
    match &cfg.strategy {
        StrategyParams::StaticHtml(_) => Arc::new(StaticHtmlScraper::new(fetcher)),
        StrategyParams::JsonApi(_) => Arc::new(JsonApiScraper::new(fetcher)),
        StrategyParams::HeadlessBrowser(_) => headless,
    }
}
