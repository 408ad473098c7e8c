use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use mtnstat_common::{MtnError, Result, ScrapedStatus};
use mtnstat_config::{MountainConfig, StaticHtmlParams, StrategyParams};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Launches a headless browser, navigates, waits for network idle, then
/// evaluates the same selector set as the static-HTML strategy. The engine
/// is a lazily-initialized process-wide singleton: a process whose configs
/// never select this strategy never pays the cost of starting it.
pub struct HeadlessBrowserScraper {
    engine: OnceCell<Arc<Browser>>,
}

impl HeadlessBrowserScraper {
    pub fn new() -> Self {
        Self {
            engine: OnceCell::new(),
        }
    }

    async fn engine(&self) -> Result<Arc<Browser>> {
        if let Some(existing) = self.engine.get() {
            return Ok(existing.clone());
        }

        let config = BrowserConfig::builder()
            .build()
            .map_err(|e| MtnError::HeadlessInitFailed(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| MtnError::HeadlessInitFailed(e.to_string()))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let browser = Arc::new(browser);
        // Another task may have raced us; either value is a valid, live
        // browser, so a lost race just drops the redundant one.
        let _ = self.engine.set(browser.clone());
        Ok(browser)
    }
}

impl Default for HeadlessBrowserScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl crate::Scraper for HeadlessBrowserScraper {
    #[instrument(skip(self, cfg, cancel), fields(mountain_id = %cfg.id))]
    async fn scrape(
        &self,
        cfg: &MountainConfig,
        cancel: &CancellationToken,
    ) -> Result<ScrapedStatus> {
        let params = match &cfg.strategy {
            StrategyParams::HeadlessBrowser(p) => p,
            other => {
                return Err(MtnError::StrategyUnsupported(format!(
                    "headless scraper invoked for strategy {}",
                    other.name()
                )))
            }
        };

        let browser = self.engine().await?;
        let url = cfg.data_url().to_string();
        let grace = Duration::from_secs(params.grace_secs);
        let wait_network_idle = params.wait_network_idle;

        let render = async {
            let page = browser
                .new_page(url.as_str())
                .await
                .map_err(|e| MtnError::NetworkError(e.to_string()))?;

            if wait_network_idle {
                if let Err(e) = page.wait_for_navigation().await {
                    warn!(error = %e, "navigation wait failed, proceeding with best-effort content");
                }
            }

            tokio::time::sleep(grace).await;

            let content = page
                .content()
                .await
                .map_err(|e| MtnError::ParseError(e.to_string()))?;

            if let Err(e) = page.close().await {
                warn!(error = %e, "failed to close headless page");
            }

            Ok::<String, MtnError>(content)
        };

        let content = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MtnError::Cancelled),
            result = timeout(NAVIGATION_TIMEOUT, render) => {
                result.map_err(|_| MtnError::Timeout)??
            }
        };

        let static_params = StaticHtmlParams {
            selectors: params.selectors.clone(),
        };
        crate::static_html::extract(&content, &static_params, &cfg.id, &cfg.canonical_url, &url)
    }
}
