use async_trait::async_trait;
use mtnstat_common::{Result, ScrapedStatus};
use mtnstat_config::MountainConfig;
use tokio_util::sync::CancellationToken;

/// Single uniform contract behind which all three strategy implementations
/// hide.
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn scrape(
        &self,
        cfg: &MountainConfig,
        cancel: &CancellationToken,
    ) -> Result<ScrapedStatus>;
}
