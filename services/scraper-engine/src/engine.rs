use anyhow::Result;
use mtnstat_cache::{Aggregator, MountainSnapshot};
use mtnstat_common::{MountainId, ScrapedStatus};
use mtnstat_config::ConfigRegistry;
use mtnstat_orchestrator::{Orchestrator, RunOutcome};
use mtnstat_storage::{RunStats, StatusStore};
use std::sync::Arc;

/// Small façade wiring configuration, storage, orchestration, and the
/// snapshot aggregator together. This is the contract an HTTP adapter would
/// expose; no HTTP routes are mounted here, keeping that surface an
/// external collaborator.
pub struct ScraperEngine {
    registry: Arc<ConfigRegistry>,
    store: Arc<dyn StatusStore>,
    orchestrator: Orchestrator,
    aggregator: Aggregator,
}

impl ScraperEngine {
    pub fn new(
        registry: Arc<ConfigRegistry>,
        store: Arc<dyn StatusStore>,
        orchestrator: Orchestrator,
        aggregator: Aggregator,
    ) -> Self {
        Self {
            registry,
            store,
            orchestrator,
            aggregator,
        }
    }

    pub async fn run_all(&self) -> Result<RunOutcome> {
        Ok(self.orchestrator.run_all().await?)
    }

    pub async fn run_batch(&self, n: u32) -> Result<RunOutcome> {
        Ok(self.orchestrator.run_batch(n).await?)
    }

    pub async fn run_one(&self, id: &str) -> Result<RunOutcome> {
        Ok(self.orchestrator.run_one(id).await?)
    }

    pub async fn get_latest(&self, id: &MountainId) -> Result<Option<ScrapedStatus>> {
        Ok(self.store.get_latest(id).await?)
    }

    pub async fn get_all_latest(&self) -> Result<Vec<ScrapedStatus>> {
        Ok(self.store.get_all_latest().await?)
    }

    pub async fn get_history(&self, id: &MountainId, days: u32) -> Result<Vec<ScrapedStatus>> {
        Ok(self.store.get_history(id, days).await?)
    }

    pub async fn stats(&self) -> Result<RunStats> {
        Ok(self.store.stats().await?)
    }

    pub async fn cleanup(&self) -> Result<u64> {
        Ok(self.store.cleanup().await?)
    }

    pub fn sweep_cache(&self) {
        self.aggregator.sweep_cache();
    }

    pub async fn get_mountain_snapshot(&self, id: &str) -> Result<Option<Arc<MountainSnapshot>>> {
        Ok(self.aggregator.get_mountain_snapshot(id).await?)
    }

    pub fn registry(&self) -> &ConfigRegistry {
        &self.registry
    }
}
