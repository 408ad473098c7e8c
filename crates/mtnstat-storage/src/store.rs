use async_trait::async_trait;
use mtnstat_common::{MountainId, Result, RunId, ScrapedStatus};

/// Aggregate stats for `stats()`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunStats {
    pub total_mountains: u64,
    pub total_entries: u64,
    pub recent_run_count: u64,
    pub avg_successful: f64,
    pub avg_failed: f64,
    pub avg_duration_ms: f64,
}

/// Outcome of `save_many`: per-record inserts never abort the batch.
#[derive(Debug, Clone, Default)]
pub struct SaveManyOutcome {
    pub saved: u32,
    pub duplicates: u32,
    pub failed: u32,
}

/// Backend-agnostic persistence contract. Two implementations accept this
/// interface interchangeably: a relational (Postgres-equivalent) backend and
/// a wide-column (DynamoDB-equivalent) backend whose read path only serves
/// the latest record per mountain.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn start_run(&self, total: u32, triggered_by: &str) -> Result<RunId>;
    async fn complete_run(&self, run_id: RunId, successful: u32, failed: u32, duration_ms: u64) -> Result<()>;
    async fn fail_run(&self, run_id: RunId, error_message: &str) -> Result<()>;

    /// Idempotent insert keyed by `(mountain_id, scraped_at)`. A duplicate
    /// key conflict is swallowed and logged, never raised to the caller.
    async fn save(&self, status: &ScrapedStatus) -> Result<()>;

    async fn save_many(&self, statuses: &[ScrapedStatus]) -> SaveManyOutcome;

    /// Best-effort; if the failure table does not exist, this is a no-op.
    async fn save_failure(
        &self,
        run_id: RunId,
        mountain_id: &str,
        error_message: &str,
        source_url: &str,
    ) -> Result<()>;

    async fn get_latest(&self, id: &MountainId) -> Result<Option<ScrapedStatus>>;
    async fn get_all_latest(&self) -> Result<Vec<ScrapedStatus>>;
    async fn get_history(&self, id: &MountainId, days: u32) -> Result<Vec<ScrapedStatus>>;
    async fn stats(&self) -> Result<RunStats>;

    /// Deletes records older than 90 days; returns the deleted count.
    async fn cleanup(&self) -> Result<u64>;
}
