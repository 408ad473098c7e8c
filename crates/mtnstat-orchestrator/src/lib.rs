//! Orchestrator: instantiates strategies from configs and runs one
//! mountain, a batch, or all enabled mountains in parallel with per-task
//! failure isolation. Every task is `tokio::spawn`ed eagerly so concurrency
//! within a batch is unrestricted and a panicking strategy cannot poison the
//! batch, with a log-and-continue discipline at every level of the fan-out
//! tree.

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use mtnstat_common::{MountainId, MtnError, Result, RunId, ScrapedStatus};
use mtnstat_config::{ConfigRegistry, MountainConfig};
use mtnstat_fetch::Fetcher;
use mtnstat_storage::StatusStore;
use mtnstat_strategies::{create_scraper, HeadlessBrowserScraper};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Per-scrape timeout, propagated into the fetcher and the headless driver.
pub const PER_TASK_TIMEOUT: Duration = Duration::from_secs(30);
/// Orchestrator-level timeout; on expiry outstanding tasks are cancelled and
/// marked `cancelled`, but already-completed results are preserved.
pub const ORCHESTRATION_TIMEOUT: Duration = Duration::from_secs(50);

/// Result of one task in an orchestrated run.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub success: bool,
    pub status: Option<ScrapedStatus>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Result of `run_one`/`run_batch`/`run_all`.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub total: u32,
    pub successful: u32,
    pub failed: u32,
    pub duration_ms: u64,
    pub per_mountain: HashMap<MountainId, TaskOutcome>,
}

pub struct Orchestrator {
    registry: Arc<ConfigRegistry>,
    store: Arc<dyn StatusStore>,
    fetcher: Fetcher,
    headless: Arc<HeadlessBrowserScraper>,
}

impl Orchestrator {
    pub fn new(registry: Arc<ConfigRegistry>, store: Arc<dyn StatusStore>) -> Result<Self> {
        Ok(Self {
            registry,
            store,
            fetcher: Fetcher::new()?,
            headless: Arc::new(HeadlessBrowserScraper::new()),
        })
    }

    /// Resolves config and runs it through the same audited fan-out as
    /// `run_batch`/`run_all`, with `total = 1`.
    #[instrument(skip(self))]
    pub async fn run_one(&self, id: &str) -> Result<RunOutcome> {
        let cfg = self
            .registry
            .get(id)
            .ok_or_else(|| MtnError::ConfigMissing(id.to_string()))?
            .clone();
        self.run_configs(vec![cfg], &format!("mountain:{id}")).await
    }

    pub async fn run_batch(&self, n: u32) -> Result<RunOutcome> {
        let configs: Vec<MountainConfig> = self
            .registry
            .by_batch(n)
            .into_iter()
            .cloned()
            .collect();
        self.run_configs(configs, &format!("batch:{n}")).await
    }

    pub async fn run_all(&self) -> Result<RunOutcome> {
        let configs: Vec<MountainConfig> = self.registry.enabled().into_iter().cloned().collect();
        self.run_configs(configs, "all").await
    }

    /// Runs every config to completion, within a batch concurrency is
    /// unrestricted: every task is `tokio::spawn`ed immediately so a
    /// panicking strategy cannot poison the batch (`JoinError` becomes a
    /// failed `TaskOutcome`, never propagated), and all tasks run in
    /// parallel rather than being gated by a pool size.
    #[instrument(skip(self, configs))]
    async fn run_configs(&self, configs: Vec<MountainConfig>, trigger: &str) -> Result<RunOutcome> {
        let total = configs.len() as u32;
        let run_id = self.store.start_run(total, trigger).await?;
        let overall_start = std::time::Instant::now();
        let cancel = CancellationToken::new();

        let mut handles = FuturesUnordered::new();
        for cfg in configs {
            let cancel = cancel.clone();
            let store = self.store.clone();
            let fetcher = self.fetcher.clone();
            let headless = self.headless.clone();
            let id_for_panic = cfg.id.clone();

            let join_handle = tokio::spawn(async move {
                let scraper = create_scraper(&cfg, fetcher, headless);
                let outcome = run_scraper(&*scraper, &cfg, &cancel).await;

                match &outcome.status {
                    Some(status) => {
                        if let Err(e) = store.save(status).await {
                            if !e.is_swallowed() {
                                warn!(mountain_id = %cfg.id, error = %e, "failed to save status");
                            }
                        }
                    }
                    None => {
                        if let Some(err) = &outcome.error {
                            let _ = store
                                .save_failure(run_id, &cfg.id, err, &cfg.canonical_url)
                                .await;
                        }
                    }
                }

                (cfg.id.clone(), outcome)
            });

            handles.push(async move {
                match join_handle.await {
                    Ok(pair) => pair,
                    Err(join_err) => {
                        warn!(mountain_id = %id_for_panic, error = %join_err, "scrape task panicked or was aborted");
                        (
                            id_for_panic,
                            TaskOutcome {
                                success: false,
                                status: None,
                                error: Some(format!("task failure: {join_err}")),
                                duration_ms: 0,
                                timestamp: Utc::now(),
                            },
                        )
                    }
                }
            });
        }

        let deadline = tokio::time::Instant::now() + ORCHESTRATION_TIMEOUT;
        let mut per_mountain = HashMap::new();
        let mut deadline_exceeded = false;

        loop {
            match tokio::time::timeout_at(deadline, handles.next()).await {
                Ok(Some((id, outcome))) => {
                    per_mountain.insert(id, outcome);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!("orchestration deadline exceeded; cancelling outstanding tasks");
                    deadline_exceeded = true;
                    cancel.cancel();
                    while let Some((id, outcome)) = handles.next().await {
                        per_mountain.insert(id, outcome);
                    }
                    break;
                }
            }
        }

        let successful = per_mountain.values().filter(|o| o.success).count() as u32;
        let failed = total - successful;
        let duration_ms = overall_start.elapsed().as_millis() as u64;

        if deadline_exceeded {
            let message = format!(
                "orchestration deadline of {ORCHESTRATION_TIMEOUT:?} exceeded: {successful} succeeded, {failed} failed or incomplete"
            );
            self.store.fail_run(run_id, &message).await?;
            warn!(run_id = %run_id, total, successful, failed, duration_ms, "run failed: deadline exceeded");
        } else {
            self.store
                .complete_run(run_id, successful, failed, duration_ms)
                .await?;
            info!(run_id = %run_id, total, successful, failed, duration_ms, "run completed");
        }

        Ok(RunOutcome {
            run_id,
            total,
            successful,
            failed,
            duration_ms,
            per_mountain,
        })
    }
}

async fn run_scraper(
    scraper: &dyn mtnstat_strategies::Scraper,
    cfg: &MountainConfig,
    cancel: &CancellationToken,
) -> TaskOutcome {
    let start = std::time::Instant::now();
    let result = tokio::time::timeout(PER_TASK_TIMEOUT, scraper.scrape(cfg, cancel)).await;

    let timestamp = Utc::now();
    let duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(status)) => TaskOutcome {
            success: true,
            status: Some(status),
            error: None,
            duration_ms,
            timestamp,
        },
        Ok(Err(e)) => TaskOutcome {
            success: false,
            status: None,
            error: Some(format!("{}: {e}", e.kind())),
            duration_ms,
            timestamp,
        },
        Err(_) => TaskOutcome {
            success: false,
            status: None,
            error: Some("timeout: per-task deadline exceeded".to_string()),
            duration_ms,
            timestamp,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mtnstat_common::MtnError;
    use mtnstat_config::{MountainConfig, StaticHtmlParams, StrategyParams};
    use mtnstat_storage::{RunStats, SaveManyOutcome};
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex;

    struct FakeStore {
        saved: Mutex<Vec<ScrapedStatus>>,
    }

    #[async_trait]
    impl StatusStore for FakeStore {
        async fn start_run(&self, _total: u32, _triggered_by: &str) -> Result<RunId> {
            Ok(uuid::Uuid::new_v4())
        }
        async fn complete_run(&self, _run_id: RunId, _successful: u32, _failed: u32, _duration_ms: u64) -> Result<()> {
            Ok(())
        }
        async fn fail_run(&self, _run_id: RunId, _error_message: &str) -> Result<()> {
            Ok(())
        }
        async fn save(&self, status: &ScrapedStatus) -> Result<()> {
            self.saved.lock().unwrap().push(status.clone());
            Ok(())
        }
        async fn save_many(&self, _statuses: &[ScrapedStatus]) -> SaveManyOutcome {
            SaveManyOutcome::default()
        }
        async fn save_failure(&self, _run_id: RunId, _mountain_id: &str, _error_message: &str, _source_url: &str) -> Result<()> {
            Ok(())
        }
        async fn get_latest(&self, _id: &MountainId) -> Result<Option<ScrapedStatus>> {
            Ok(None)
        }
        async fn get_all_latest(&self) -> Result<Vec<ScrapedStatus>> {
            Ok(vec![])
        }
        async fn get_history(&self, _id: &MountainId, _days: u32) -> Result<Vec<ScrapedStatus>> {
            Ok(vec![])
        }
        async fn stats(&self) -> Result<RunStats> {
            Ok(RunStats {
                total_mountains: 0,
                total_entries: 0,
                recent_run_count: 0,
                avg_successful: 0.0,
                avg_failed: 0.0,
                avg_duration_ms: 0.0,
            })
        }
        async fn cleanup(&self) -> Result<u64> {
            Ok(0)
        }
    }

    fn static_cfg(id: &str) -> MountainConfig {
        MountainConfig {
            id: id.to_string(),
            display_name: id.to_string(),
            canonical_url: format!("https://{id}.example"),
            data_url: None,
            strategy: StrategyParams::StaticHtml(StaticHtmlParams {
                selectors: StdHashMap::new(),
            }),
            enabled: true,
            batch: Some(1),
        }
    }

    #[tokio::test]
    async fn run_all_returns_a_result_for_every_enabled_config() {
        let configs = vec![static_cfg("a"), static_cfg("b"), static_cfg("c")];
        let registry = Arc::new(ConfigRegistry::from_configs(configs).unwrap());
        let store: Arc<dyn StatusStore> = Arc::new(FakeStore {
            saved: Mutex::new(vec![]),
        });
        let orchestrator = Orchestrator::new(registry.clone(), store).unwrap();

        let outcome = orchestrator.run_all().await.unwrap();
        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.per_mountain.len(), registry.enabled().len());
    }

    #[test]
    fn mtn_error_kind_matches_timeout() {
        assert_eq!(MtnError::Timeout.kind(), "timeout");
    }

    struct PanicScraper;

    #[async_trait]
    impl mtnstat_strategies::Scraper for PanicScraper {
        async fn scrape(
            &self,
            _cfg: &MountainConfig,
            _cancel: &CancellationToken,
        ) -> Result<ScrapedStatus> {
            panic!("strategy exploded");
        }
    }

    #[tokio::test]
    async fn a_panicking_task_is_isolated_and_reported_as_a_failure() {
        let cfg = static_cfg("panics");
        let cancel = CancellationToken::new();

        let join_handle = tokio::spawn(async move {
            let scraper = PanicScraper;
            run_scraper(&scraper, &cfg, &cancel).await
        });

        let join_err = join_handle.await.unwrap_err();
        assert!(join_err.is_panic(), "task should have panicked rather than returned");
    }

    struct SlowScraper;

    #[async_trait]
    impl mtnstat_strategies::Scraper for SlowScraper {
        async fn scrape(
            &self,
            _cfg: &MountainConfig,
            _cancel: &CancellationToken,
        ) -> Result<ScrapedStatus> {
            tokio::time::sleep(PER_TASK_TIMEOUT * 2).await;
            unreachable!("should have timed out first");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn a_slow_task_times_out_without_blocking_the_others() {
        let slow_cfg = static_cfg("slow");
        let cancel = CancellationToken::new();

        let slow = tokio::spawn(async move {
            let scraper = SlowScraper;
            run_scraper(&scraper, &slow_cfg, &cancel).await
        });

        tokio::time::advance(PER_TASK_TIMEOUT + Duration::from_secs(1)).await;

        let outcome = slow.await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("timeout: per-task deadline exceeded"));
    }
}
