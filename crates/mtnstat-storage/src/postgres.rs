use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use mtnstat_common::{MountainId, Result, RunId, RunStatus, ScrapedStatus};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::store::{RunStats, SaveManyOutcome, StatusStore};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS mountain_status (
    mountain_id TEXT NOT NULL,
    is_open BOOLEAN NOT NULL,
    percent_open SMALLINT,
    lifts_open INT NOT NULL,
    lifts_total INT NOT NULL,
    runs_open INT NOT NULL,
    runs_total INT NOT NULL,
    acres_open DOUBLE PRECISION,
    acres_total DOUBLE PRECISION,
    message TEXT,
    source_url TEXT NOT NULL,
    data_url TEXT NOT NULL,
    scraped_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (mountain_id, scraped_at)
);

CREATE INDEX IF NOT EXISTS idx_mountain_status_latest
    ON mountain_status (mountain_id, scraped_at DESC);

CREATE TABLE IF NOT EXISTS scraper_runs (
    run_id UUID PRIMARY KEY,
    triggered_by TEXT NOT NULL,
    total_mountains INT NOT NULL,
    successful_count INT NOT NULL DEFAULT 0,
    failed_count INT NOT NULL DEFAULT 0,
    duration_ms BIGINT NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    started_at TIMESTAMPTZ NOT NULL,
    completed_at TIMESTAMPTZ,
    error_message TEXT
);

CREATE TABLE IF NOT EXISTS scrape_failures (
    run_id UUID NOT NULL,
    mountain_id TEXT NOT NULL,
    error_message TEXT NOT NULL,
    source_url TEXT NOT NULL,
    failed_at TIMESTAMPTZ NOT NULL
);
"#;

/// Relational backend: a Postgres-equivalent append-only store.
pub struct PostgresStore {
    pool: PgPool,
    failure_table_exists: OnceCell<bool>,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool,
            failure_table_exists: OnceCell::new(),
        })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            failure_table_exists: OnceCell::new(),
        }
    }

    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA_SQL.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn failure_table_exists(&self) -> bool {
        *self
            .failure_table_exists
            .get_or_init(|| async {
                sqlx::query("SELECT to_regclass('public.scrape_failures') IS NOT NULL AS exists")
                    .fetch_one(&self.pool)
                    .await
                    .map(|row| row.get::<bool, _>("exists"))
                    .unwrap_or(false)
            })
            .await
    }
}

#[async_trait]
impl StatusStore for PostgresStore {
    #[instrument(skip(self))]
    async fn start_run(&self, total: u32, triggered_by: &str) -> Result<RunId> {
        let run_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO scraper_runs (run_id, triggered_by, total_mountains, status, started_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(run_id)
        .bind(triggered_by)
        .bind(total as i32)
        .bind(RunStatus::Running.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(run_id)
    }

    async fn complete_run(
        &self,
        run_id: RunId,
        successful: u32,
        failed: u32,
        duration_ms: u64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE scraper_runs SET status = $1, successful_count = $2, failed_count = $3, \
             duration_ms = $4, completed_at = $5 WHERE run_id = $6",
        )
        .bind(RunStatus::Completed.as_str())
        .bind(successful as i32)
        .bind(failed as i32)
        .bind(duration_ms as i64)
        .bind(Utc::now())
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_run(&self, run_id: RunId, error_message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE scraper_runs SET status = $1, error_message = $2, completed_at = $3 \
             WHERE run_id = $4",
        )
        .bind(RunStatus::Failed.as_str())
        .bind(error_message)
        .bind(Utc::now())
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, status), fields(mountain_id = %status.mountain_id))]
    async fn save(&self, status: &ScrapedStatus) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO mountain_status \
             (mountain_id, is_open, percent_open, lifts_open, lifts_total, runs_open, runs_total, \
              acres_open, acres_total, message, source_url, data_url, scraped_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13) \
             ON CONFLICT (mountain_id, scraped_at) DO NOTHING",
        )
        .bind(&status.mountain_id)
        .bind(status.is_open)
        .bind(status.percent_open.map(|p| p as i16))
        .bind(status.lifts_open as i32)
        .bind(status.lifts_total as i32)
        .bind(status.runs_open as i32)
        .bind(status.runs_total as i32)
        .bind(status.acres_open)
        .bind(status.acres_total)
        .bind(&status.message)
        .bind(&status.source_url)
        .bind(&status.data_url)
        .bind(status.scraped_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            info!(mountain_id = %status.mountain_id, scraped_at = %status.scraped_at, "duplicate status insert swallowed");
        }
        Ok(())
    }

    async fn save_many(&self, statuses: &[ScrapedStatus]) -> SaveManyOutcome {
        let mut outcome = SaveManyOutcome::default();
        for status in statuses {
            match self.save(status).await {
                Ok(()) => outcome.saved += 1,
                Err(e) if e.is_swallowed() => outcome.duplicates += 1,
                Err(e) => {
                    warn!(mountain_id = %status.mountain_id, error = %e, "failed to save status");
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }

    async fn save_failure(
        &self,
        run_id: RunId,
        mountain_id: &str,
        error_message: &str,
        source_url: &str,
    ) -> Result<()> {
        if !self.failure_table_exists().await {
            return Ok(());
        }
        let result = sqlx::query(
            "INSERT INTO scrape_failures (run_id, mountain_id, error_message, source_url, failed_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(run_id)
        .bind(mountain_id)
        .bind(error_message)
        .bind(source_url)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(error = %e, "failed to persist failure record; treating as best effort");
        }
        Ok(())
    }

    async fn get_latest(&self, id: &MountainId) -> Result<Option<ScrapedStatus>> {
        let row = sqlx::query_as::<_, StatusRow>(
            "SELECT * FROM mountain_status WHERE mountain_id = $1 \
             ORDER BY scraped_at DESC LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn get_all_latest(&self) -> Result<Vec<ScrapedStatus>> {
        let rows = sqlx::query_as::<_, StatusRow>(
            "SELECT DISTINCT ON (mountain_id) * FROM mountain_status \
             ORDER BY mountain_id, scraped_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_history(&self, id: &MountainId, days: u32) -> Result<Vec<ScrapedStatus>> {
        let since = Utc::now() - ChronoDuration::days(days as i64);
        let rows = sqlx::query_as::<_, StatusRow>(
            "SELECT * FROM mountain_status WHERE mountain_id = $1 AND scraped_at >= $2 \
             ORDER BY scraped_at DESC",
        )
        .bind(id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn stats(&self) -> Result<RunStats> {
        let totals: (i64, i64) = sqlx::query_as(
            "SELECT COUNT(DISTINCT mountain_id), COUNT(*) FROM mountain_status",
        )
        .fetch_one(&self.pool)
        .await?;

        let recent: (i64, Option<f64>, Option<f64>, Option<f64>) = sqlx::query_as(
            "SELECT COUNT(*), AVG(successful_count), AVG(failed_count), AVG(duration_ms) \
             FROM scraper_runs WHERE started_at >= $1",
        )
        .bind(Utc::now() - ChronoDuration::days(7))
        .fetch_one(&self.pool)
        .await?;

        Ok(RunStats {
            total_mountains: totals.0 as u64,
            total_entries: totals.1 as u64,
            recent_run_count: recent.0 as u64,
            avg_successful: recent.1.unwrap_or(0.0),
            avg_failed: recent.2.unwrap_or(0.0),
            avg_duration_ms: recent.3.unwrap_or(0.0),
        })
    }

    async fn cleanup(&self) -> Result<u64> {
        let cutoff = Utc::now() - ChronoDuration::days(90);
        let result = sqlx::query("DELETE FROM mountain_status WHERE scraped_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct StatusRow {
    mountain_id: String,
    is_open: bool,
    percent_open: Option<i16>,
    lifts_open: i32,
    lifts_total: i32,
    runs_open: i32,
    runs_total: i32,
    acres_open: Option<f64>,
    acres_total: Option<f64>,
    message: Option<String>,
    source_url: String,
    data_url: String,
    scraped_at: DateTime<Utc>,
}

impl From<StatusRow> for ScrapedStatus {
    fn from(row: StatusRow) -> Self {
        ScrapedStatus {
            mountain_id: row.mountain_id,
            is_open: row.is_open,
            percent_open: row.percent_open.map(|p| p as u8),
            lifts_open: row.lifts_open as u32,
            lifts_total: row.lifts_total as u32,
            runs_open: row.runs_open as u32,
            runs_total: row.runs_total as u32,
            acres_open: row.acres_open,
            acres_total: row.acres_total,
            message: row.message,
            source_url: row.source_url,
            data_url: row.data_url,
            scraped_at: row.scraped_at,
        }
    }
}
