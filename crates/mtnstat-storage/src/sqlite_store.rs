//! In-memory SQLite backend used only to exercise the relational storage
//! invariants (idempotent insert, retention cleanup, latest-per-mountain
//! dedup) without a real Postgres server, the way `DownloadState::open_memory`
//! backs the downloader's own state-store tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use mtnstat_common::{MountainId, Result, RunId, RunStatus, ScrapedStatus};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use crate::store::{RunStats, SaveManyOutcome, StatusStore};

const SCHEMA_SQL: &str = r#"
CREATE TABLE mountain_status (
    mountain_id TEXT NOT NULL,
    is_open INTEGER NOT NULL,
    percent_open INTEGER,
    lifts_open INTEGER NOT NULL,
    lifts_total INTEGER NOT NULL,
    runs_open INTEGER NOT NULL,
    runs_total INTEGER NOT NULL,
    acres_open REAL,
    acres_total REAL,
    message TEXT,
    source_url TEXT NOT NULL,
    data_url TEXT NOT NULL,
    scraped_at TEXT NOT NULL,
    PRIMARY KEY (mountain_id, scraped_at)
);

CREATE TABLE scraper_runs (
    run_id TEXT PRIMARY KEY,
    triggered_by TEXT NOT NULL,
    total_mountains INTEGER NOT NULL,
    successful_count INTEGER NOT NULL DEFAULT 0,
    failed_count INTEGER NOT NULL DEFAULT 0,
    duration_ms INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    error_message TEXT
);

CREATE TABLE scrape_failures (
    run_id TEXT NOT NULL,
    mountain_id TEXT NOT NULL,
    error_message TEXT NOT NULL,
    source_url TEXT NOT NULL,
    failed_at TEXT NOT NULL
);
"#;

/// Test-only relational store. Same shape and idempotency rules as
/// `PostgresStore`, backed by `sqlx::SqlitePool` instead.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().filename(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        for statement in SCHEMA_SQL.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(&pool).await?;
        }

        Ok(Self { pool })
    }
}

#[async_trait]
impl StatusStore for SqliteStore {
    async fn start_run(&self, total: u32, triggered_by: &str) -> Result<RunId> {
        let run_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO scraper_runs (run_id, triggered_by, total_mountains, status, started_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(run_id.to_string())
        .bind(triggered_by)
        .bind(total as i64)
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
            "UPDATE scraper_runs SET status = ?, successful_count = ?, failed_count = ?, \
             duration_ms = ?, completed_at = ? WHERE run_id = ?",
        )
        .bind(RunStatus::Completed.as_str())
        .bind(successful as i64)
        .bind(failed as i64)
        .bind(duration_ms as i64)
        .bind(Utc::now())
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_run(&self, run_id: RunId, error_message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE scraper_runs SET status = ?, error_message = ?, completed_at = ? \
             WHERE run_id = ?",
        )
        .bind(RunStatus::Failed.as_str())
        .bind(error_message)
        .bind(Utc::now())
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save(&self, status: &ScrapedStatus) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO mountain_status \
             (mountain_id, is_open, percent_open, lifts_open, lifts_total, runs_open, runs_total, \
              acres_open, acres_total, message, source_url, data_url, scraped_at) \
             VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?) \
             ON CONFLICT (mountain_id, scraped_at) DO NOTHING",
        )
        .bind(&status.mountain_id)
        .bind(status.is_open)
        .bind(status.percent_open.map(|p| p as i64))
        .bind(status.lifts_open as i64)
        .bind(status.lifts_total as i64)
        .bind(status.runs_open as i64)
        .bind(status.runs_total as i64)
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
                Err(_) => outcome.failed += 1,
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
        sqlx::query(
            "INSERT INTO scrape_failures (run_id, mountain_id, error_message, source_url, failed_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(run_id.to_string())
        .bind(mountain_id)
        .bind(error_message)
        .bind(source_url)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_latest(&self, id: &MountainId) -> Result<Option<ScrapedStatus>> {
        let row = sqlx::query_as::<_, StatusRow>(
            "SELECT * FROM mountain_status WHERE mountain_id = ? \
             ORDER BY scraped_at DESC LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn get_all_latest(&self) -> Result<Vec<ScrapedStatus>> {
        let rows = sqlx::query_as::<_, StatusRow>(
            "SELECT mountain_id, is_open, percent_open, lifts_open, lifts_total, runs_open, \
             runs_total, acres_open, acres_total, message, source_url, data_url, scraped_at \
             FROM ( \
                 SELECT *, ROW_NUMBER() OVER ( \
                     PARTITION BY mountain_id ORDER BY scraped_at DESC \
                 ) AS rn FROM mountain_status \
             ) WHERE rn = 1",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_history(&self, id: &MountainId, days: u32) -> Result<Vec<ScrapedStatus>> {
        let since = Utc::now() - ChronoDuration::days(days as i64);
        let rows = sqlx::query_as::<_, StatusRow>(
            "SELECT * FROM mountain_status WHERE mountain_id = ? AND scraped_at >= ? \
             ORDER BY scraped_at DESC",
        )
        .bind(id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn stats(&self) -> Result<RunStats> {
        let row = sqlx::query(
            "SELECT COUNT(DISTINCT mountain_id) AS mountains, COUNT(*) AS entries FROM mountain_status",
        )
        .fetch_one(&self.pool)
        .await?;
        let total_mountains: i64 = row.get("mountains");
        let total_entries: i64 = row.get("entries");

        let recent = sqlx::query(
            "SELECT COUNT(*) AS n, AVG(successful_count) AS avg_s, AVG(failed_count) AS avg_f, \
             AVG(duration_ms) AS avg_d FROM scraper_runs WHERE started_at >= ?",
        )
        .bind(Utc::now() - ChronoDuration::days(7))
        .fetch_one(&self.pool)
        .await?;

        Ok(RunStats {
            total_mountains: total_mountains as u64,
            total_entries: total_entries as u64,
            recent_run_count: recent.get::<i64, _>("n") as u64,
            avg_successful: recent.try_get::<f64, _>("avg_s").unwrap_or(0.0),
            avg_failed: recent.try_get::<f64, _>("avg_f").unwrap_or(0.0),
            avg_duration_ms: recent.try_get::<f64, _>("avg_d").unwrap_or(0.0),
        })
    }

    async fn cleanup(&self) -> Result<u64> {
        let cutoff = Utc::now() - ChronoDuration::days(90);
        let result = sqlx::query("DELETE FROM mountain_status WHERE scraped_at < ?")
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
    percent_open: Option<i64>,
    lifts_open: i64,
    lifts_total: i64,
    runs_open: i64,
    runs_total: i64,
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDur;

    fn status(mountain_id: &str, scraped_at: DateTime<Utc>) -> ScrapedStatus {
        ScrapedStatus {
            mountain_id: mountain_id.to_string(),
            is_open: true,
            percent_open: Some(80),
            lifts_open: 8,
            lifts_total: 10,
            runs_open: 70,
            runs_total: 82,
            acres_open: None,
            acres_total: None,
            message: None,
            source_url: "https://example.test".to_string(),
            data_url: "https://example.test".to_string(),
            scraped_at,
        }
    }

    #[tokio::test]
    async fn duplicate_scraped_at_is_swallowed_not_upserted() {
        let store = SqliteStore::open_memory().await.unwrap();
        let at = Utc::now();
        let first = status("alpine", at);
        let mut second = status("alpine", at);
        second.lifts_open = 3;

        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();

        let latest = store.get_latest(&"alpine".to_string()).await.unwrap().unwrap();
        assert_eq!(latest.lifts_open, 8, "second insert must not overwrite the first");
    }

    #[tokio::test]
    async fn get_all_latest_returns_one_row_per_mountain() {
        let store = SqliteStore::open_memory().await.unwrap();
        let now = Utc::now();

        store.save(&status("alpine", now - ChronoDur::hours(2))).await.unwrap();
        store.save(&status("alpine", now)).await.unwrap();
        store.save(&status("summit", now - ChronoDur::minutes(5))).await.unwrap();

        let latest = store.get_all_latest().await.unwrap();
        assert_eq!(latest.len(), 2);
        let alpine = latest.iter().find(|s| s.mountain_id == "alpine").unwrap();
        assert_eq!(alpine.scraped_at, now);
    }

    #[tokio::test]
    async fn cleanup_deletes_only_records_older_than_90_days() {
        let store = SqliteStore::open_memory().await.unwrap();
        let now = Utc::now();

        for day in [120, 95, 91, 89, 30, 0] {
            store
                .save(&status("alpine", now - ChronoDur::days(day)))
                .await
                .unwrap();
        }

        let deleted = store.cleanup().await.unwrap();
        assert_eq!(deleted, 3, "120/95/91 day old records should be removed");

        let remaining = store.get_history(&"alpine".to_string(), 365).await.unwrap();
        assert_eq!(remaining.len(), 3);
        assert!(remaining.iter().all(|s| now - s.scraped_at < ChronoDur::days(90)));
    }

    #[tokio::test]
    async fn run_lifecycle_records_completed_and_failed_status() {
        let store = SqliteStore::open_memory().await.unwrap();

        let completed_run = store.start_run(3, "test").await.unwrap();
        store.complete_run(completed_run, 2, 1, 500).await.unwrap();

        let failed_run = store.start_run(3, "test").await.unwrap();
        store.fail_run(failed_run, "orchestration deadline exceeded").await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.recent_run_count, 2);
    }
}
