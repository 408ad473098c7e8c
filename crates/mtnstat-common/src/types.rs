use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable slug identifying a resort's scraping contract.
pub type MountainId = String;

/// Opaque run identifier.
pub type RunId = Uuid;

/// Output of one scrape, persisted append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapedStatus {
    pub mountain_id: MountainId,
    pub is_open: bool,
    pub percent_open: Option<u8>,
    pub lifts_open: u32,
    pub lifts_total: u32,
    pub runs_open: u32,
    pub runs_total: u32,
    pub acres_open: Option<f64>,
    pub acres_total: Option<f64>,
    pub message: Option<String>,
    pub source_url: String,
    pub data_url: String,
    pub scraped_at: DateTime<Utc>,
}

impl ScrapedStatus {
    /// Derived, not stored: lifts known to be closed.
    pub fn lifts_closed(&self) -> u32 {
        self.lifts_total.saturating_sub(self.lifts_open)
    }

    /// Derived, not stored: runs known to be closed.
    pub fn runs_closed(&self) -> u32 {
        self.runs_total.saturating_sub(self.runs_open)
    }
}

/// Audit record for one orchestrated run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub triggered_by: String,
    pub total_mountains: u32,
    pub successful_count: u32,
    pub failed_count: u32,
    pub duration_ms: u64,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Persisted when the failure-log table exists; best-effort otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub run_id: RunId,
    pub mountain_id: MountainId,
    pub error_message: String,
    pub source_url: String,
    pub failed_at: DateTime<Utc>,
}

/// In-process cache entry (Aggregator).
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub inserted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
