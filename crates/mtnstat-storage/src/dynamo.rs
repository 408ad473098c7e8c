use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Utc};
use mtnstat_common::{MountainId, MtnError, Result, RunId, RunStatus, ScrapedStatus};
use std::collections::{HashMap, HashSet};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::store::{RunStats, SaveManyOutcome, StatusStore};

/// Wide-column backend whose read path keys by `mountain_id` and scans
/// descending by `scraped_at` with `limit=1`. A reader-only secondary
/// backend: `get_history`, `stats`, and `cleanup` are not implemented on
/// top of a single-item-per-mountain access pattern and are documented as
/// such rather than faked with a synthetic schema.
pub struct DynamoStore {
    client: Client,
    table_name: String,
    runs_table_name: String,
}

impl DynamoStore {
    pub async fn connect(table_name: impl Into<String>, runs_table_name: impl Into<String>) -> Self {
        let config = aws_config::load_from_env().await;
        let client = Client::new(&config);
        Self {
            client,
            table_name: table_name.into(),
            runs_table_name: runs_table_name.into(),
        }
    }

    pub fn with_client(client: Client, table_name: impl Into<String>, runs_table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
            runs_table_name: runs_table_name.into(),
        }
    }
}

fn status_to_item(status: &ScrapedStatus) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::new();
    item.insert(
        "mountain_id".to_string(),
        AttributeValue::S(status.mountain_id.clone()),
    );
    item.insert(
        "scraped_at".to_string(),
        AttributeValue::S(status.scraped_at.to_rfc3339()),
    );
    item.insert("is_open".to_string(), AttributeValue::Bool(status.is_open));
    if let Some(p) = status.percent_open {
        item.insert("percent_open".to_string(), AttributeValue::N(p.to_string()));
    }
    item.insert("lifts_open".to_string(), AttributeValue::N(status.lifts_open.to_string()));
    item.insert("lifts_total".to_string(), AttributeValue::N(status.lifts_total.to_string()));
    item.insert("runs_open".to_string(), AttributeValue::N(status.runs_open.to_string()));
    item.insert("runs_total".to_string(), AttributeValue::N(status.runs_total.to_string()));
    if let Some(a) = status.acres_open {
        item.insert("acres_open".to_string(), AttributeValue::N(a.to_string()));
    }
    if let Some(a) = status.acres_total {
        item.insert("acres_total".to_string(), AttributeValue::N(a.to_string()));
    }
    if let Some(m) = &status.message {
        item.insert("message".to_string(), AttributeValue::S(m.clone()));
    }
    item.insert("source_url".to_string(), AttributeValue::S(status.source_url.clone()));
    item.insert("data_url".to_string(), AttributeValue::S(status.data_url.clone()));
    item
}

fn item_to_status(item: &HashMap<String, AttributeValue>) -> Option<ScrapedStatus> {
    let get_s = |k: &str| item.get(k).and_then(|v| v.as_s().ok()).cloned();
    let get_n_u32 = |k: &str| {
        item.get(k)
            .and_then(|v| v.as_n().ok())
            .and_then(|s| s.parse::<u32>().ok())
    };
    let get_n_f64 = |k: &str| {
        item.get(k)
            .and_then(|v| v.as_n().ok())
            .and_then(|s| s.parse::<f64>().ok())
    };
    let get_bool = |k: &str| item.get(k).and_then(|v| v.as_bool().ok()).copied();

    let scraped_at: DateTime<Utc> = get_s("scraped_at")?.parse().ok()?;

    Some(ScrapedStatus {
        mountain_id: get_s("mountain_id")?,
        is_open: get_bool("is_open").unwrap_or(false),
        percent_open: get_n_u32("percent_open").map(|v| v as u8),
        lifts_open: get_n_u32("lifts_open").unwrap_or(0),
        lifts_total: get_n_u32("lifts_total").unwrap_or(0),
        runs_open: get_n_u32("runs_open").unwrap_or(0),
        runs_total: get_n_u32("runs_total").unwrap_or(0),
        acres_open: get_n_f64("acres_open"),
        acres_total: get_n_f64("acres_total"),
        message: get_s("message"),
        source_url: get_s("source_url").unwrap_or_default(),
        data_url: get_s("data_url").unwrap_or_default(),
        scraped_at,
    })
}

#[async_trait]
impl StatusStore for DynamoStore {
    async fn start_run(&self, total: u32, triggered_by: &str) -> Result<RunId> {
        let run_id = Uuid::new_v4();
        self.client
            .put_item()
            .table_name(&self.runs_table_name)
            .item("run_id", AttributeValue::S(run_id.to_string()))
            .item("triggered_by", AttributeValue::S(triggered_by.to_string()))
            .item("total_mountains", AttributeValue::N(total.to_string()))
            .item("status", AttributeValue::S(RunStatus::Running.as_str().to_string()))
            .item("started_at", AttributeValue::S(Utc::now().to_rfc3339()))
            .send()
            .await
            .map_err(|e| MtnError::StorageFailure(e.to_string()))?;
        Ok(run_id)
    }

    async fn complete_run(&self, run_id: RunId, successful: u32, failed: u32, duration_ms: u64) -> Result<()> {
        self.client
            .update_item()
            .table_name(&self.runs_table_name)
            .key("run_id", AttributeValue::S(run_id.to_string()))
            .update_expression(
                "SET #s = :status, successful_count = :ok, failed_count = :failed, \
                 duration_ms = :dur, completed_at = :done",
            )
            .expression_attribute_names("#s", "status")
            .expression_attribute_values(":status", AttributeValue::S(RunStatus::Completed.as_str().to_string()))
            .expression_attribute_values(":ok", AttributeValue::N(successful.to_string()))
            .expression_attribute_values(":failed", AttributeValue::N(failed.to_string()))
            .expression_attribute_values(":dur", AttributeValue::N(duration_ms.to_string()))
            .expression_attribute_values(":done", AttributeValue::S(Utc::now().to_rfc3339()))
            .send()
            .await
            .map_err(|e| MtnError::StorageFailure(e.to_string()))?;
        Ok(())
    }

    async fn fail_run(&self, run_id: RunId, error_message: &str) -> Result<()> {
        self.client
            .update_item()
            .table_name(&self.runs_table_name)
            .key("run_id", AttributeValue::S(run_id.to_string()))
            .update_expression("SET #s = :status, error_message = :err, completed_at = :done")
            .expression_attribute_names("#s", "status")
            .expression_attribute_values(":status", AttributeValue::S(RunStatus::Failed.as_str().to_string()))
            .expression_attribute_values(":err", AttributeValue::S(error_message.to_string()))
            .expression_attribute_values(":done", AttributeValue::S(Utc::now().to_rfc3339()))
            .send()
            .await
            .map_err(|e| MtnError::StorageFailure(e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self, status), fields(mountain_id = %status.mountain_id))]
    async fn save(&self, status: &ScrapedStatus) -> Result<()> {
        let item = status_to_item(status);
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(scraped_at)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.as_service_error().map(|s| s.is_conditional_check_failed_exception()).unwrap_or(false) => {
                info!(mountain_id = %status.mountain_id, "duplicate status put swallowed");
                Err(MtnError::StorageDuplicate {
                    mountain_id: status.mountain_id.clone(),
                    scraped_at: status.scraped_at.to_rfc3339(),
                })
            }
            Err(e) => Err(MtnError::StorageFailure(e.to_string())),
        }
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

    async fn save_failure(&self, _run_id: RunId, _mountain_id: &str, _error_message: &str, _source_url: &str) -> Result<()> {
        // No failure-log table is modeled on the wide-column backend; this
        // mirrors the relational backend's "silently degrade" behavior when
        // the table doesn't exist.
        Ok(())
    }

    async fn get_latest(&self, id: &MountainId) -> Result<Option<ScrapedStatus>> {
        let output = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("mountain_id = :id")
            .expression_attribute_values(":id", AttributeValue::S(id.clone()))
            .scan_index_forward(false)
            .limit(1)
            .send()
            .await
            .map_err(|e| MtnError::StorageFailure(e.to_string()))?;

        Ok(output.items().first().and_then(item_to_status))
    }

    async fn get_all_latest(&self) -> Result<Vec<ScrapedStatus>> {
        // No secondary index over "all partition keys" is modeled; fall
        // back to a full scan, deduplicating by mountain_id client-side,
        // matching the "must fall back to streaming + dedupe" allowance.
        let output = self
            .client
            .scan()
            .table_name(&self.table_name)
            .send()
            .await
            .map_err(|e| MtnError::StorageFailure(e.to_string()))?;

        let mut seen = HashSet::new();
        let mut latest_by_id: HashMap<String, ScrapedStatus> = HashMap::new();
        for item in output.items() {
            if let Some(status) = item_to_status(item) {
                latest_by_id
                    .entry(status.mountain_id.clone())
                    .and_modify(|existing| {
                        if status.scraped_at > existing.scraped_at {
                            *existing = status.clone();
                        }
                    })
                    .or_insert(status.clone());
                seen.insert(status.mountain_id);
            }
        }
        Ok(latest_by_id.into_values().collect())
    }

    async fn get_history(&self, _id: &MountainId, _days: u32) -> Result<Vec<ScrapedStatus>> {
        Err(MtnError::StrategyUnsupported(
            "get_history is not supported on the wide-column backend; it stores latest-per-mountain only".to_string(),
        ))
    }

    async fn stats(&self) -> Result<RunStats> {
        Err(MtnError::StrategyUnsupported(
            "stats is not supported on the wide-column backend".to_string(),
        ))
    }

    async fn cleanup(&self) -> Result<u64> {
        Err(MtnError::StrategyUnsupported(
            "cleanup is not supported on the wide-column backend; it has no retention history to sweep".to_string(),
        ))
    }
}
