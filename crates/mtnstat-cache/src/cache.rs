use chrono::Utc;
use dashmap::DashMap;
use mtnstat_common::{CacheEntry, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

const DEFAULT_TTL: Duration = Duration::from_secs(600);
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// A value read via `get_stale`: present data plus whether it has expired.
pub struct StaleRead<V> {
    pub data: V,
    pub is_stale: bool,
}

/// Process-wide, concurrency-safe keyed cache with TTL expiry and
/// single-flight stale-while-revalidate refresh.
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    refreshing: DashMap<String, ()>,
    default_ttl: Duration,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            refreshing: DashMap::new(),
            default_ttl,
        }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(DEFAULT_TTL)
    }

    /// Returns the entry only if it has not expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.is_expired(Utc::now()) {
            None
        } else {
            Some(entry.data.clone())
        }
    }

    /// Returns the entry if present at all, flagging staleness.
    pub fn get_stale(&self, key: &str) -> Option<StaleRead<V>> {
        let entry = self.entries.get(key)?;
        let is_stale = entry.is_expired(Utc::now());
        Some(StaleRead {
            data: entry.data.clone(),
            is_stale,
        })
    }

    pub fn insert(&self, key: &str, data: V, ttl: Duration) {
        let now = Utc::now();
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                data,
                inserted_at: now,
                expires_at: now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()),
            },
        );
    }

    /// Removes entries that are expired and currently have no in-flight
    /// refresh, run on a periodic ~5 minute sweep.
    pub fn sweep(&self) {
        let now = Utc::now();
        self.entries.retain(|key, entry| {
            !(entry.is_expired(now) && !self.refreshing.contains_key(key))
        });
    }

    pub fn sweep_interval() -> Duration {
        SWEEP_INTERVAL
    }
}

/// Interval between periodic cache sweeps, independent of cache value type.
pub fn sweep_interval() -> Duration {
    SWEEP_INTERVAL
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Fresh hit: return cached. Stale hit: return stale immediately and
    /// spawn (at most once per key, concurrently) a background refresh.
    /// Miss: run `fetcher` synchronously, store, return.
    #[instrument(skip(self, fetcher))]
    pub async fn with_cache<F, Fut>(
        self: &Arc<Self>,
        key: &str,
        ttl: Duration,
        fetcher: F,
    ) -> Result<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        if let Some(fresh) = self.get(key) {
            return Ok(fresh);
        }

        if let Some(stale) = self.get_stale(key) {
            if stale.is_stale {
                self.maybe_spawn_refresh(key, ttl, fetcher);
                return Ok(stale.data);
            }
            return Ok(stale.data);
        }

        let value = fetcher().await?;
        self.insert(key, value.clone(), ttl);
        Ok(value)
    }

    fn maybe_spawn_refresh<F, Fut>(self: &Arc<Self>, key: &str, ttl: Duration, fetcher: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        // Single-flight: only the caller that wins the insert race spawns a
        // refresh; later concurrent callers during the same stale window
        // just return the stale value.
        if self.refreshing.insert(key.to_string(), ()).is_some() {
            return;
        }

        let cache = Arc::clone(self);
        let key = key.to_string();
        tokio::spawn(async move {
            match fetcher().await {
                Ok(value) => cache.insert(&key, value, ttl),
                Err(e) => warn!(key = %key, error = %e, "background cache refresh failed"),
            }
            cache.refreshing.remove(&key);
        });
    }
}
