//! Read-through cache for visit statistics
//!
//! Three derived values are cached per path: the global total, the path's
//! count and the path's share of all visits. A new visit deletes the keys of
//! the path it was recorded for; everything else ages out with the store's
//! expiry.

use async_trait::async_trait;
use cached::{Cached, TimedCache};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{CacheConfig, LOCMEM_SCHEME};
use crate::db::Database;

pub const TOTAL_KEY: &str = "visits:total";

pub fn path_count_key(path: &str) -> String {
    format!("visits:path_count:{path}")
}

pub fn path_percentage_key(path: &str) -> String {
    format!("visits:path_percentage:{path}")
}

/// Keys that depend on visits recorded for `path`
pub fn keys_for_path(path: &str) -> [String; 3] {
    [TOTAL_KEY.to_string(), path_count_key(path), path_percentage_key(path)]
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheValue {
    Count(i64),
    Percentage(f64),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("unsupported cache backend: {0}")]
    UnsupportedBackend(String),
    #[error("failed to compute visit statistics: {0}")]
    Source(#[from] anyhow::Error),
}

/// Time-bounded key-value store holding derived statistics
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<CacheValue>;
    async fn set(&self, key: &str, value: CacheValue);
    async fn delete_many(&self, keys: &[String]);
}

/// In-process store; entries expire `timeout_secs` after being set
pub struct MemoryCache {
    inner: Mutex<TimedCache<String, CacheValue>>,
}

impl MemoryCache {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            inner: Mutex::new(TimedCache::with_lifespan(timeout_secs)),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Option<CacheValue> {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        cache.cache_get(key).copied()
    }

    async fn set(&self, key: &str, value: CacheValue) {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        cache.cache_set(key.to_string(), value);
    }

    async fn delete_many(&self, keys: &[String]) {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        for key in keys {
            cache.cache_remove(key);
        }
    }
}

/// Build the store named by the configured cache URL
pub fn store_from_config(config: &CacheConfig) -> Result<Arc<dyn CacheStore>, CacheError> {
    if config.url.starts_with(LOCMEM_SCHEME) {
        Ok(Arc::new(MemoryCache::new(config.timeout_secs)))
    } else {
        Err(CacheError::UnsupportedBackend(config.url.clone()))
    }
}

/// Source of the counts the cache recomputes on a miss
#[async_trait]
pub trait VisitCounts: Send + Sync {
    async fn total_count(&self) -> anyhow::Result<i64>;
    async fn path_count(&self, path: &str) -> anyhow::Result<i64>;
}

#[async_trait]
impl VisitCounts for Database {
    async fn total_count(&self) -> anyhow::Result<i64> {
        self.get_total_count().await
    }

    async fn path_count(&self, path: &str) -> anyhow::Result<i64> {
        self.get_path_count(path).await
    }
}

/// Share of `count` in `total` as a percentage rounded to two decimals.
///
/// Ties round to even, so 0.625 becomes 0.62.
pub fn percentage(count: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let raw = 100.0 * count as f64 / total as f64;
    (raw * 100.0).round_ties_even() / 100.0
}

/// Visit statistics with read-through caching.
///
/// Concurrent misses may recompute the same key; the last write wins.
#[derive(Clone)]
pub struct VisitCache {
    store: Arc<dyn CacheStore>,
    counts: Arc<dyn VisitCounts>,
}

impl VisitCache {
    pub fn new(store: Arc<dyn CacheStore>, counts: Arc<dyn VisitCounts>) -> Self {
        Self { store, counts }
    }

    pub async fn total_count(&self) -> Result<i64, CacheError> {
        if let Some(CacheValue::Count(count)) = self.store.get(TOTAL_KEY).await {
            return Ok(count);
        }
        debug!("cache miss: {}", TOTAL_KEY);
        let count = self.counts.total_count().await?;
        self.store.set(TOTAL_KEY, CacheValue::Count(count)).await;
        Ok(count)
    }

    pub async fn path_count(&self, path: &str) -> Result<i64, CacheError> {
        let key = path_count_key(path);
        if let Some(CacheValue::Count(count)) = self.store.get(&key).await {
            return Ok(count);
        }
        debug!("cache miss: {}", key);
        let count = self.counts.path_count(path).await?;
        self.store.set(&key, CacheValue::Count(count)).await;
        Ok(count)
    }

    pub async fn path_percentage(&self, path: &str) -> Result<f64, CacheError> {
        let key = path_percentage_key(path);
        if let Some(CacheValue::Percentage(value)) = self.store.get(&key).await {
            return Ok(value);
        }
        debug!("cache miss: {}", key);
        let total = self.total_count().await?;
        let value = if total == 0 {
            0.0
        } else {
            percentage(self.path_count(path).await?, total)
        };
        self.store.set(&key, CacheValue::Percentage(value)).await;
        Ok(value)
    }

    /// Drop the cached values affected by a visit to `path`
    pub async fn invalidate_path(&self, path: &str) {
        self.store.delete_many(&keys_for_path(path)).await;
    }

    /// Collected stats for a page, zeroed when the counts cannot be computed
    pub async fn page_stats(&self, path: &str) -> PageStats {
        let stats = async {
            Ok::<_, CacheError>(PageStats {
                page_visit_count: self.path_count(path).await?,
                total_visit_count: self.total_count().await?,
                page_visit_percentage: self.path_percentage(path).await?,
            })
        };
        match stats.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Failed to load visit stats for {}: {}", path, e);
                PageStats::default()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct PageStats {
    pub page_visit_count: i64,
    pub total_visit_count: i64,
    pub page_visit_percentage: f64,
}
