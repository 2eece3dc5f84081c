//! In-memory result store (no persistence)
//!
//! Useful for:
//! - Testing without database dependencies
//! - Running the scheduler when results only need to be observed live
//!
//! All data is lost on restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, ResultStore, retention_cutoff};
use super::error::{StorageError, StorageResult};
use crate::model::MetricResult;
use crate::time::TimeDetail;

/// Results keyed by `(component_id, metric_id)`, in insertion order
type ResultMap = HashMap<(String, String), Vec<MetricResult>>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    results: RwLock<ResultMap>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored results across all metrics
    pub async fn len(&self) -> usize {
        self.results.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

fn key(component_id: &str, metric_id: &str) -> (String, String) {
    (component_id.to_string(), metric_id.to_string())
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn insert(&self, result: &MetricResult) -> StorageResult<()> {
        self.ensure_open()?;

        self.results
            .write()
            .await
            .entry(key(&result.component_id, &result.metric_id))
            .or_default()
            .push(result.clone());

        Ok(())
    }

    async fn delete_older_than(
        &self,
        component_id: &str,
        metric_id: &str,
        retention: TimeDetail,
    ) -> StorageResult<usize> {
        self.ensure_open()?;

        let cutoff = retention_cutoff(retention);
        let mut results = self.results.write().await;

        let Some(stored) = results.get_mut(&key(component_id, metric_id)) else {
            return Ok(0);
        };

        let before = stored.len();
        stored.retain(|result| result.timestamp >= cutoff);
        let deleted = before - stored.len();

        debug!("deleted {deleted} results of {component_id}/{metric_id} older than {cutoff}");
        Ok(deleted)
    }

    async fn query_latest(
        &self,
        component_id: &str,
        metric_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<MetricResult>> {
        self.ensure_open()?;

        let results = self.results.read().await;
        let latest = results
            .get(&key(component_id, metric_id))
            .map(|stored| {
                let skip = stored.len().saturating_sub(limit);
                stored[skip..].to_vec()
            })
            .unwrap_or_default();

        Ok(latest)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let healthy = !self.closed.load(Ordering::Acquire);

        Ok(HealthStatus {
            healthy,
            message: if healthy {
                "In-memory storage operational".to_string()
            } else {
                "In-memory storage closed".to_string()
            },
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("total_results".to_string(), self.len().await.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory store");
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
