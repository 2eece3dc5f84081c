//! Result store trait definition
//!
//! This module defines the `ResultStore` trait that every storage
//! implementation must implement.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use crate::model::MetricResult;
use crate::time::TimeDetail;

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Persistence of poll results
///
/// Results are append-only: a store inserts them and later deletes them once
/// they fall out of their metric's retention window, but never updates one.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; one store is shared by every firing
/// task.
///
/// ## Error Handling
///
/// Methods return `StorageResult<T>`. Implementations convert
/// backend-specific errors into `StorageError` variants.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Append a single result
    async fn insert(&self, result: &MetricResult) -> StorageResult<()>;

    /// Delete every result of the metric older than `now - retention`
    ///
    /// Results inside the window are untouched, so running this twice in a
    /// row without new data deletes nothing the second time.
    ///
    /// Returns the number of results deleted.
    async fn delete_older_than(
        &self,
        component_id: &str,
        metric_id: &str,
        retention: TimeDetail,
    ) -> StorageResult<usize>;

    /// Get the `limit` most recent results of a metric, oldest first
    async fn query_latest(
        &self,
        component_id: &str,
        metric_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<MetricResult>>;

    /// Check backend health
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}

/// Oldest timestamp that is still inside a retention window ending now
pub fn retention_cutoff(retention: TimeDetail) -> DateTime<Utc> {
    Utc::now() - retention.as_chrono()
}
