//! Result stores for poll results
//!
//! This module provides a trait-based abstraction for persisting
//! [`MetricResult`](crate::model::MetricResult)s.
//!
//! ## Design
//!
//! - **Trait-based**: `ResultStore` lets the scheduler work against any backend
//! - **Async**: All operations are async for compatibility with Tokio tasks
//! - **Append-only**: Results are inserted and pruned, never updated
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database
//! - **In-Memory**: No persistence, for testing or ephemeral runs
//!
//! ## Usage
//!
//! ```no_run
//! use openmonitor::storage::{ResultStore, sqlite::SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteStore::new("./results.db").await?;
//!     // Hand to the Scheduler as Arc<dyn ResultStore>
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use std::sync::Arc;

pub use backend::{HealthStatus, ResultStore};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;

use crate::config::StorageConfig;

/// Open the store selected in the config file
pub async fn open_store(config: &StorageConfig) -> StorageResult<Arc<dyn ResultStore>> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(MemoryStore::new())),

        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => Ok(Arc::new(sqlite::SqliteStore::new(path).await?)),

        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::ConnectionFailed(
            "sqlite backend requested but the `storage-sqlite` feature is disabled".to_string(),
        )),
    }
}
