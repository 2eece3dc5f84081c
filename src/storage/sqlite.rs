//! SQLite result store
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers are not blocked by the constant stream of inserts
//! - **Connection pooling**: Firing tasks share a small pool
//! - **Migrations**: Schema versioning with `sqlx::migrate!`
//!
//! Timestamps are stored as Unix milliseconds, the result value as JSON text.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::backend::{HealthStatus, ResultStore, retention_cutoff};
use super::error::{StorageError, StorageResult};
use crate::model::MetricResult;
use crate::time::TimeDetail;

pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and run migrations
    ///
    /// ```no_run
    /// # use openmonitor::storage::sqlite::SqliteStore;
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = SqliteStore::new("./results.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite result store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("SQLite result store ready");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn millis_to_timestamp(millis: i64) -> StorageResult<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            StorageError::SerializationError(format!("timestamp {millis} out of range"))
        })
    }

    fn row_to_result(row: SqliteRow) -> StorageResult<MetricResult> {
        let value = row
            .try_get::<Option<String>, _>("value")?
            .map(|json| serde_json::from_str(&json))
            .transpose()?;

        Ok(MetricResult {
            metric_id: row.try_get("metric_id")?,
            component_id: row.try_get("component_id")?,
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?)?,
            value,
            timeout: row.try_get("timeout")?,
            response_time: row.try_get::<i64, _>("response_time")?.max(0) as u64,
            status_code: row
                .try_get::<Option<i64>, _>("status_code")?
                .map(|code| code as u16),
        })
    }
}

#[async_trait]
impl ResultStore for SqliteStore {
    #[instrument(skip(self, result), fields(component = %result.component_id, metric = %result.metric_id))]
    async fn insert(&self, result: &MetricResult) -> StorageResult<()> {
        let value = result.value.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO results (
                component_id, metric_id, timestamp, value,
                timeout, response_time, status_code
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&result.component_id)
        .bind(&result.metric_id)
        .bind(result.timestamp.timestamp_millis())
        .bind(value)
        .bind(result.timeout)
        .bind(result.response_time as i64)
        .bind(result.status_code.map(i64::from))
        .execute(&self.pool)
        .await?;

        debug!("inserted result");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_older_than(
        &self,
        component_id: &str,
        metric_id: &str,
        retention: TimeDetail,
    ) -> StorageResult<usize> {
        let cutoff = retention_cutoff(retention);

        let result = sqlx::query(
            "DELETE FROM results WHERE component_id = ? AND metric_id = ? AND timestamp < ?",
        )
        .bind(component_id)
        .bind(metric_id)
        .bind(cutoff.timestamp_millis())
        .execute(&self.pool)
        .await?;

        let deleted = result.rows_affected() as usize;
        debug!("deleted {deleted} results older than {cutoff}");
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn query_latest(
        &self,
        component_id: &str,
        metric_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<MetricResult>> {
        let rows = sqlx::query(
            r#"
            SELECT component_id, metric_id, timestamp, value,
                   timeout, response_time, status_code
            FROM results
            WHERE component_id = ? AND metric_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(component_id)
        .bind(metric_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut results = rows
            .into_iter()
            .map(Self::row_to_result)
            .collect::<StorageResult<Vec<_>>>()?;

        // Reverse to get chronological order (oldest first)
        results.reverse();
        Ok(results)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let ping = sqlx::query("SELECT 1").fetch_one(&self.pool).await;

        let (healthy, message) = match ping {
            Ok(_) => (true, "SQLite result store operational".to_string()),
            Err(e) => (false, format!("SQLite result store unreachable: {e}")),
        };

        Ok(HealthStatus {
            healthy,
            message,
            metadata: HashMap::from([
                ("backend".to_string(), "sqlite".to_string()),
                ("path".to_string(), self.db_path.clone()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite result store");
        self.pool.close().await;
        Ok(())
    }
}
