// ABOUTME: Offset Store - durable per-table high-water marks in the source database
// ABOUTME: tracking_table maps table name to the last identity value confirmed published

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::Pool;

use crate::error::ReplicateError;

/// Durable mapping from table name to the last replicated identity value.
///
/// `last_sent_id` is non-decreasing for the lifetime of a tracked table and
/// equals the maximum identity of any row ever successfully published for it.
/// It is written only after a publish cycle is confirmed, never before.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    /// Last committed identity for the table; 0 if never synced. A first-time
    /// lookup is not an error.
    async fn get(&self, table: &str) -> Result<i64, ReplicateError>;

    /// Atomically upsert the tracking record. On failure the caller must not
    /// advance its in-memory offset.
    async fn commit(&self, table: &str, id: i64) -> Result<(), ReplicateError>;
}

/// Offset store backed by a `tracking_table` in the source MySQL database.
pub struct MysqlOffsetStore {
    pool: Pool,
}

impl MysqlOffsetStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create the tracking table if it does not exist. Idempotent; safe to
    /// call on every process start.
    pub async fn ensure_schema(&self) -> Result<(), ReplicateError> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(ReplicateError::persistence)?;
        conn.query_drop(
            "CREATE TABLE IF NOT EXISTS tracking_table (
                table_name VARCHAR(255) PRIMARY KEY,
                last_sent_id BIGINT NOT NULL
            )",
        )
        .await
        .map_err(ReplicateError::persistence)
    }

    /// All tracking records, for status reporting.
    pub async fn list(&self) -> Result<Vec<(String, i64)>, ReplicateError> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(ReplicateError::persistence)?;
        conn.exec(
            "SELECT table_name, last_sent_id FROM tracking_table ORDER BY table_name",
            (),
        )
        .await
        .map_err(ReplicateError::persistence)
    }
}

#[async_trait]
impl OffsetStore for MysqlOffsetStore {
    async fn get(&self, table: &str) -> Result<i64, ReplicateError> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(ReplicateError::persistence)?;
        let offset: Option<i64> = conn
            .exec_first(
                "SELECT last_sent_id FROM tracking_table WHERE table_name = ?",
                (table,),
            )
            .await
            .map_err(ReplicateError::persistence)?;
        Ok(offset.unwrap_or(0))
    }

    async fn commit(&self, table: &str, id: i64) -> Result<(), ReplicateError> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(ReplicateError::persistence)?;
        conn.exec_drop(
            "INSERT INTO tracking_table (table_name, last_sent_id) VALUES (?, ?)
             ON DUPLICATE KEY UPDATE last_sent_id = ?",
            (table, id, id),
        )
        .await
        .map_err(ReplicateError::persistence)
    }
}
