// ABOUTME: Row Fetcher - bounded range queries over one source table
// ABOUTME: Selects rows with id above the high-water mark, ascending, capped per cycle

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::Pool;

use crate::error::ReplicateError;
use crate::row::{Row, RowBatch};

/// Reads new rows from a source table.
///
/// Implementations must return rows in ascending identity order so the
/// batch's `max_id` equals the last row's identity, and must treat "no new
/// rows" as an empty batch, not an error.
#[async_trait]
pub trait RowFetcher: Send + Sync {
    async fn fetch(
        &self,
        table: &str,
        since_id: i64,
        limit: usize,
    ) -> Result<RowBatch, ReplicateError>;
}

/// Fetcher over a shared MySQL connection pool.
pub struct MysqlRowFetcher {
    pool: Pool,
}

impl MysqlRowFetcher {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RowFetcher for MysqlRowFetcher {
    async fn fetch(
        &self,
        table: &str,
        since_id: i64,
        limit: usize,
    ) -> Result<RowBatch, ReplicateError> {
        let mut conn = self.pool.get_conn().await.map_err(ReplicateError::query)?;

        let query = format!(
            "SELECT * FROM {} WHERE id > ? ORDER BY id ASC LIMIT ?",
            quote_ident(table)
        );
        let rows: Vec<mysql_async::Row> = conn
            .exec(query.as_str(), (since_id, limit as u64))
            .await
            .map_err(ReplicateError::query)?;

        Ok(RowBatch::from_rows(
            rows.into_iter().map(Row::from_mysql).collect(),
        ))
    }
}

/// Quote a MySQL identifier with backticks, doubling embedded backticks.
///
/// Table names come from configuration, not query parameters, so they must be
/// escaped before interpolation into query text.
pub fn quote_ident(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}
