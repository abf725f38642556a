// ABOUTME: One-shot schema introspection of the source database
// ABOUTME: Reads information_schema and serializes the table layout for export

use mysql_async::prelude::Queryable;
use mysql_async::Pool;
use serde::Serialize;

use crate::error::ReplicateError;

#[derive(Debug, Clone, Serialize)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseSchema {
    pub database_name: String,
    pub tables: Vec<TableSchema>,
}

/// Read the full table layout of `database` from `information_schema`.
pub async fn introspect(pool: &Pool, database: &str) -> Result<DatabaseSchema, ReplicateError> {
    let mut conn = pool.get_conn().await.map_err(ReplicateError::query)?;

    let rows: Vec<(String, String, String, String, String)> = conn
        .exec(
            "SELECT TABLE_NAME, COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, COLUMN_KEY
             FROM information_schema.columns
             WHERE TABLE_SCHEMA = ?
             ORDER BY TABLE_NAME, ORDINAL_POSITION",
            (database,),
        )
        .await
        .map_err(ReplicateError::query)?;

    let mut tables: Vec<TableSchema> = Vec::new();
    for (table_name, column_name, column_type, is_nullable, column_key) in rows {
        if tables.last().map_or(true, |t| t.name != table_name) {
            tables.push(TableSchema {
                name: table_name,
                columns: Vec::new(),
            });
        }
        if let Some(table) = tables.last_mut() {
            table.columns.push(ColumnSpec {
                name: column_name,
                data_type: column_type,
                is_nullable: is_nullable == "YES",
                is_primary: column_key == "PRI",
            });
        }
    }

    Ok(DatabaseSchema {
        database_name: database.to_string(),
        tables,
    })
}
