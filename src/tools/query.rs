//! Raw query execution tool.
//!
//! This module implements the `execute_query` tool: backend SQL text with
//! positional bound parameters. Row-returning statements produce normalized
//! rows; mutating statements report affected counts. The statement runs in
//! whatever transaction state the connection currently holds.

use crate::db::{ConnectionRegistry, StatementExecutor};
use crate::error::DbResult;
use crate::models::{ColumnMetadata, QueryResult, SqlParam};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

/// Input for the execute_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteQueryInput {
    /// Connection identifier from add_connection/list_connections
    pub connection_id: String,
    /// SQL statement to execute. Use ? ($1.. for postgres, @P1.. for mssql) placeholders.
    pub query: String,
    /// Positional parameters bound to the placeholders; never interpolated into the SQL
    #[serde(default)]
    pub params: Vec<SqlParam>,
    /// Maximum rows to return for row-returning statements. Default: 100, max: 10000
    #[serde(default)]
    pub limit: Option<u32>,
    /// Statement timeout in seconds. Default: 30, max: 300
    #[serde(default)]
    pub timeout_secs: Option<u32>,
}

/// Output from the execute_query tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ExecuteQueryOutput {
    /// Column metadata for row-returning statements
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnMetadata>,
    /// Result rows as column-name to value maps
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    /// Rows changed by a mutating statement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    /// Generated key of the last inserted row, where the backend reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<i64>,
    /// True if the result was cut off at the row limit
    pub truncated: bool,
    /// Number of rows returned
    pub row_count: usize,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl From<QueryResult> for ExecuteQueryOutput {
    fn from(result: QueryResult) -> Self {
        Self {
            row_count: result.rows.len(),
            columns: result.columns,
            rows: result.rows,
            rows_affected: result.rows_affected,
            last_insert_id: result.last_insert_id,
            truncated: result.truncated,
            execution_time_ms: result.execution_time_ms,
        }
    }
}

/// Whether a statement returns rows (vs. reporting an affected count).
pub(crate) fn returns_rows(sql: &str) -> bool {
    let head = sql
        .trim_start()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_uppercase();
    matches!(
        head.as_str(),
        "SELECT" | "WITH" | "SHOW" | "PRAGMA" | "EXPLAIN" | "DESCRIBE" | "DESC" | "VALUES"
    )
}

/// Handler for the execute_query tool.
pub struct QueryToolHandler {
    registry: Arc<ConnectionRegistry>,
    executor: StatementExecutor,
}

impl QueryToolHandler {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            executor: StatementExecutor::new(),
        }
    }

    pub async fn execute_query(&self, input: ExecuteQueryInput) -> DbResult<ExecuteQueryOutput> {
        let mut lease = self.registry.lease(&input.connection_id).await?;

        let result = if returns_rows(&input.query) {
            self.executor
                .fetch(
                    lease.session(),
                    &input.query,
                    &input.params,
                    input.limit,
                    input.timeout_secs,
                )
                .await?
        } else {
            self.executor
                .execute(
                    lease.session(),
                    &input.query,
                    &input.params,
                    input.timeout_secs,
                )
                .await?
        };

        info!(
            connection_id = %input.connection_id,
            row_count = result.rows.len(),
            rows_affected = ?result.rows_affected,
            execution_time_ms = result.execution_time_ms,
            "Query executed"
        );

        Ok(result.into())
    }
}
