//! Structured record tools.
//!
//! `get_records` / `insert_record` / `update_record` / `delete_record`
//! operate on abstract table/column/filter descriptors. The dialect adapter
//! renders backend-native SQL with bound parameters; identifiers are
//! validated against the safe charset before they reach SQL text.

use crate::db::{ConnectionRegistry, StatementExecutor};
use crate::error::{DbError, DbResult};
use crate::models::{SqlParam, parse_filter};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

type JsonObject = serde_json::Map<String, JsonValue>;

/// Input for the get_records tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetRecordsInput {
    /// Connection identifier from add_connection/list_connections
    pub connection_id: String,
    /// Table to read from
    pub table: String,
    /// Columns to return. Omit for all columns.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// Filter object: {column: value} for equality, or {column: {"op": operand}}
    /// with operators eq/ne/gt/gte/lt/lte/like/not_like/in/not_in/between/is_null
    #[serde(default)]
    pub filter: Option<JsonObject>,
    /// Sort columns; prefix with '-' for descending (e.g. "-created_at")
    #[serde(default)]
    pub order_by: Option<Vec<String>>,
    /// Maximum rows to return. Default: 100, max: 10000
    #[serde(default)]
    pub limit: Option<u32>,
    /// Rows to skip before returning results
    #[serde(default)]
    pub offset: Option<u64>,
}

/// Output from the get_records tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct GetRecordsOutput {
    /// Matching rows as column-name to value maps
    pub rows: Vec<JsonObject>,
    /// Number of rows returned
    pub row_count: usize,
    /// True if the result was cut off at the row limit
    pub truncated: bool,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

/// Input for the insert_record tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct InsertRecordInput {
    /// Connection identifier from add_connection/list_connections
    pub connection_id: String,
    /// Table to insert into
    pub table: String,
    /// Column-value pairs for the new record
    pub data: JsonObject,
}

/// Input for the update_record tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdateRecordInput {
    /// Connection identifier from add_connection/list_connections
    pub connection_id: String,
    /// Table to update
    pub table: String,
    /// Column-value pairs to set
    pub data: JsonObject,
    /// Filter selecting the rows to update (required; see get_records for operators)
    pub filter: JsonObject,
}

/// Input for the delete_record tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeleteRecordInput {
    /// Connection identifier from add_connection/list_connections
    pub connection_id: String,
    /// Table to delete from
    pub table: String,
    /// Filter selecting the rows to delete (required; see get_records for operators)
    pub filter: JsonObject,
}

/// Output from the mutating record tools.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct MutationOutput {
    /// Number of rows changed
    pub rows_affected: u64,
    /// Generated key of the inserted row, where the backend reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<i64>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

/// Convert a data object into column/value pairs with bound parameters.
fn data_pairs(data: &JsonObject) -> DbResult<Vec<(String, SqlParam)>> {
    if data.is_empty() {
        return Err(DbError::invalid_params("'data' cannot be empty"));
    }
    data.iter()
        .map(|(column, value)| Ok((column.clone(), SqlParam::from_json(value)?)))
        .collect()
}

/// Handler for the structured record tools.
pub struct RecordToolHandler {
    registry: Arc<ConnectionRegistry>,
    executor: StatementExecutor,
}

impl RecordToolHandler {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            executor: StatementExecutor::new(),
        }
    }

    pub async fn get_records(&self, input: GetRecordsInput) -> DbResult<GetRecordsOutput> {
        let filter = match &input.filter {
            Some(filter) => parse_filter(filter)?,
            None => Vec::new(),
        };

        let mut lease = self.registry.lease(&input.connection_id).await?;
        let (sql, params) = lease.dialect().render_select(
            &input.table,
            input.columns.as_deref(),
            &filter,
            input.order_by.as_deref(),
            input.limit,
            input.offset,
        )?;

        let result = self
            .executor
            .fetch(lease.session(), &sql, &params, input.limit, None)
            .await?;

        Ok(GetRecordsOutput {
            row_count: result.rows.len(),
            rows: result.rows,
            truncated: result.truncated,
            execution_time_ms: result.execution_time_ms,
        })
    }

    pub async fn insert_record(&self, input: InsertRecordInput) -> DbResult<MutationOutput> {
        let data = data_pairs(&input.data)?;

        let mut lease = self.registry.lease(&input.connection_id).await?;
        let (sql, params) = lease.dialect().render_insert(&input.table, &data)?;
        let result = self
            .executor
            .execute(lease.session(), &sql, &params, None)
            .await?;

        info!(
            connection_id = %input.connection_id,
            table = %input.table,
            rows_affected = ?result.rows_affected,
            "Record inserted"
        );

        Ok(MutationOutput {
            rows_affected: result.rows_affected.unwrap_or(0),
            last_insert_id: result.last_insert_id,
            execution_time_ms: result.execution_time_ms,
        })
    }

    pub async fn update_record(&self, input: UpdateRecordInput) -> DbResult<MutationOutput> {
        let data = data_pairs(&input.data)?;
        let filter = parse_filter(&input.filter)?;

        let mut lease = self.registry.lease(&input.connection_id).await?;
        let (sql, params) = lease
            .dialect()
            .render_update(&input.table, &data, &filter)?;
        let result = self
            .executor
            .execute(lease.session(), &sql, &params, None)
            .await?;

        info!(
            connection_id = %input.connection_id,
            table = %input.table,
            rows_affected = ?result.rows_affected,
            "Records updated"
        );

        Ok(MutationOutput {
            rows_affected: result.rows_affected.unwrap_or(0),
            last_insert_id: None,
            execution_time_ms: result.execution_time_ms,
        })
    }

    pub async fn delete_record(&self, input: DeleteRecordInput) -> DbResult<MutationOutput> {
        let filter = parse_filter(&input.filter)?;

        let mut lease = self.registry.lease(&input.connection_id).await?;
        let (sql, params) = lease.dialect().render_delete(&input.table, &filter)?;
        let result = self
            .executor
            .execute(lease.session(), &sql, &params, None)
            .await?;

        info!(
            connection_id = %input.connection_id,
            table = %input.table,
            rows_affected = ?result.rows_affected,
            "Records deleted"
        );

        Ok(MutationOutput {
            rows_affected: result.rows_affected.unwrap_or(0),
            last_insert_id: None,
            execution_time_ms: result.execution_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_pairs_rejects_empty() {
        let data = JsonObject::new();
        assert!(data_pairs(&data).is_err());
    }

    #[test]
    fn test_data_pairs_converts_scalars() {
        let data: JsonObject =
            serde_json::from_str(r#"{"id": 1, "name": "a", "active": true}"#).unwrap();
        let pairs = data_pairs(&data).unwrap();
        assert_eq!(pairs.len(), 3);
        assert!(pairs.iter().any(|(c, v)| c == "id" && *v == SqlParam::Int(1)));
    }

    #[test]
    fn test_data_pairs_rejects_nested_objects() {
        let data: JsonObject = serde_json::from_str(r#"{"meta": {"a": 1}}"#).unwrap();
        assert!(data_pairs(&data).is_err());
    }

    #[test]
    fn test_get_records_input_defaults() {
        let json = r#"{"connection_id": "main", "table": "users"}"#;
        let input: GetRecordsInput = serde_json::from_str(json).unwrap();
        assert!(input.columns.is_none());
        assert!(input.filter.is_none());
        assert!(input.limit.is_none());
    }
}
