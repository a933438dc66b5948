//! Schema tools.
//!
//! Introspection (`list_tables`, `get_table_schema`) and DDL
//! (`create_table`, `drop_table`, `create_index`, `drop_index`,
//! `alter_table`) over abstract descriptors. DDL statements are rendered by
//! the dialect adapter and executed like any other statement, inside the
//! connection's current transaction state.
//!
//! SQLite's limited ALTER TABLE is handled with the recreation strategy:
//! build a replacement table, copy the surviving columns, drop the original,
//! rename. The sequence runs inside a transaction so a failure leaves the
//! original table untouched.

use crate::db::{ConnectionLease, ConnectionRegistry, SchemaInspector, StatementExecutor};
use crate::error::{DbError, DbResult};
use crate::models::{
    AlterOp, BackendKind, ColumnDescription, ColumnSpec, IndexSpec, TableSchema,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

/// Input for the list_tables tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListTablesInput {
    /// Connection identifier from add_connection/list_connections
    pub connection_id: String,
}

/// Output from the list_tables tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListTablesOutput {
    /// Base table names
    pub tables: Vec<String>,
    /// Number of tables
    pub count: usize,
}

/// Input for the get_table_schema tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetTableSchemaInput {
    /// Connection identifier from add_connection/list_connections
    pub connection_id: String,
    /// Table to describe
    pub table: String,
}

/// Input for the create_table tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateTableInput {
    /// Connection identifier from add_connection/list_connections
    pub connection_id: String,
    /// Name of the new table
    pub table: String,
    /// Column definitions with logical types (INTEGER, TEXT, BOOLEAN, ...)
    pub columns: Vec<ColumnSpec>,
}

/// Input for the drop_table tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DropTableInput {
    /// Connection identifier from add_connection/list_connections
    pub connection_id: String,
    /// Table to drop
    pub table: String,
}

/// Input for the create_index tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateIndexInput {
    /// Connection identifier from add_connection/list_connections
    pub connection_id: String,
    /// Index descriptor
    #[serde(flatten)]
    pub index: IndexSpec,
}

/// Input for the drop_index tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DropIndexInput {
    /// Connection identifier from add_connection/list_connections
    pub connection_id: String,
    /// Index to drop
    pub index: String,
    /// Owning table (required for mysql and mssql)
    #[serde(default)]
    pub table: Option<String>,
}

/// Input for the alter_table tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AlterTableInput {
    /// Connection identifier from add_connection/list_connections
    pub connection_id: String,
    /// Table to alter
    pub table: String,
    /// Operations: add_column, drop_column, modify_column
    pub operations: Vec<AlterOp>,
}

/// Output from the DDL tools.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DdlOutput {
    /// The affected table or index
    pub object: String,
    /// Human-readable status message
    pub message: String,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

/// Handler for schema tools.
pub struct SchemaToolHandler {
    registry: Arc<ConnectionRegistry>,
    executor: StatementExecutor,
}

impl SchemaToolHandler {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            executor: StatementExecutor::new(),
        }
    }

    pub async fn list_tables(&self, input: ListTablesInput) -> DbResult<ListTablesOutput> {
        let mut lease = self.registry.lease(&input.connection_id).await?;
        let dialect = lease.dialect();

        // Introspection is read-only; one retry on a transient failure
        let first = SchemaInspector::list_tables(&self.executor, lease.session(), dialect).await;
        let tables = match first {
            Err(e) if e.is_retryable() => {
                SchemaInspector::list_tables(&self.executor, lease.session(), dialect).await?
            }
            other => other?,
        };

        Ok(ListTablesOutput {
            count: tables.len(),
            tables,
        })
    }

    pub async fn get_table_schema(&self, input: GetTableSchemaInput) -> DbResult<TableSchema> {
        let mut lease = self.registry.lease(&input.connection_id).await?;
        let dialect = lease.dialect();

        let first =
            SchemaInspector::table_schema(&self.executor, lease.session(), dialect, &input.table)
                .await;
        match first {
            Err(e) if e.is_retryable() => {
                SchemaInspector::table_schema(
                    &self.executor,
                    lease.session(),
                    dialect,
                    &input.table,
                )
                .await
            }
            other => other,
        }
    }

    pub async fn create_table(&self, input: CreateTableInput) -> DbResult<DdlOutput> {
        let mut lease = self.registry.lease(&input.connection_id).await?;
        let sql = lease
            .dialect()
            .render_create_table(&input.table, &input.columns)?;
        let result = self
            .executor
            .execute(lease.session(), &sql, &[], None)
            .await?;

        info!(connection_id = %input.connection_id, table = %input.table, "Table created");

        Ok(DdlOutput {
            object: input.table.clone(),
            message: format!("Table '{}' created", input.table),
            execution_time_ms: result.execution_time_ms,
        })
    }

    pub async fn drop_table(&self, input: DropTableInput) -> DbResult<DdlOutput> {
        let mut lease = self.registry.lease(&input.connection_id).await?;
        let sql = lease.dialect().render_drop_table(&input.table)?;
        let result = self
            .executor
            .execute(lease.session(), &sql, &[], None)
            .await?;

        info!(connection_id = %input.connection_id, table = %input.table, "Table dropped");

        Ok(DdlOutput {
            object: input.table.clone(),
            message: format!("Table '{}' dropped", input.table),
            execution_time_ms: result.execution_time_ms,
        })
    }

    pub async fn create_index(&self, input: CreateIndexInput) -> DbResult<DdlOutput> {
        let mut lease = self.registry.lease(&input.connection_id).await?;
        let sql = lease.dialect().render_create_index(&input.index)?;
        let result = self
            .executor
            .execute(lease.session(), &sql, &[], None)
            .await?;

        info!(
            connection_id = %input.connection_id,
            index = %input.index.name,
            table = %input.index.table,
            "Index created"
        );

        Ok(DdlOutput {
            object: input.index.name.clone(),
            message: format!(
                "Index '{}' created on '{}'",
                input.index.name, input.index.table
            ),
            execution_time_ms: result.execution_time_ms,
        })
    }

    pub async fn drop_index(&self, input: DropIndexInput) -> DbResult<DdlOutput> {
        let mut lease = self.registry.lease(&input.connection_id).await?;
        let sql = lease
            .dialect()
            .render_drop_index(&input.index, input.table.as_deref())?;
        let result = self
            .executor
            .execute(lease.session(), &sql, &[], None)
            .await?;

        info!(connection_id = %input.connection_id, index = %input.index, "Index dropped");

        Ok(DdlOutput {
            object: input.index.clone(),
            message: format!("Index '{}' dropped", input.index),
            execution_time_ms: result.execution_time_ms,
        })
    }

    pub async fn alter_table(&self, input: AlterTableInput) -> DbResult<DdlOutput> {
        if input.operations.is_empty() {
            return Err(DbError::invalid_params(
                "alter_table requires at least one operation",
            ));
        }

        let mut lease = self.registry.lease(&input.connection_id).await?;
        let start = std::time::Instant::now();

        if lease.kind() == BackendKind::SQLite {
            self.alter_table_sqlite(&mut lease, &input.table, &input.operations)
                .await?;
        } else {
            let statements = lease
                .dialect()
                .render_alter_table(&input.table, &input.operations)?;
            for sql in &statements {
                self.executor
                    .execute(lease.session(), sql, &[], None)
                    .await?;
            }
        }

        info!(
            connection_id = %input.connection_id,
            table = %input.table,
            operations = input.operations.len(),
            "Table altered"
        );

        Ok(DdlOutput {
            object: input.table.clone(),
            message: format!("Table '{}' altered", input.table),
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// SQLite table recreation: create a replacement table reflecting the
    /// operations, copy the surviving columns, drop the original, rename.
    ///
    /// Runs inside a transaction. When the caller already has one open, the
    /// statements join it; otherwise a scoped transaction is opened and the
    /// connection returns to idle afterwards.
    async fn alter_table_sqlite(
        &self,
        lease: &mut ConnectionLease,
        table: &str,
        operations: &[AlterOp],
    ) -> DbResult<()> {
        let dialect = lease.dialect();
        let schema =
            SchemaInspector::table_schema(&self.executor, lease.session(), dialect, table).await?;

        // Surviving columns keep their data; drops disappear, modifies keep
        // the name with a new definition, adds start empty
        let mut new_columns: Vec<ColumnSpec> = Vec::with_capacity(schema.columns.len());
        let mut copied: Vec<String> = Vec::with_capacity(schema.columns.len());
        for column in &schema.columns {
            let verdict = operations.iter().find_map(|op| match op {
                AlterOp::DropColumn { column: name } if *name == column.name => Some(None),
                AlterOp::ModifyColumn {
                    column: name,
                    definition,
                } if *name == column.name => {
                    let mut definition = definition.clone();
                    definition.name = column.name.clone();
                    Some(Some(definition))
                }
                _ => None,
            });
            match verdict {
                Some(None) => continue,
                Some(Some(modified)) => {
                    new_columns.push(modified);
                    copied.push(column.name.clone());
                }
                None => {
                    new_columns.push(column_to_spec(column));
                    copied.push(column.name.clone());
                }
            }
        }
        for op in operations {
            if let AlterOp::AddColumn { column } = op {
                if schema.columns.iter().any(|c| c.name == column.name) {
                    return Err(DbError::invalid_params(format!(
                        "column '{}' already exists on '{}'",
                        column.name, table
                    )));
                }
                new_columns.push(column.clone());
            }
        }
        if new_columns.is_empty() {
            return Err(DbError::invalid_params(
                "alter_table cannot drop every column",
            ));
        }

        let temp_table = format!("{}_alter_tmp", table);
        let copy_list: Vec<String> = copied
            .iter()
            .map(|c| dialect.quote_ident(c))
            .collect();
        let statements = [
            dialect.render_create_table(&temp_table, &new_columns)?,
            format!(
                "INSERT INTO {} ({}) SELECT {} FROM {}",
                dialect.quote_ident(&temp_table),
                copy_list.join(", "),
                copy_list.join(", "),
                dialect.quote_ident(table)
            ),
            dialect.render_drop_table(table)?,
            format!(
                "ALTER TABLE {} RENAME TO {}",
                dialect.quote_ident(&temp_table),
                dialect.quote_ident(table)
            ),
        ];

        let scoped_tx = !lease.session().transaction_active();
        if scoped_tx {
            lease.session().begin().await?;
        }
        for sql in &statements {
            if let Err(e) = self.executor.execute(lease.session(), sql, &[], None).await {
                if scoped_tx {
                    lease.session().rollback_best_effort().await;
                }
                return Err(e);
            }
        }
        if scoped_tx {
            lease.session().commit().await?;
        }
        Ok(())
    }
}

/// Turn an introspected column back into a spec for recreation.
fn column_to_spec(column: &ColumnDescription) -> ColumnSpec {
    ColumnSpec {
        name: column.name.clone(),
        column_type: column.column_type,
        size: None,
        nullable: column.nullable,
        primary_key: column.primary_key,
        default: column.default.as_deref().map(default_literal_to_json),
        references: column.references.clone(),
    }
}

/// Parse a catalog default literal (e.g. `'abc'`, `42`) into a JSON scalar.
fn default_literal_to_json(literal: &str) -> JsonValue {
    let trimmed = literal.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
        return JsonValue::String(trimmed[1..trimmed.len() - 1].replace("''", "'"));
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return JsonValue::Number(i.into());
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return JsonValue::Number(n);
        }
    }
    JsonValue::String(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogicalType;

    #[test]
    fn test_default_literal_parsing() {
        assert_eq!(
            default_literal_to_json("'hello'"),
            JsonValue::String("hello".to_string())
        );
        assert_eq!(
            default_literal_to_json("'it''s'"),
            JsonValue::String("it's".to_string())
        );
        assert_eq!(default_literal_to_json("42"), serde_json::json!(42));
        assert_eq!(default_literal_to_json("2.5"), serde_json::json!(2.5));
        assert_eq!(
            default_literal_to_json("CURRENT_TIMESTAMP"),
            JsonValue::String("CURRENT_TIMESTAMP".to_string())
        );
    }

    #[test]
    fn test_column_to_spec_roundtrip() {
        let description = ColumnDescription {
            name: "age".to_string(),
            column_type: LogicalType::Integer,
            native_type: "INTEGER".to_string(),
            nullable: false,
            primary_key: false,
            default: Some("0".to_string()),
            references: None,
        };
        let spec = column_to_spec(&description);
        assert_eq!(spec.name, "age");
        assert_eq!(spec.column_type, LogicalType::Integer);
        assert!(!spec.nullable);
        assert_eq!(spec.default, Some(serde_json::json!(0)));
    }

    #[test]
    fn test_create_index_input_flattens_spec() {
        let json = r#"{
            "connection_id": "main",
            "name": "idx_users_email",
            "table": "users",
            "columns": ["email"],
            "unique": true
        }"#;
        let input: CreateIndexInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.index.name, "idx_users_email");
        assert!(input.index.unique);
    }

    #[test]
    fn test_alter_table_input_operations() {
        let json = r#"{
            "connection_id": "main",
            "table": "users",
            "operations": [
                {"operation": "add_column", "column": {"name": "age", "type": "INTEGER"}},
                {"operation": "drop_column", "column": "legacy"}
            ]
        }"#;
        let input: AlterTableInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.operations.len(), 2);
    }
}
