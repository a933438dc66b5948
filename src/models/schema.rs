//! Schema-related data models.
//!
//! Abstract table/column/index descriptors used by the structured operations.
//! These carry no backend-specific syntax; the dialect adapter translates them
//! into native DDL/DML.

use crate::error::{DbError, DbResult};
use crate::models::SqlParam;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Logical column types shared across all backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalType {
    Integer,
    BigInt,
    Text,
    Real,
    Decimal,
    Blob,
    Boolean,
    Date,
    DateTime,
}

/// Foreign-key reference attached to a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
}

/// Abstract column description for create_table / alter_table.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ColumnSpec {
    /// Column name (safe identifier charset: letters, digits, underscore)
    pub name: String,
    /// Logical column type, translated per backend
    #[serde(rename = "type")]
    pub column_type: LogicalType,
    /// Size hint for TEXT columns (renders VARCHAR(n)/NVARCHAR(n) where supported)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    /// Whether the column accepts NULL. Default: true
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Whether the column is part of the primary key. Default: false
    #[serde(default)]
    pub primary_key: bool,
    /// Default value as a JSON scalar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    /// Foreign-key reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ForeignKeyRef>,
}

fn default_true() -> bool {
    true
}

/// Abstract index description for create_index.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IndexSpec {
    /// Index name (safe identifier charset)
    pub name: String,
    /// Target table
    pub table: String,
    /// Ordered list of column names
    pub columns: Vec<String>,
    /// Whether the index enforces uniqueness. Default: false
    #[serde(default)]
    pub unique: bool,
}

/// A single alter_table operation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum AlterOp {
    /// Add a new column
    AddColumn { column: ColumnSpec },
    /// Drop an existing column
    DropColumn { column: String },
    /// Change an existing column's definition
    ModifyColumn { column: String, definition: ColumnSpec },
}

impl AlterOp {
    /// Name of the column this operation targets.
    pub fn column_name(&self) -> &str {
        match self {
            Self::AddColumn { column } => &column.name,
            Self::DropColumn { column } => column,
            Self::ModifyColumn { column, .. } => column,
        }
    }
}

/// Introspected column returned by get_table_schema.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ColumnDescription {
    pub name: String,
    /// Logical type mapped from the backend-native type
    #[serde(rename = "type")]
    pub column_type: LogicalType,
    /// Backend-native type name as reported by the catalog
    pub native_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<ForeignKeyRef>,
}

/// Introspected index returned by get_table_schema.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct IndexDescription {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// Introspected table schema.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnDescription>,
    pub indexes: Vec<IndexDescription>,
}

// =============================================================================
// Filters
// =============================================================================

/// Comparison operator inside a filter clause.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(SqlParam),
    Ne(SqlParam),
    Gt(SqlParam),
    Gte(SqlParam),
    Lt(SqlParam),
    Lte(SqlParam),
    Like(SqlParam),
    NotLike(SqlParam),
    In(Vec<SqlParam>),
    NotIn(Vec<SqlParam>),
    Between(SqlParam, SqlParam),
    IsNull(bool),
}

/// One column condition; clauses are combined with AND.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    pub column: String,
    pub op: FilterOp,
}

/// Parse a caller-supplied filter object into clauses.
///
/// Each entry is either `{column: scalar}` (equality; JSON null means IS NULL)
/// or `{column: {"op": operand}}` with a single operator key.
pub fn parse_filter(filter: &serde_json::Map<String, JsonValue>) -> DbResult<Vec<FilterClause>> {
    let mut clauses = Vec::with_capacity(filter.len());
    for (column, value) in filter {
        let op = match value {
            JsonValue::Null => FilterOp::IsNull(true),
            JsonValue::Object(spec) => parse_operator(column, spec)?,
            scalar => FilterOp::Eq(SqlParam::from_json(scalar)?),
        };
        clauses.push(FilterClause {
            column: column.clone(),
            op,
        });
    }
    Ok(clauses)
}

fn parse_operator(
    column: &str,
    spec: &serde_json::Map<String, JsonValue>,
) -> DbResult<FilterOp> {
    if spec.len() != 1 {
        return Err(DbError::invalid_params(format!(
            "filter on '{}' must contain exactly one operator, got {}",
            column,
            spec.len()
        )));
    }
    let (op, operand) = spec.iter().next().expect("len checked above");

    let scalar = |v: &JsonValue| SqlParam::from_json(v);
    let list = |v: &JsonValue| -> DbResult<Vec<SqlParam>> {
        match v {
            JsonValue::Array(items) => items.iter().map(SqlParam::from_json).collect(),
            _ => Err(DbError::invalid_params(format!(
                "operator '{}' on '{}' requires an array operand",
                op, column
            ))),
        }
    };

    match op.as_str() {
        "eq" => Ok(FilterOp::Eq(scalar(operand)?)),
        "ne" | "neq" => Ok(FilterOp::Ne(scalar(operand)?)),
        "gt" => Ok(FilterOp::Gt(scalar(operand)?)),
        "gte" => Ok(FilterOp::Gte(scalar(operand)?)),
        "lt" => Ok(FilterOp::Lt(scalar(operand)?)),
        "lte" => Ok(FilterOp::Lte(scalar(operand)?)),
        "like" => Ok(FilterOp::Like(scalar(operand)?)),
        "not_like" => Ok(FilterOp::NotLike(scalar(operand)?)),
        "in" => Ok(FilterOp::In(list(operand)?)),
        "not_in" => Ok(FilterOp::NotIn(list(operand)?)),
        "between" => {
            let bounds = list(operand)?;
            if bounds.len() != 2 {
                return Err(DbError::invalid_params(format!(
                    "'between' on '{}' requires exactly two operands",
                    column
                )));
            }
            let mut it = bounds.into_iter();
            Ok(FilterOp::Between(
                it.next().expect("len checked"),
                it.next().expect("len checked"),
            ))
        }
        "is_null" => match operand {
            JsonValue::Bool(b) => Ok(FilterOp::IsNull(*b)),
            _ => Err(DbError::invalid_params(format!(
                "'is_null' on '{}' requires a boolean operand",
                column
            ))),
        },
        other => Err(DbError::invalid_params(format!(
            "unknown filter operator '{}' on '{}'",
            other, column
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(json: &str) -> serde_json::Map<String, JsonValue> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_logical_type_serde() {
        assert_eq!(
            serde_json::to_string(&LogicalType::Integer).unwrap(),
            "\"INTEGER\""
        );
        let ty: LogicalType = serde_json::from_str("\"DATETIME\"").unwrap();
        assert_eq!(ty, LogicalType::DateTime);
        let ty: LogicalType = serde_json::from_str("\"BIGINT\"").unwrap();
        assert_eq!(ty, LogicalType::BigInt);
    }

    #[test]
    fn test_column_spec_defaults() {
        let spec: ColumnSpec =
            serde_json::from_str(r#"{"name": "id", "type": "INTEGER", "primary_key": true}"#)
                .unwrap();
        assert_eq!(spec.name, "id");
        assert_eq!(spec.column_type, LogicalType::Integer);
        assert!(spec.nullable);
        assert!(spec.primary_key);
        assert!(spec.default.is_none());
    }

    #[test]
    fn test_alter_op_tagged_deserialization() {
        let op: AlterOp = serde_json::from_str(
            r#"{"operation": "add_column", "column": {"name": "age", "type": "INTEGER"}}"#,
        )
        .unwrap();
        assert!(matches!(op, AlterOp::AddColumn { .. }));
        assert_eq!(op.column_name(), "age");

        let op: AlterOp =
            serde_json::from_str(r#"{"operation": "drop_column", "column": "age"}"#).unwrap();
        assert!(matches!(op, AlterOp::DropColumn { .. }));
    }

    #[test]
    fn test_parse_filter_equality_and_null() {
        let clauses = parse_filter(&obj(r#"{"name": "a", "deleted_at": null}"#)).unwrap();
        assert_eq!(clauses.len(), 2);
        assert_eq!(
            clauses[0].op,
            FilterOp::Eq(SqlParam::String("a".to_string()))
        );
        assert_eq!(clauses[1].op, FilterOp::IsNull(true));
    }

    #[test]
    fn test_parse_filter_operators() {
        let clauses =
            parse_filter(&obj(r#"{"age": {"gt": 21}, "name": {"like": "a%"}}"#)).unwrap();
        assert_eq!(clauses[0].op, FilterOp::Gt(SqlParam::Int(21)));
        assert_eq!(
            clauses[1].op,
            FilterOp::Like(SqlParam::String("a%".to_string()))
        );

        let clauses = parse_filter(&obj(r#"{"id": {"in": [1, 2, 3]}}"#)).unwrap();
        assert_eq!(
            clauses[0].op,
            FilterOp::In(vec![SqlParam::Int(1), SqlParam::Int(2), SqlParam::Int(3)])
        );

        let clauses = parse_filter(&obj(r#"{"age": {"between": [18, 65]}}"#)).unwrap();
        assert_eq!(
            clauses[0].op,
            FilterOp::Between(SqlParam::Int(18), SqlParam::Int(65))
        );
    }

    #[test]
    fn test_parse_filter_rejects_unknown_operator() {
        assert!(parse_filter(&obj(r#"{"age": {"regex": ".*"}}"#)).is_err());
        assert!(parse_filter(&obj(r#"{"age": {"gt": 1, "lt": 2}}"#)).is_err());
        assert!(parse_filter(&obj(r#"{"id": {"in": 5}}"#)).is_err());
        assert!(parse_filter(&obj(r#"{"age": {"between": [1]}}"#)).is_err());
    }
}
