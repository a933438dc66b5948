//! Query-related data models.
//!
//! This module defines types for SQL statements, bound parameters, and
//! normalized results.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default row limit for query results.
pub const DEFAULT_ROW_LIMIT: u32 = 100;

/// Maximum allowed row limit.
pub const MAX_ROW_LIMIT: u32 = 10000;

/// Default statement timeout in seconds.
pub const DEFAULT_STATEMENT_TIMEOUT_SECS: u32 = 30;

/// Maximum statement timeout in seconds.
pub const MAX_STATEMENT_TIMEOUT_SECS: u32 = 300;

/// A bound parameter value.
///
/// Parameters are always driver-bound, never interpolated into SQL text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(untagged)]
pub enum SqlParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data (base64 encoded in JSON)
    Bytes(
        #[serde(with = "base64_bytes")]
        #[schemars(with = "String")]
        Vec<u8>,
    ),
}

impl SqlParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Convert a JSON scalar into a bound parameter.
    ///
    /// Arrays and objects are rejected; they have no scalar binding and are
    /// only meaningful inside filter operators that expand them themselves.
    pub fn from_json(value: &JsonValue) -> DbResult<Self> {
        match value {
            JsonValue::Null => Ok(Self::Null),
            JsonValue::Bool(v) => Ok(Self::Bool(*v)),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Self::Float(f))
                } else {
                    Err(DbError::invalid_params(format!(
                        "numeric value {} is out of range",
                        n
                    )))
                }
            }
            JsonValue::String(s) => Ok(Self::String(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => Err(DbError::invalid_params(
                "arrays and objects cannot be bound as scalar values",
            )),
        }
    }
}

/// Bind values for SQL Server statements.
impl tiberius::ToSql for SqlParam {
    fn to_sql(&self) -> tiberius::ColumnData<'_> {
        use std::borrow::Cow;
        match self {
            Self::Null => tiberius::ColumnData::String(None),
            Self::Bool(v) => tiberius::ColumnData::Bit(Some(*v)),
            Self::Int(v) => tiberius::ColumnData::I64(Some(*v)),
            Self::Float(v) => tiberius::ColumnData::F64(Some(*v)),
            Self::String(v) => tiberius::ColumnData::String(Some(Cow::from(v.as_str()))),
            Self::Bytes(v) => tiberius::ColumnData::Binary(Some(Cow::from(v.as_slice()))),
        }
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ColumnMetadata {
    pub name: String,
    /// Backend-native type (e.g., "int8", "varchar", "TEXT")
    pub type_name: String,
    pub nullable: bool,
}

impl ColumnMetadata {
    /// Create new column metadata.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable,
        }
    }
}

/// Normalized result of a statement, independent of the backend that ran it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    /// Generated key of the last inserted row (sqlite/mysql only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<i64>,
    pub truncated: bool,
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create an empty result.
    pub fn empty(execution_time_ms: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected: None,
            last_insert_id: None,
            truncated: false,
            execution_time_ms,
        }
    }

    /// Create a result for mutating statements (INSERT/UPDATE/DELETE/DDL).
    pub fn write_result(
        rows_affected: u64,
        last_insert_id: Option<i64>,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            rows_affected: Some(rows_affected),
            last_insert_id,
            truncated: false,
            execution_time_ms,
        }
    }

    /// Get the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result carries neither rows nor an affected count.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.rows_affected.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_param_types() {
        assert!(SqlParam::Null.is_null());
        assert!(!SqlParam::Bool(true).is_null());
        assert_eq!(SqlParam::Int(42).type_name(), "int");
        assert_eq!(SqlParam::String("hello".to_string()).type_name(), "string");
    }

    #[test]
    fn test_sql_param_from_json() {
        assert_eq!(
            SqlParam::from_json(&serde_json::json!(21)).unwrap(),
            SqlParam::Int(21)
        );
        assert_eq!(
            SqlParam::from_json(&serde_json::json!(2.5)).unwrap(),
            SqlParam::Float(2.5)
        );
        assert_eq!(
            SqlParam::from_json(&serde_json::json!("a")).unwrap(),
            SqlParam::String("a".to_string())
        );
        assert_eq!(
            SqlParam::from_json(&serde_json::Value::Null).unwrap(),
            SqlParam::Null
        );
        assert!(SqlParam::from_json(&serde_json::json!([1, 2])).is_err());
        assert!(SqlParam::from_json(&serde_json::json!({"a": 1})).is_err());
    }

    #[test]
    fn test_sql_param_deserializes_untagged() {
        let params: Vec<SqlParam> =
            serde_json::from_str(r#"[null, true, 7, 1.5, "text"]"#).unwrap();
        assert_eq!(params[0], SqlParam::Null);
        assert_eq!(params[1], SqlParam::Bool(true));
        assert_eq!(params[2], SqlParam::Int(7));
        assert_eq!(params[3], SqlParam::Float(1.5));
        assert_eq!(params[4], SqlParam::String("text".to_string()));
    }

    #[test]
    fn test_query_result_empty() {
        let result = QueryResult::empty(10);
        assert!(result.is_empty());
        assert_eq!(result.row_count(), 0);
    }

    #[test]
    fn test_query_result_write() {
        let result = QueryResult::write_result(5, Some(12), 20);
        assert!(!result.is_empty());
        assert_eq!(result.rows_affected, Some(5));
        assert_eq!(result.last_insert_id, Some(12));
    }
}
