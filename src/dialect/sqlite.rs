//! SQLite dialect.
//!
//! SQLite is dynamically typed; logical types map onto its storage classes
//! (booleans become INTEGER, date/time become TEXT in ISO-8601 form).

use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::models::{AlterOp, BackendKind, ColumnSpec, LogicalType};

pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn kind(&self) -> BackendKind {
        BackendKind::SQLite
    }

    fn column_type(&self, spec: &ColumnSpec) -> String {
        match spec.column_type {
            LogicalType::Integer | LogicalType::BigInt | LogicalType::Boolean => {
                "INTEGER".to_string()
            }
            LogicalType::Text | LogicalType::Date | LogicalType::DateTime => "TEXT".to_string(),
            LogicalType::Real => "REAL".to_string(),
            LogicalType::Decimal => "NUMERIC".to_string(),
            LogicalType::Blob => "BLOB".to_string(),
        }
    }

    fn limit_clause(&self, limit: Option<u32>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(l), Some(o)) => format!(" LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!(" LIMIT {}", l),
            // OFFSET requires a LIMIT; -1 means unbounded
            (None, Some(o)) => format!(" LIMIT -1 OFFSET {}", o),
            (None, None) => String::new(),
        }
    }

    fn render_alter_table(&self, _table: &str, _ops: &[AlterOp]) -> DbResult<Vec<String>> {
        // Drop/modify require the table-recreation strategy, which needs
        // introspection and a transaction; the schema tool drives that path.
        Err(DbError::unsupported(
            "SQLite ALTER TABLE is applied via table recreation, not direct statements",
        ))
    }

    fn render_modify_column(
        &self,
        _table_sql: &str,
        _column: &str,
        _definition: &ColumnSpec,
    ) -> DbResult<String> {
        Err(DbError::unsupported(
            "SQLite cannot modify columns in place",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SqlParam;

    fn spec(ty: LogicalType) -> ColumnSpec {
        ColumnSpec {
            name: "c".to_string(),
            column_type: ty,
            size: None,
            nullable: true,
            primary_key: false,
            default: None,
            references: None,
        }
    }

    #[test]
    fn test_storage_class_mapping() {
        let d = SqliteDialect;
        assert_eq!(d.column_type(&spec(LogicalType::Boolean)), "INTEGER");
        assert_eq!(d.column_type(&spec(LogicalType::DateTime)), "TEXT");
        assert_eq!(d.column_type(&spec(LogicalType::BigInt)), "INTEGER");
        assert_eq!(d.column_type(&spec(LogicalType::Decimal)), "NUMERIC");
    }

    #[test]
    fn test_offset_without_limit() {
        let d = SqliteDialect;
        assert_eq!(d.limit_clause(None, Some(20)), " LIMIT -1 OFFSET 20");
    }

    #[test]
    fn test_alter_table_unsupported() {
        let d = SqliteDialect;
        let err = d.render_alter_table("users", &[]).unwrap_err();
        assert_eq!(err.kind(), "unsupported");
    }

    #[test]
    fn test_question_mark_placeholders() {
        let d = SqliteDialect;
        let (sql, params) = d
            .render_insert(
                "t",
                &[
                    ("a".to_string(), SqlParam::Int(1)),
                    ("b".to_string(), SqlParam::Int(2)),
                ],
            )
            .unwrap();
        assert!(sql.ends_with("VALUES (?, ?)"));
        assert_eq!(params.len(), 2);
    }
}
