//! PostgreSQL dialect.

use crate::dialect::{Dialect, ensure_ident};
use crate::error::DbResult;
use crate::models::{BackendKind, ColumnSpec, LogicalType};

pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn placeholder(&self, n: usize) -> String {
        format!("${}", n)
    }

    fn column_type(&self, spec: &ColumnSpec) -> String {
        match spec.column_type {
            LogicalType::Integer => "INTEGER".to_string(),
            LogicalType::BigInt => "BIGINT".to_string(),
            LogicalType::Text => match spec.size {
                Some(size) => format!("VARCHAR({})", size),
                None => "TEXT".to_string(),
            },
            LogicalType::Real => "DOUBLE PRECISION".to_string(),
            LogicalType::Decimal => "NUMERIC".to_string(),
            LogicalType::Blob => "BYTEA".to_string(),
            LogicalType::Boolean => "BOOLEAN".to_string(),
            LogicalType::Date => "DATE".to_string(),
            LogicalType::DateTime => "TIMESTAMP".to_string(),
        }
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "TRUE" } else { "FALSE" }
    }

    fn render_modify_column(
        &self,
        table_sql: &str,
        column: &str,
        definition: &ColumnSpec,
    ) -> DbResult<String> {
        Ok(format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
            table_sql,
            self.quote_ident(ensure_ident(column)?),
            self.column_type(definition)
        ))
    }

    fn classify_error(&self, err: crate::error::DbError) -> crate::error::DbError {
        use crate::error::DbError;
        match &err {
            DbError::Statement {
                code: Some(code),
                message,
            } => {
                // 57014 = query_canceled (statement_timeout), class 08 =
                // connection exceptions, 53300 = too_many_connections
                if code == "57014" {
                    DbError::timeout("statement execution", 0)
                } else if code.starts_with("08") || code == "53300" {
                    DbError::connection_failed(message.clone())
                } else {
                    err
                }
            }
            _ => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::models::SqlParam;

    fn spec(ty: LogicalType, size: Option<u32>) -> ColumnSpec {
        ColumnSpec {
            name: "c".to_string(),
            column_type: ty,
            size,
            nullable: true,
            primary_key: false,
            default: None,
            references: None,
        }
    }

    #[test]
    fn test_numbered_placeholders() {
        let d = PostgresDialect;
        let (sql, _) = d
            .render_insert(
                "t",
                &[
                    ("a".to_string(), SqlParam::Int(1)),
                    ("b".to_string(), SqlParam::Int(2)),
                ],
            )
            .unwrap();
        assert!(sql.ends_with("VALUES ($1, $2)"));
    }

    #[test]
    fn test_placeholder_numbering_spans_set_and_where() {
        let d = PostgresDialect;
        let filter = crate::models::parse_filter(
            &serde_json::from_str(r#"{"id": 7}"#).unwrap(),
        )
        .unwrap();
        let (sql, params) = d
            .render_update(
                "t",
                &[("name".to_string(), SqlParam::String("x".to_string()))],
                &filter,
            )
            .unwrap();
        assert_eq!(sql, "UPDATE \"t\" SET \"name\" = $1 WHERE \"id\" = $2");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_type_mapping() {
        let d = PostgresDialect;
        assert_eq!(d.column_type(&spec(LogicalType::Boolean, None)), "BOOLEAN");
        assert_eq!(d.column_type(&spec(LogicalType::Blob, None)), "BYTEA");
        assert_eq!(
            d.column_type(&spec(LogicalType::Text, Some(120))),
            "VARCHAR(120)"
        );
        assert_eq!(d.column_type(&spec(LogicalType::DateTime, None)), "TIMESTAMP");
    }

    #[test]
    fn test_classify_query_canceled_as_timeout() {
        let d = PostgresDialect;
        let err = d.classify_error(DbError::statement(
            "canceling statement due to statement timeout",
            Some("57014".to_string()),
        ));
        assert_eq!(err.kind(), "timeout");
    }

    #[test]
    fn test_classify_connection_exception() {
        let d = PostgresDialect;
        let err = d.classify_error(DbError::statement(
            "connection failure",
            Some("08006".to_string()),
        ));
        assert_eq!(err.kind(), "connection_failed");
    }
}
