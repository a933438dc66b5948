//! MySQL/MariaDB dialect.

use crate::dialect::{Dialect, ensure_ident, render_column_def};
use crate::error::{DbError, DbResult};
use crate::models::{BackendKind, ColumnSpec, LogicalType};

pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn kind(&self) -> BackendKind {
        BackendKind::MySql
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn column_type(&self, spec: &ColumnSpec) -> String {
        match spec.column_type {
            LogicalType::Integer => "INT".to_string(),
            LogicalType::BigInt => "BIGINT".to_string(),
            LogicalType::Text => match spec.size {
                Some(size) => format!("VARCHAR({})", size),
                None => "TEXT".to_string(),
            },
            LogicalType::Real => "DOUBLE".to_string(),
            LogicalType::Decimal => "DECIMAL(18,6)".to_string(),
            LogicalType::Blob => "BLOB".to_string(),
            LogicalType::Boolean => "TINYINT(1)".to_string(),
            LogicalType::Date => "DATE".to_string(),
            LogicalType::DateTime => "DATETIME".to_string(),
        }
    }

    fn limit_clause(&self, limit: Option<u32>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(l), Some(o)) => format!(" LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!(" LIMIT {}", l),
            // MySQL has no bare OFFSET; the conventional huge LIMIT stands in
            (None, Some(o)) => format!(" LIMIT 18446744073709551615 OFFSET {}", o),
            (None, None) => String::new(),
        }
    }

    fn render_drop_index(&self, index: &str, table: Option<&str>) -> DbResult<String> {
        let table = table.ok_or_else(|| {
            DbError::invalid_params("mysql drop_index requires the 'table' parameter")
        })?;
        Ok(format!(
            "DROP INDEX {} ON {}",
            self.quote_ident(ensure_ident(index)?),
            self.quote_ident(ensure_ident(table)?)
        ))
    }

    fn render_modify_column(
        &self,
        table_sql: &str,
        column: &str,
        definition: &ColumnSpec,
    ) -> DbResult<String> {
        // MODIFY COLUMN restates the whole definition under the same name
        let mut definition = definition.clone();
        definition.name = column.to_string();
        Ok(format!(
            "ALTER TABLE {} MODIFY COLUMN {}",
            table_sql,
            render_column_def(self, &definition, false)?
        ))
    }

    fn classify_error(&self, err: crate::error::DbError) -> crate::error::DbError {
        use crate::error::DbError;
        match &err {
            DbError::Statement {
                message,
                code,
            } => {
                let lower = message.to_lowercase();
                // HY000/1205 lock wait timeout; 08S01 communication failure
                if lower.contains("lock wait timeout") {
                    DbError::timeout("lock acquisition", 0)
                } else if code.as_deref() == Some("08S01")
                    || lower.contains("lost connection")
                    || lower.contains("gone away")
                {
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
    fn test_backtick_quoting() {
        let d = MySqlDialect;
        let (sql, _) = d
            .render_insert("users", &[("name".to_string(), SqlParam::Null)])
            .unwrap();
        assert_eq!(sql, "INSERT INTO `users` (`name`) VALUES (?)");
    }

    #[test]
    fn test_type_mapping() {
        let d = MySqlDialect;
        assert_eq!(d.column_type(&spec(LogicalType::Boolean, None)), "TINYINT(1)");
        assert_eq!(d.column_type(&spec(LogicalType::Integer, None)), "INT");
        assert_eq!(
            d.column_type(&spec(LogicalType::Text, Some(64))),
            "VARCHAR(64)"
        );
        assert_eq!(d.column_type(&spec(LogicalType::DateTime, None)), "DATETIME");
    }

    #[test]
    fn test_drop_index_requires_table() {
        let d = MySqlDialect;
        assert!(d.render_drop_index("idx", None).is_err());
        assert_eq!(
            d.render_drop_index("idx", Some("users")).unwrap(),
            "DROP INDEX `idx` ON `users`"
        );
    }

    #[test]
    fn test_modify_column_restates_definition() {
        let d = MySqlDialect;
        let stmt = d
            .render_modify_column(
                "`users`",
                "age",
                &spec(LogicalType::BigInt, None),
            )
            .unwrap();
        assert_eq!(stmt, "ALTER TABLE `users` MODIFY COLUMN `age` BIGINT");
    }

    #[test]
    fn test_classify_lock_wait_timeout() {
        let d = MySqlDialect;
        let err = d.classify_error(DbError::statement(
            "Lock wait timeout exceeded; try restarting transaction",
            Some("HY000".to_string()),
        ));
        assert_eq!(err.kind(), "timeout");
    }
}
