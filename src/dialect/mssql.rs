//! SQL Server dialect.
//!
//! Identifiers use `[bracket]` quoting, parameters `@P1..@Pn`, and pagination
//! `TOP` or `OFFSET ... FETCH` (which requires an ORDER BY; `(SELECT NULL)`
//! stands in when the caller gave none).

use crate::dialect::{Dialect, ensure_ident, render_order_by, render_where};
use crate::error::{DbError, DbResult};
use crate::models::{BackendKind, ColumnSpec, FilterClause, LogicalType, SqlParam};

pub struct MsSqlDialect;

impl Dialect for MsSqlDialect {
    fn kind(&self) -> BackendKind {
        BackendKind::MsSql
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn placeholder(&self, n: usize) -> String {
        format!("@P{}", n)
    }

    fn column_type(&self, spec: &ColumnSpec) -> String {
        match spec.column_type {
            LogicalType::Integer => "INT".to_string(),
            LogicalType::BigInt => "BIGINT".to_string(),
            LogicalType::Text => match spec.size {
                Some(size) => format!("NVARCHAR({})", size),
                None => "NVARCHAR(MAX)".to_string(),
            },
            LogicalType::Real => "FLOAT".to_string(),
            LogicalType::Decimal => "DECIMAL(18,6)".to_string(),
            LogicalType::Blob => "VARBINARY(MAX)".to_string(),
            LogicalType::Boolean => "BIT".to_string(),
            LogicalType::Date => "DATE".to_string(),
            LogicalType::DateTime => "DATETIME2".to_string(),
        }
    }

    fn add_column_keyword(&self) -> &'static str {
        "ADD"
    }

    fn render_select(
        &self,
        table: &str,
        columns: Option<&[String]>,
        filter: &[FilterClause],
        order_by: Option<&[String]>,
        limit: Option<u32>,
        offset: Option<u64>,
    ) -> DbResult<(String, Vec<SqlParam>)> {
        let projection = match columns.filter(|c| !c.is_empty()) {
            None => "*".to_string(),
            Some(columns) => {
                let quoted: DbResult<Vec<String>> = columns
                    .iter()
                    .map(|c| Ok(self.quote_ident(ensure_ident(c)?)))
                    .collect();
                quoted?.join(", ")
            }
        };

        // TOP only when there is no offset; OFFSET...FETCH otherwise
        let top = match (limit, offset) {
            (Some(l), None) => format!("TOP {} ", l),
            _ => String::new(),
        };

        let mut sql = format!(
            "SELECT {}{} FROM {}",
            top,
            projection,
            self.quote_ident(ensure_ident(table)?)
        );
        let mut params = Vec::new();
        let mut index = 1;
        if !filter.is_empty() {
            let clause = render_where(self, filter, &mut index, &mut params)?;
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }

        let has_order = order_by.is_some_and(|o| !o.is_empty());
        if has_order {
            sql.push_str(" ORDER BY ");
            sql.push_str(&render_order_by(self, order_by.unwrap_or_default())?);
        } else if offset.is_some() {
            // OFFSET requires an ORDER BY clause
            sql.push_str(" ORDER BY (SELECT NULL)");
        }

        if let Some(o) = offset {
            sql.push_str(&format!(" OFFSET {} ROWS", o));
            if let Some(l) = limit {
                sql.push_str(&format!(" FETCH NEXT {} ROWS ONLY", l));
            }
        }
        Ok((sql, params))
    }

    fn render_drop_index(&self, index: &str, table: Option<&str>) -> DbResult<String> {
        let table = table.ok_or_else(|| {
            DbError::invalid_params("mssql drop_index requires the 'table' parameter")
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
        let nullability = if definition.nullable { "" } else { " NOT NULL" };
        Ok(format!(
            "ALTER TABLE {} ALTER COLUMN {} {}{}",
            table_sql,
            self.quote_ident(ensure_ident(column)?),
            self.column_type(definition),
            nullability
        ))
    }

    fn classify_error(&self, err: crate::error::DbError) -> crate::error::DbError {
        use crate::error::DbError;
        match &err {
            DbError::Statement {
                code: Some(code),
                message,
            } => {
                // 1222 = lock request timeout, 233/10054/10060 = transport-level failures
                if code == "1222" {
                    DbError::timeout("lock acquisition", 0)
                } else if matches!(code.as_str(), "233" | "10054" | "10060") {
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
    use crate::models::parse_filter;

    fn filter(json: &str) -> Vec<FilterClause> {
        parse_filter(&serde_json::from_str(json).unwrap()).unwrap()
    }

    #[test]
    fn test_bracket_quoting() {
        let d = MsSqlDialect;
        assert_eq!(d.quote_ident("users"), "[users]");
    }

    #[test]
    fn test_top_without_offset() {
        let d = MsSqlDialect;
        let (sql, _) = d
            .render_select("users", None, &[], None, Some(5), None)
            .unwrap();
        assert_eq!(sql, "SELECT TOP 5 * FROM [users]");
    }

    #[test]
    fn test_offset_fetch_with_default_order() {
        let d = MsSqlDialect;
        let (sql, _) = d
            .render_select("users", None, &[], None, Some(10), Some(20))
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM [users] ORDER BY (SELECT NULL) OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );
    }

    #[test]
    fn test_offset_without_limit() {
        let d = MsSqlDialect;
        let (sql, _) = d
            .render_select("users", None, &[], Some(&["id".to_string()]), None, Some(30))
            .unwrap();
        assert_eq!(sql, "SELECT * FROM [users] ORDER BY [id] ASC OFFSET 30 ROWS");
    }

    #[test]
    fn test_at_p_placeholders() {
        let d = MsSqlDialect;
        let (sql, params) = d
            .render_select(
                "users",
                None,
                &filter(r#"{"age": {"gt": 21}, "name": {"like": "a%"}}"#),
                None,
                None,
                None,
            )
            .unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM [users] WHERE [age] > @P1 AND [name] LIKE @P2"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_type_mapping() {
        let d = MsSqlDialect;
        let spec = |ty| ColumnSpec {
            name: "c".to_string(),
            column_type: ty,
            size: None,
            nullable: true,
            primary_key: false,
            default: None,
            references: None,
        };
        assert_eq!(d.column_type(&spec(LogicalType::Boolean)), "BIT");
        assert_eq!(d.column_type(&spec(LogicalType::Text)), "NVARCHAR(MAX)");
        assert_eq!(d.column_type(&spec(LogicalType::DateTime)), "DATETIME2");
        assert_eq!(d.column_type(&spec(LogicalType::Blob)), "VARBINARY(MAX)");
    }

    #[test]
    fn test_add_column_omits_column_keyword() {
        use crate::models::AlterOp;
        let d = MsSqlDialect;
        let op: AlterOp = serde_json::from_str(
            r#"{"operation": "add_column", "column": {"name": "age", "type": "INTEGER"}}"#,
        )
        .unwrap();
        let stmts = d.render_alter_table("users", &[op]).unwrap();
        assert_eq!(stmts[0], "ALTER TABLE [users] ADD [age] INT");
    }
}
