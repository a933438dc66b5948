//! Schema introspection.
//!
//! Catalog queries run through the statement executor like any other
//! statement, so they participate in the connection's transaction when one is
//! open (which also matters for the single-handle model: the open transaction
//! owns the only connection). Results come back as normalized JSON rows and
//! are parsed into abstract descriptors here.

use crate::db::executor::StatementExecutor;
use crate::db::transaction::Session;
use crate::dialect::{Dialect, ensure_ident};
use crate::error::{DbError, DbResult};
use crate::models::{
    ColumnDescription, ForeignKeyRef, IndexDescription, MAX_ROW_LIMIT, SqlParam, TableSchema,
};
use serde_json::Value as JsonValue;

type JsonRow = serde_json::Map<String, JsonValue>;

/// Schema inspector for the registered backends.
pub struct SchemaInspector;

impl SchemaInspector {
    /// List base table names.
    pub async fn list_tables(
        executor: &StatementExecutor,
        session: &mut Session,
        dialect: &dyn Dialect,
    ) -> DbResult<Vec<String>> {
        let sql = match dialect.kind() {
            crate::models::BackendKind::SQLite => queries::sqlite::LIST_TABLES,
            crate::models::BackendKind::Postgres => queries::postgres::LIST_TABLES,
            crate::models::BackendKind::MySql => queries::mysql::LIST_TABLES,
            crate::models::BackendKind::MsSql => queries::mssql::LIST_TABLES,
        };
        let rows = fetch_all(executor, session, sql, &[]).await?;
        Ok(rows
            .iter()
            .filter_map(|row| str_field(row, "name"))
            .collect())
    }

    /// Describe a table: columns (with logical types, pk, defaults, foreign
    /// keys) and secondary indexes.
    pub async fn table_schema(
        executor: &StatementExecutor,
        session: &mut Session,
        dialect: &dyn Dialect,
        table: &str,
    ) -> DbResult<TableSchema> {
        ensure_ident(table)?;
        let mut schema = match dialect.kind() {
            crate::models::BackendKind::SQLite => {
                sqlite_schema(executor, session, dialect, table).await?
            }
            crate::models::BackendKind::Postgres => {
                catalog_schema(
                    executor,
                    session,
                    dialect,
                    table,
                    queries::postgres::COLUMNS,
                    queries::postgres::FOREIGN_KEYS,
                    queries::postgres::INDEXES,
                )
                .await?
            }
            crate::models::BackendKind::MySql => {
                catalog_schema(
                    executor,
                    session,
                    dialect,
                    table,
                    queries::mysql::COLUMNS,
                    queries::mysql::FOREIGN_KEYS,
                    queries::mysql::INDEXES,
                )
                .await?
            }
            crate::models::BackendKind::MsSql => {
                catalog_schema(
                    executor,
                    session,
                    dialect,
                    table,
                    queries::mssql::COLUMNS,
                    queries::mssql::FOREIGN_KEYS,
                    queries::mssql::INDEXES,
                )
                .await?
            }
        };

        if schema.columns.is_empty() {
            return Err(DbError::statement(
                format!("Table '{}' does not exist", table),
                None,
            ));
        }
        schema.table = table.to_string();
        Ok(schema)
    }
}

async fn fetch_all(
    executor: &StatementExecutor,
    session: &mut Session,
    sql: &str,
    params: &[SqlParam],
) -> DbResult<Vec<JsonRow>> {
    let result = executor
        .fetch(session, sql, params, Some(MAX_ROW_LIMIT), None)
        .await?;
    Ok(result.rows)
}

// =============================================================================
// Catalog-driven backends (postgres / mysql / mssql)
// =============================================================================

async fn catalog_schema(
    executor: &StatementExecutor,
    session: &mut Session,
    dialect: &dyn Dialect,
    table: &str,
    columns_sql: &str,
    fks_sql: &str,
    indexes_sql: &str,
) -> DbResult<TableSchema> {
    let param = [SqlParam::String(table.to_string())];

    let fk_rows = fetch_all(executor, session, fks_sql, &param).await?;
    let fks: Vec<(String, ForeignKeyRef)> = fk_rows
        .iter()
        .filter_map(|row| {
            Some((
                str_field(row, "name")?,
                ForeignKeyRef {
                    table: str_field(row, "ref_table")?,
                    column: str_field(row, "ref_column")?,
                },
            ))
        })
        .collect();

    let column_rows = fetch_all(executor, session, columns_sql, &param).await?;
    let columns = column_rows
        .iter()
        .filter_map(|row| {
            let name = str_field(row, "name")?;
            let native = str_field(row, "native_type").unwrap_or_default();
            let references = fks
                .iter()
                .find(|(col, _)| *col == name)
                .map(|(_, fk)| fk.clone());
            Some(ColumnDescription {
                column_type: dialect.logical_type(&native),
                native_type: native,
                nullable: yes_field(row, "nullable"),
                primary_key: flag_field(row, "is_primary")
                    || str_field(row, "column_key").as_deref() == Some("PRI"),
                default: str_field(row, "default_value"),
                references,
                name,
            })
        })
        .collect();

    let index_rows = fetch_all(executor, session, indexes_sql, &param).await?;
    let indexes = index_rows
        .iter()
        .filter_map(|row| {
            let name = str_field(row, "name")?;
            let columns: Vec<String> = str_field(row, "columns")?
                .split(',')
                .map(str::to_string)
                .collect();
            Some(IndexDescription {
                name,
                columns,
                unique: flag_field(row, "is_unique"),
            })
        })
        .collect();

    Ok(TableSchema {
        table: String::new(),
        columns,
        indexes,
    })
}

// =============================================================================
// SQLite (PRAGMA-driven)
// =============================================================================

async fn sqlite_schema(
    executor: &StatementExecutor,
    session: &mut Session,
    dialect: &dyn Dialect,
    table: &str,
) -> DbResult<TableSchema> {
    // PRAGMA arguments cannot be bound; the table name is a validated,
    // quoted identifier
    let quoted = dialect.quote_ident(table);

    let fk_rows = fetch_all(
        executor,
        session,
        &format!("PRAGMA foreign_key_list({})", quoted),
        &[],
    )
    .await?;
    let fks: Vec<(String, ForeignKeyRef)> = fk_rows
        .iter()
        .filter_map(|row| {
            Some((
                str_field(row, "from")?,
                ForeignKeyRef {
                    table: str_field(row, "table")?,
                    column: str_field(row, "to")?,
                },
            ))
        })
        .collect();

    let column_rows = fetch_all(
        executor,
        session,
        &format!("PRAGMA table_info({})", quoted),
        &[],
    )
    .await?;
    let columns = column_rows
        .iter()
        .filter_map(|row| {
            let name = str_field(row, "name")?;
            let native = str_field(row, "type").unwrap_or_default();
            let references = fks
                .iter()
                .find(|(col, _)| *col == name)
                .map(|(_, fk)| fk.clone());
            Some(ColumnDescription {
                column_type: dialect.logical_type(&native),
                native_type: native,
                nullable: !flag_field(row, "notnull"),
                primary_key: flag_field(row, "pk"),
                default: str_field(row, "dflt_value"),
                references,
                name,
            })
        })
        .collect();

    let index_rows = fetch_all(
        executor,
        session,
        &format!("PRAGMA index_list({})", quoted),
        &[],
    )
    .await?;
    let mut indexes = Vec::new();
    for row in &index_rows {
        let Some(index_name) = str_field(row, "name") else {
            continue;
        };
        // Skip the implicit primary-key index
        if str_field(row, "origin").as_deref() == Some("pk") {
            continue;
        }
        let info_rows = fetch_all(
            executor,
            session,
            &format!("PRAGMA index_info({})", dialect.quote_ident(&index_name)),
            &[],
        )
        .await?;
        let columns: Vec<String> = info_rows
            .iter()
            .filter_map(|r| str_field(r, "name"))
            .collect();
        indexes.push(IndexDescription {
            name: index_name,
            columns,
            unique: flag_field(row, "unique"),
        });
    }

    Ok(TableSchema {
        table: String::new(),
        columns,
        indexes,
    })
}

// =============================================================================
// JSON field helpers
// =============================================================================

fn str_field(row: &JsonRow, key: &str) -> Option<String> {
    match row.get(key)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Truthy catalog flags: booleans, numbers, or "1".
fn flag_field(row: &JsonRow, key: &str) -> bool {
    match row.get(key) {
        Some(JsonValue::Bool(b)) => *b,
        Some(JsonValue::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        Some(JsonValue::String(s)) => s == "1",
        _ => false,
    }
}

/// information_schema-style "YES"/"NO" nullability.
fn yes_field(row: &JsonRow, key: &str) -> bool {
    match row.get(key) {
        Some(JsonValue::String(s)) => s.eq_ignore_ascii_case("yes"),
        Some(JsonValue::Bool(b)) => *b,
        Some(JsonValue::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    }
}

// =============================================================================
// Catalog queries
// =============================================================================

mod queries {
    pub mod sqlite {
        pub const LIST_TABLES: &str = "\
            SELECT name FROM sqlite_master \
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
            ORDER BY name";
    }

    pub mod postgres {
        pub const LIST_TABLES: &str = "\
            SELECT table_name AS name FROM information_schema.tables \
            WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
            ORDER BY table_name";

        pub const COLUMNS: &str = r#"
            SELECT
                c.column_name AS name,
                c.data_type AS native_type,
                c.is_nullable AS nullable,
                c.column_default AS default_value,
                EXISTS (
                    SELECT 1
                    FROM information_schema.table_constraints tc
                    JOIN information_schema.key_column_usage kcu
                        ON tc.constraint_name = kcu.constraint_name
                        AND tc.table_schema = kcu.table_schema
                    WHERE tc.table_name = c.table_name
                    AND tc.table_schema = c.table_schema
                    AND tc.constraint_type = 'PRIMARY KEY'
                    AND kcu.column_name = c.column_name
                ) AS is_primary
            FROM information_schema.columns c
            WHERE c.table_schema = current_schema() AND c.table_name = $1
            ORDER BY c.ordinal_position
            "#;

        pub const FOREIGN_KEYS: &str = r#"
            SELECT
                kcu.column_name AS name,
                ccu.table_name AS ref_table,
                ccu.column_name AS ref_column
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
                ON ccu.constraint_name = tc.constraint_name
                AND ccu.table_schema = tc.table_schema
            WHERE tc.table_name = $1
            AND tc.table_schema = current_schema()
            AND tc.constraint_type = 'FOREIGN KEY'
            "#;

        pub const INDEXES: &str = r#"
            SELECT
                i.relname AS name,
                string_agg(a.attname, ',' ORDER BY array_position(ix.indkey, a.attnum)) AS columns,
                ix.indisunique AS is_unique
            FROM pg_index ix
            JOIN pg_class i ON i.oid = ix.indexrelid
            JOIN pg_class t ON t.oid = ix.indrelid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
            WHERE t.relname = $1 AND n.nspname = current_schema() AND NOT ix.indisprimary
            GROUP BY i.relname, ix.indisunique
            "#;
    }

    pub mod mysql {
        pub const LIST_TABLES: &str = "\
            SELECT TABLE_NAME AS name FROM information_schema.TABLES \
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
            ORDER BY TABLE_NAME";

        pub const COLUMNS: &str = r#"
            SELECT
                COLUMN_NAME AS name,
                COLUMN_TYPE AS native_type,
                IS_NULLABLE AS nullable,
                COLUMN_DEFAULT AS default_value,
                COLUMN_KEY AS column_key
            FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
            "#;

        pub const FOREIGN_KEYS: &str = r#"
            SELECT
                COLUMN_NAME AS name,
                REFERENCED_TABLE_NAME AS ref_table,
                REFERENCED_COLUMN_NAME AS ref_column
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = DATABASE()
            AND TABLE_NAME = ?
            AND REFERENCED_TABLE_NAME IS NOT NULL
            "#;

        pub const INDEXES: &str = r#"
            SELECT
                INDEX_NAME AS name,
                GROUP_CONCAT(COLUMN_NAME ORDER BY SEQ_IN_INDEX) AS columns,
                NOT NON_UNIQUE AS is_unique
            FROM information_schema.STATISTICS
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
            AND INDEX_NAME <> 'PRIMARY'
            GROUP BY INDEX_NAME, NON_UNIQUE
            "#;
    }

    pub mod mssql {
        pub const LIST_TABLES: &str = "SELECT name FROM sys.tables ORDER BY name";

        pub const COLUMNS: &str = r#"
            SELECT
                c.COLUMN_NAME AS name,
                c.DATA_TYPE AS native_type,
                c.IS_NULLABLE AS nullable,
                c.COLUMN_DEFAULT AS default_value,
                CASE WHEN pk.COLUMN_NAME IS NOT NULL THEN 1 ELSE 0 END AS is_primary
            FROM INFORMATION_SCHEMA.COLUMNS c
            LEFT JOIN (
                SELECT kcu.COLUMN_NAME
                FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
                JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
                    ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
                WHERE tc.TABLE_NAME = @P1 AND tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
            ) pk ON c.COLUMN_NAME = pk.COLUMN_NAME
            WHERE c.TABLE_NAME = @P1
            ORDER BY c.ORDINAL_POSITION
            "#;

        pub const FOREIGN_KEYS: &str = r#"
            SELECT
                fc.name AS name,
                rt.name AS ref_table,
                rc.name AS ref_column
            FROM sys.foreign_key_columns fkc
            JOIN sys.columns fc
                ON fc.object_id = fkc.parent_object_id AND fc.column_id = fkc.parent_column_id
            JOIN sys.tables rt ON rt.object_id = fkc.referenced_object_id
            JOIN sys.columns rc
                ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id
            JOIN sys.tables pt ON pt.object_id = fkc.parent_object_id
            WHERE pt.name = @P1
            "#;

        pub const INDEXES: &str = r#"
            SELECT
                i.name AS name,
                STRING_AGG(c.name, ',') WITHIN GROUP (ORDER BY ic.key_ordinal) AS columns,
                i.is_unique AS is_unique
            FROM sys.indexes i
            JOIN sys.index_columns ic
                ON ic.object_id = i.object_id AND ic.index_id = i.index_id
            JOIN sys.columns c
                ON c.object_id = ic.object_id AND c.column_id = ic.column_id
            JOIN sys.tables t ON t.object_id = i.object_id
            WHERE t.name = @P1 AND i.is_primary_key = 0 AND i.name IS NOT NULL
            GROUP BY i.name, i.is_unique
            "#;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_field_shapes() {
        let row: JsonRow =
            serde_json::from_str(r#"{"a": true, "b": 1, "c": 0, "d": "1", "e": "0"}"#).unwrap();
        assert!(flag_field(&row, "a"));
        assert!(flag_field(&row, "b"));
        assert!(!flag_field(&row, "c"));
        assert!(flag_field(&row, "d"));
        assert!(!flag_field(&row, "e"));
        assert!(!flag_field(&row, "missing"));
    }

    #[test]
    fn test_yes_field_shapes() {
        let row: JsonRow = serde_json::from_str(r#"{"a": "YES", "b": "NO", "c": true}"#).unwrap();
        assert!(yes_field(&row, "a"));
        assert!(!yes_field(&row, "b"));
        assert!(yes_field(&row, "c"));
    }

    #[test]
    fn test_str_field_accepts_numbers() {
        let row: JsonRow = serde_json::from_str(r#"{"a": "x", "b": 5, "c": null}"#).unwrap();
        assert_eq!(str_field(&row, "a").as_deref(), Some("x"));
        assert_eq!(str_field(&row, "b").as_deref(), Some("5"));
        assert_eq!(str_field(&row, "c"), None);
    }
}
