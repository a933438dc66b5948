//! Dialect adapters.
//!
//! One [`Dialect`] implementation per backend kind translates abstract
//! table/column/index descriptors and filters into backend-native SQL with
//! bound parameters, and refines backend error codes into the common
//! taxonomy. The rest of the server is backend-agnostic: adding a backend
//! means implementing this trait (plus a handle variant), nothing else.
//!
//! Identifier handling is the safety boundary here: every table, column, and
//! index name flowing into rendered SQL must pass [`ensure_ident`], and is
//! still quoted per backend rules afterwards. Values never enter SQL text;
//! they are returned alongside as bound parameters.

pub mod mssql;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use mssql::MsSqlDialect;
pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::error::{DbError, DbResult};
use crate::models::{
    AlterOp, BackendKind, ColumnSpec, FilterClause, FilterOp, IndexSpec, LogicalType, SqlParam,
};
use serde_json::Value as JsonValue;

static SQLITE: SqliteDialect = SqliteDialect;
static POSTGRES: PostgresDialect = PostgresDialect;
static MYSQL: MySqlDialect = MySqlDialect;
static MSSQL: MsSqlDialect = MsSqlDialect;

/// Get the dialect adapter for a backend kind.
pub fn dialect_for(kind: BackendKind) -> &'static dyn Dialect {
    match kind {
        BackendKind::SQLite => &SQLITE,
        BackendKind::Postgres => &POSTGRES,
        BackendKind::MySql => &MYSQL,
        BackendKind::MsSql => &MSSQL,
    }
}

/// Validate an identifier against the safe charset.
///
/// First character must be a letter or underscore, the rest letters, digits,
/// or underscores. This is checked before quoting so that rendered SQL can
/// never smuggle statement text through a name.
pub fn ensure_ident(name: &str) -> DbResult<&str> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if !valid || name.len() > 128 {
        return Err(DbError::invalid_params(format!(
            "invalid identifier '{}': must match [A-Za-z_][A-Za-z0-9_]* and be at most 128 chars",
            name
        )));
    }
    Ok(name)
}

/// Per-backend SQL translation.
pub trait Dialect: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Quote an identifier with the backend's quoting style.
    /// The name must already have passed [`ensure_ident`].
    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Placeholder for the n-th bound parameter (1-based).
    fn placeholder(&self, _n: usize) -> String {
        "?".to_string()
    }

    /// Native column type for a logical type.
    fn column_type(&self, spec: &ColumnSpec) -> String;

    /// Render a default value as a SQL literal.
    fn default_literal(&self, value: &JsonValue) -> DbResult<String> {
        match value {
            JsonValue::Null => Ok("NULL".to_string()),
            JsonValue::Bool(b) => Ok(self.bool_literal(*b).to_string()),
            JsonValue::Number(n) => Ok(n.to_string()),
            JsonValue::String(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
            _ => Err(DbError::invalid_params(
                "default values must be JSON scalars",
            )),
        }
    }

    /// Boolean literal for DEFAULT clauses.
    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    /// LIMIT/OFFSET clause appended to a SELECT.
    fn limit_clause(&self, limit: Option<u32>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (Some(l), Some(o)) => format!(" LIMIT {} OFFSET {}", l, o),
            (Some(l), None) => format!(" LIMIT {}", l),
            (None, Some(o)) => format!(" OFFSET {}", o),
            (None, None) => String::new(),
        }
    }

    /// Render a SELECT with projection, filter, ordering, and pagination.
    fn render_select(
        &self,
        table: &str,
        columns: Option<&[String]>,
        filter: &[FilterClause],
        order_by: Option<&[String]>,
        limit: Option<u32>,
        offset: Option<u64>,
    ) -> DbResult<(String, Vec<SqlParam>)> {
        let mut sql = format!(
            "SELECT {} FROM {}",
            render_projection(self, columns)?,
            self.quote_ident(ensure_ident(table)?)
        );
        let mut params = Vec::new();
        let mut index = 1;
        if !filter.is_empty() {
            let clause = render_where(self, filter, &mut index, &mut params)?;
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
        if let Some(order) = order_by.filter(|o| !o.is_empty()) {
            sql.push_str(" ORDER BY ");
            sql.push_str(&render_order_by(self, order)?);
        }
        sql.push_str(&self.limit_clause(limit, offset));
        Ok((sql, params))
    }

    /// Render an INSERT for the given column/value pairs.
    fn render_insert(
        &self,
        table: &str,
        data: &[(String, SqlParam)],
    ) -> DbResult<(String, Vec<SqlParam>)> {
        if data.is_empty() {
            return Err(DbError::invalid_params("no data provided for insert"));
        }
        let mut names = Vec::with_capacity(data.len());
        let mut placeholders = Vec::with_capacity(data.len());
        let mut params = Vec::with_capacity(data.len());
        for (i, (column, value)) in data.iter().enumerate() {
            names.push(self.quote_ident(ensure_ident(column)?));
            placeholders.push(self.placeholder(i + 1));
            params.push(value.clone());
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote_ident(ensure_ident(table)?),
            names.join(", "),
            placeholders.join(", ")
        );
        Ok((sql, params))
    }

    /// Render an UPDATE. The filter must be non-empty; full-table updates go
    /// through execute_query explicitly.
    fn render_update(
        &self,
        table: &str,
        data: &[(String, SqlParam)],
        filter: &[FilterClause],
    ) -> DbResult<(String, Vec<SqlParam>)> {
        if data.is_empty() {
            return Err(DbError::invalid_params("no data provided for update"));
        }
        if filter.is_empty() {
            return Err(DbError::invalid_params(
                "update_record requires a filter; use execute_query for full-table updates",
            ));
        }
        let mut params = Vec::new();
        let mut index = 1;
        let mut assignments = Vec::with_capacity(data.len());
        for (column, value) in data {
            assignments.push(format!(
                "{} = {}",
                self.quote_ident(ensure_ident(column)?),
                self.placeholder(index)
            ));
            params.push(value.clone());
            index += 1;
        }
        let clause = render_where(self, filter, &mut index, &mut params)?;
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.quote_ident(ensure_ident(table)?),
            assignments.join(", "),
            clause
        );
        Ok((sql, params))
    }

    /// Render a DELETE. The filter must be non-empty; full-table deletes go
    /// through execute_query explicitly.
    fn render_delete(
        &self,
        table: &str,
        filter: &[FilterClause],
    ) -> DbResult<(String, Vec<SqlParam>)> {
        if filter.is_empty() {
            return Err(DbError::invalid_params(
                "delete_record requires a filter; use execute_query for full-table deletes",
            ));
        }
        let mut params = Vec::new();
        let mut index = 1;
        let clause = render_where(self, filter, &mut index, &mut params)?;
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            self.quote_ident(ensure_ident(table)?),
            clause
        );
        Ok((sql, params))
    }

    /// Render a CREATE TABLE from abstract column specs.
    fn render_create_table(&self, table: &str, columns: &[ColumnSpec]) -> DbResult<String> {
        if columns.is_empty() {
            return Err(DbError::invalid_params(
                "create_table requires at least one column",
            ));
        }
        let pk_count = columns.iter().filter(|c| c.primary_key).count();
        let mut defs = Vec::with_capacity(columns.len() + 1);
        for spec in columns {
            defs.push(render_column_def(self, spec, pk_count == 1)?);
        }
        if pk_count > 1 {
            let pk_cols: Vec<String> = columns
                .iter()
                .filter(|c| c.primary_key)
                .map(|c| self.quote_ident(&c.name))
                .collect();
            defs.push(format!("PRIMARY KEY ({})", pk_cols.join(", ")));
        }
        Ok(format!(
            "CREATE TABLE {} ({})",
            self.quote_ident(ensure_ident(table)?),
            defs.join(", ")
        ))
    }

    /// Render a DROP TABLE.
    fn render_drop_table(&self, table: &str) -> DbResult<String> {
        Ok(format!(
            "DROP TABLE {}",
            self.quote_ident(ensure_ident(table)?)
        ))
    }

    /// Render a CREATE INDEX from an abstract index spec.
    fn render_create_index(&self, spec: &IndexSpec) -> DbResult<String> {
        if spec.columns.is_empty() {
            return Err(DbError::invalid_params(
                "create_index requires at least one column",
            ));
        }
        let columns: DbResult<Vec<String>> = spec
            .columns
            .iter()
            .map(|c| Ok(self.quote_ident(ensure_ident(c)?)))
            .collect();
        Ok(format!(
            "CREATE {}INDEX {} ON {} ({})",
            if spec.unique { "UNIQUE " } else { "" },
            self.quote_ident(ensure_ident(&spec.name)?),
            self.quote_ident(ensure_ident(&spec.table)?),
            columns?.join(", ")
        ))
    }

    /// Render a DROP INDEX. Some backends scope the index name to a table.
    fn render_drop_index(&self, index: &str, _table: Option<&str>) -> DbResult<String> {
        Ok(format!(
            "DROP INDEX {}",
            self.quote_ident(ensure_ident(index)?)
        ))
    }

    /// Keyword introducing an added column in ALTER TABLE.
    fn add_column_keyword(&self) -> &'static str {
        "ADD COLUMN"
    }

    /// Render ALTER TABLE operations as a statement sequence.
    ///
    /// SQLite overrides this with an error; its limited ALTER support is
    /// compensated by a table-recreation strategy at the tool layer.
    fn render_alter_table(&self, table: &str, ops: &[AlterOp]) -> DbResult<Vec<String>> {
        if ops.is_empty() {
            return Err(DbError::invalid_params(
                "alter_table requires at least one operation",
            ));
        }
        let table_sql = self.quote_ident(ensure_ident(table)?);
        let mut statements = Vec::with_capacity(ops.len());
        for op in ops {
            let stmt = match op {
                AlterOp::AddColumn { column } => format!(
                    "ALTER TABLE {} {} {}",
                    table_sql,
                    self.add_column_keyword(),
                    render_column_def(self, column, false)?
                ),
                AlterOp::DropColumn { column } => format!(
                    "ALTER TABLE {} DROP COLUMN {}",
                    table_sql,
                    self.quote_ident(ensure_ident(column)?)
                ),
                AlterOp::ModifyColumn { column, definition } => {
                    self.render_modify_column(&table_sql, ensure_ident(column)?, definition)?
                }
            };
            statements.push(stmt);
        }
        Ok(statements)
    }

    /// Backend-specific MODIFY/ALTER COLUMN statement.
    fn render_modify_column(
        &self,
        table_sql: &str,
        column: &str,
        definition: &ColumnSpec,
    ) -> DbResult<String>;

    /// Map a backend-native type name to the logical type enumeration.
    fn logical_type(&self, native: &str) -> LogicalType {
        logical_type_from_native(native)
    }

    /// Refine an already-classified error using backend-specific codes.
    /// The default keeps the generic classification.
    fn classify_error(&self, err: DbError) -> DbError {
        err
    }
}

/// Render `name TYPE [PRIMARY KEY] [NOT NULL] [DEFAULT lit] [REFERENCES t(c)]`.
pub(crate) fn render_column_def(
    dialect: &(impl Dialect + ?Sized),
    spec: &ColumnSpec,
    inline_pk: bool,
) -> DbResult<String> {
    let mut def = format!(
        "{} {}",
        dialect.quote_ident(ensure_ident(&spec.name)?),
        dialect.column_type(spec)
    );
    if spec.primary_key && inline_pk {
        def.push_str(" PRIMARY KEY");
    }
    if !spec.nullable && !(spec.primary_key && inline_pk) {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = &spec.default {
        def.push_str(" DEFAULT ");
        def.push_str(&dialect.default_literal(default)?);
    }
    if let Some(fk) = &spec.references {
        def.push_str(&format!(
            " REFERENCES {} ({})",
            dialect.quote_ident(ensure_ident(&fk.table)?),
            dialect.quote_ident(ensure_ident(&fk.column)?)
        ));
    }
    Ok(def)
}

fn render_projection(
    dialect: &(impl Dialect + ?Sized),
    columns: Option<&[String]>,
) -> DbResult<String> {
    match columns.filter(|c| !c.is_empty()) {
        None => Ok("*".to_string()),
        Some(columns) => {
            let quoted: DbResult<Vec<String>> = columns
                .iter()
                .map(|c| Ok(dialect.quote_ident(ensure_ident(c)?)))
                .collect();
            Ok(quoted?.join(", "))
        }
    }
}

pub(crate) fn render_order_by(
    dialect: &(impl Dialect + ?Sized),
    order_by: &[String],
) -> DbResult<String> {
    let terms: DbResult<Vec<String>> = order_by
        .iter()
        .map(|entry| {
            let (name, direction) = match entry.strip_prefix('-') {
                Some(name) => (name, "DESC"),
                None => (entry.as_str(), "ASC"),
            };
            Ok(format!(
                "{} {}",
                dialect.quote_ident(ensure_ident(name)?),
                direction
            ))
        })
        .collect();
    Ok(terms?.join(", "))
}

/// Build an AND-joined WHERE clause, appending bound parameters and advancing
/// the placeholder index.
pub(crate) fn render_where(
    dialect: &(impl Dialect + ?Sized),
    filter: &[FilterClause],
    index: &mut usize,
    params: &mut Vec<SqlParam>,
) -> DbResult<String> {
    let mut conditions = Vec::with_capacity(filter.len());
    for clause in filter {
        let column = dialect.quote_ident(ensure_ident(&clause.column)?);
        let mut bind = |value: &SqlParam| {
            let ph = dialect.placeholder(*index);
            *index += 1;
            params.push(value.clone());
            ph
        };
        let condition = match &clause.op {
            FilterOp::Eq(v) if v.is_null() => format!("{} IS NULL", column),
            FilterOp::Eq(v) => format!("{} = {}", column, bind(v)),
            FilterOp::Ne(v) => format!("{} <> {}", column, bind(v)),
            FilterOp::Gt(v) => format!("{} > {}", column, bind(v)),
            FilterOp::Gte(v) => format!("{} >= {}", column, bind(v)),
            FilterOp::Lt(v) => format!("{} < {}", column, bind(v)),
            FilterOp::Lte(v) => format!("{} <= {}", column, bind(v)),
            FilterOp::Like(v) => format!("{} LIKE {}", column, bind(v)),
            FilterOp::NotLike(v) => format!("{} NOT LIKE {}", column, bind(v)),
            // Empty IN can never match; empty NOT IN always matches
            FilterOp::In(values) if values.is_empty() => "1 = 0".to_string(),
            FilterOp::NotIn(values) if values.is_empty() => "1 = 1".to_string(),
            FilterOp::In(values) => {
                let placeholders: Vec<String> = values.iter().map(&mut bind).collect();
                format!("{} IN ({})", column, placeholders.join(", "))
            }
            FilterOp::NotIn(values) => {
                let placeholders: Vec<String> = values.iter().map(&mut bind).collect();
                format!("{} NOT IN ({})", column, placeholders.join(", "))
            }
            FilterOp::Between(low, high) => {
                let low_ph = bind(low);
                let high_ph = bind(high);
                format!("{} BETWEEN {} AND {}", column, low_ph, high_ph)
            }
            FilterOp::IsNull(true) => format!("{} IS NULL", column),
            FilterOp::IsNull(false) => format!("{} IS NOT NULL", column),
        };
        conditions.push(condition);
    }
    Ok(conditions.join(" AND "))
}

/// Generic native → logical type mapping shared by the dialects.
pub fn logical_type_from_native(native: &str) -> LogicalType {
    let lower = native.to_lowercase();

    if lower.contains("bigint") || lower == "int8" || lower == "bigserial" {
        return LogicalType::BigInt;
    }
    if lower.contains("int") || lower.contains("serial") || lower == "bit" {
        // MySQL TINYINT(1) and SQL Server BIT are the conventional booleans
        if lower.starts_with("tinyint(1)") || lower == "bit" {
            return LogicalType::Boolean;
        }
        return LogicalType::Integer;
    }
    if lower == "bool" || lower == "boolean" {
        return LogicalType::Boolean;
    }
    if lower.contains("decimal") || lower.contains("numeric") || lower.contains("money") {
        return LogicalType::Decimal;
    }
    if lower.contains("float")
        || lower.contains("double")
        || lower.contains("real")
    {
        return LogicalType::Real;
    }
    if lower.contains("blob")
        || lower.contains("binary")
        || lower == "bytea"
        || lower == "image"
    {
        return LogicalType::Blob;
    }
    if lower.contains("datetime") || lower.contains("timestamp") {
        return LogicalType::DateTime;
    }
    if lower == "date" {
        return LogicalType::Date;
    }
    LogicalType::Text
}
