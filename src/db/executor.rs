//! Statement execution engine.
//!
//! Runs raw SQL with driver-bound parameters against a leased session.
//! Execution always happens in whatever transaction state the connection
//! holds: an open transaction receives the statement, otherwise the handle
//! auto-commits per statement. No operation here starts or ends a
//! transaction.
//!
//! Row reads stream with a `limit + 1` fetch so truncation is detected
//! without pulling the whole result set. Driver timeouts surface as
//! `Timeout`; nothing is retried (a mutating statement must not be applied
//! twice).
//!
//! The per-backend submodules are intentionally parallel in structure to
//! keep their differences obvious.

use crate::db::transaction::{ActiveTx, Session};
use crate::db::types::{RowToJson, mssql_column_metadata, mssql_row_to_json};
use crate::db::handle::BackendHandle;
use crate::error::{DbError, DbResult};
use crate::models::{
    DEFAULT_ROW_LIMIT, DEFAULT_STATEMENT_TIMEOUT_SECS, MAX_ROW_LIMIT,
    MAX_STATEMENT_TIMEOUT_SECS, QueryResult, SqlParam,
};
use std::time::{Duration, Instant};
use tracing::debug;

/// Statement executor with default limits and timeouts.
pub struct StatementExecutor {
    default_timeout: Duration,
    default_limit: u32,
}

impl StatementExecutor {
    /// Create an executor with default settings.
    pub fn new() -> Self {
        Self {
            default_timeout: Duration::from_secs(DEFAULT_STATEMENT_TIMEOUT_SECS as u64),
            default_limit: DEFAULT_ROW_LIMIT,
        }
    }

    fn effective_timeout(&self, timeout_secs: Option<u32>) -> Duration {
        timeout_secs
            .map(|t| Duration::from_secs(t.min(MAX_STATEMENT_TIMEOUT_SECS) as u64))
            .unwrap_or(self.default_timeout)
    }

    fn effective_limit(&self, limit: Option<u32>) -> u32 {
        limit
            .map(|l| l.clamp(1, MAX_ROW_LIMIT))
            .unwrap_or(self.default_limit)
    }

    /// Execute a row-returning statement.
    pub async fn fetch(
        &self,
        session: &mut Session,
        sql: &str,
        params: &[SqlParam],
        limit: Option<u32>,
        timeout_secs: Option<u32>,
    ) -> DbResult<QueryResult> {
        let start = Instant::now();
        let row_limit = self.effective_limit(limit);
        let fetch_limit = row_limit as usize + 1;
        let timeout = self.effective_timeout(timeout_secs);
        let dialect = crate::dialect::dialect_for(session.parts()?.0.kind());

        debug!(
            connection_id = %session.connection_id(),
            params = params.len(),
            limit = row_limit,
            "Executing query"
        );

        let result = match session.parts()? {
            (BackendHandle::SQLite(pool), tx) => {
                let rows = match tx {
                    Some(ActiveTx::SQLite(tx)) => {
                        sqlite::fetch(&mut **tx, sql, params, fetch_limit, timeout).await
                    }
                    _ => sqlite::fetch(&*pool, sql, params, fetch_limit, timeout).await,
                };
                rows.map(|rows| process_rows(rows, row_limit, start))
            }
            (BackendHandle::Postgres(pool), tx) => {
                let rows = match tx {
                    Some(ActiveTx::Postgres(tx)) => {
                        postgres::fetch(&mut **tx, sql, params, fetch_limit, timeout).await
                    }
                    _ => postgres::fetch(&*pool, sql, params, fetch_limit, timeout).await,
                };
                rows.map(|rows| process_rows(rows, row_limit, start))
            }
            (BackendHandle::MySql(pool), tx) => {
                let rows = match tx {
                    Some(ActiveTx::MySql(tx)) => {
                        mysql::fetch(&mut **tx, sql, params, fetch_limit, timeout).await
                    }
                    _ => mysql::fetch(&*pool, sql, params, fetch_limit, timeout).await,
                };
                rows.map(|rows| process_rows(rows, row_limit, start))
            }
            (BackendHandle::MsSql(client), _) => {
                // Transactions share the dedicated client
                mssql::fetch(client, sql, params, row_limit, timeout, start).await
            }
        };
        result.map_err(|e| dialect.classify_error(e))
    }

    /// Execute a mutating statement (INSERT/UPDATE/DELETE/DDL).
    pub async fn execute(
        &self,
        session: &mut Session,
        sql: &str,
        params: &[SqlParam],
        timeout_secs: Option<u32>,
    ) -> DbResult<QueryResult> {
        let start = Instant::now();
        let timeout = self.effective_timeout(timeout_secs);
        let dialect = crate::dialect::dialect_for(session.parts()?.0.kind());

        debug!(
            connection_id = %session.connection_id(),
            params = params.len(),
            "Executing write statement"
        );

        let outcome = match session.parts()? {
            (BackendHandle::SQLite(pool), tx) => match tx {
                Some(ActiveTx::SQLite(tx)) => {
                    sqlite::execute(&mut **tx, sql, params, timeout).await
                }
                _ => sqlite::execute(&*pool, sql, params, timeout).await,
            },
            (BackendHandle::Postgres(pool), tx) => match tx {
                Some(ActiveTx::Postgres(tx)) => {
                    postgres::execute(&mut **tx, sql, params, timeout).await
                }
                _ => postgres::execute(&*pool, sql, params, timeout).await,
            },
            (BackendHandle::MySql(pool), tx) => match tx {
                Some(ActiveTx::MySql(tx)) => {
                    mysql::execute(&mut **tx, sql, params, timeout).await
                }
                _ => mysql::execute(&*pool, sql, params, timeout).await,
            },
            (BackendHandle::MsSql(client), _) => {
                mssql::execute(client, sql, params, timeout).await
            }
        };

        let (rows_affected, last_insert_id) = outcome.map_err(|e| dialect.classify_error(e))?;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        debug!(
            connection_id = %session.connection_id(),
            rows_affected,
            execution_time_ms,
            "Write statement executed"
        );

        Ok(QueryResult::write_result(
            rows_affected,
            last_insert_id,
            execution_time_ms,
        ))
    }
}

impl Default for StatementExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Process fetched rows into a normalized result.
fn process_rows<R: RowToJson>(rows: Vec<R>, row_limit: u32, start: Instant) -> QueryResult {
    let execution_time_ms = start.elapsed().as_millis() as u64;

    if rows.is_empty() {
        return QueryResult::empty(execution_time_ms);
    }

    let columns = rows[0].column_metadata();
    let truncated = rows.len() > row_limit as usize;
    let rows: Vec<serde_json::Map<String, serde_json::Value>> = rows
        .iter()
        .take(row_limit as usize)
        .map(|r| r.to_json_map())
        .collect();

    QueryResult {
        columns,
        rows,
        rows_affected: None,
        last_insert_id: None,
        truncated,
        execution_time_ms,
    }
}

fn collect_rows<R>(results: Vec<Result<R, sqlx::Error>>) -> DbResult<Vec<R>> {
    let mut rows = Vec::with_capacity(results.len());
    for result in results {
        rows.push(result.map_err(DbError::from)?);
    }
    Ok(rows)
}

fn timeout_error(operation: &str, timeout: Duration) -> DbError {
    DbError::timeout(operation, timeout.as_secs())
}

// =============================================================================
// Backend implementations
// =============================================================================

mod sqlite {
    use super::*;
    use futures_util::StreamExt;
    use sqlx::Sqlite;
    use sqlx::sqlite::{SqliteArguments, SqliteRow};

    pub async fn fetch<'e, E>(
        target: E,
        sql: &str,
        params: &[SqlParam],
        fetch_limit: usize,
        timeout: Duration,
    ) -> DbResult<Vec<SqliteRow>>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        // Raw SQL without params avoids the prepared-statement path for
        // statements that cannot be prepared
        let rows_future = if params.is_empty() {
            target.fetch(sql).take(fetch_limit).collect::<Vec<_>>()
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind(query, param);
            }
            query.fetch(target).take(fetch_limit).collect::<Vec<_>>()
        };

        match tokio::time::timeout(timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", timeout)),
        }
    }

    pub async fn execute<'e, E>(
        target: E,
        sql: &str,
        params: &[SqlParam],
        timeout: Duration,
    ) -> DbResult<(u64, Option<i64>)>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let result = if params.is_empty() {
            tokio::time::timeout(timeout, target.execute(sql)).await
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind(query, param);
            }
            tokio::time::timeout(timeout, query.execute(target)).await
        };

        match result {
            Ok(Ok(r)) => {
                let last_id = (r.last_insert_rowid() != 0).then(|| r.last_insert_rowid());
                Ok((r.rows_affected(), last_id))
            }
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("write statement", timeout)),
        }
    }

    fn bind<'q>(
        query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
        param: &'q SqlParam,
    ) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
        match param {
            SqlParam::Null => query.bind(None::<String>),
            SqlParam::Bool(v) => query.bind(*v),
            SqlParam::Int(v) => query.bind(*v),
            SqlParam::Float(v) => query.bind(*v),
            SqlParam::String(v) => query.bind(v.as_str()),
            SqlParam::Bytes(v) => query.bind(v.as_slice()),
        }
    }
}

mod postgres {
    use super::*;
    use futures_util::StreamExt;
    use sqlx::Postgres;
    use sqlx::postgres::{PgArguments, PgRow};

    pub async fn fetch<'e, E>(
        target: E,
        sql: &str,
        params: &[SqlParam],
        fetch_limit: usize,
        timeout: Duration,
    ) -> DbResult<Vec<PgRow>>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let rows_future = if params.is_empty() {
            target.fetch(sql).take(fetch_limit).collect::<Vec<_>>()
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind(query, param);
            }
            query.fetch(target).take(fetch_limit).collect::<Vec<_>>()
        };

        match tokio::time::timeout(timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", timeout)),
        }
    }

    pub async fn execute<'e, E>(
        target: E,
        sql: &str,
        params: &[SqlParam],
        timeout: Duration,
    ) -> DbResult<(u64, Option<i64>)>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let result = if params.is_empty() {
            tokio::time::timeout(timeout, target.execute(sql)).await
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind(query, param);
            }
            tokio::time::timeout(timeout, query.execute(target)).await
        };

        match result {
            // No generated-key channel without RETURNING
            Ok(Ok(r)) => Ok((r.rows_affected(), None)),
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("write statement", timeout)),
        }
    }

    fn bind<'q>(
        query: sqlx::query::Query<'q, Postgres, PgArguments>,
        param: &'q SqlParam,
    ) -> sqlx::query::Query<'q, Postgres, PgArguments> {
        match param {
            SqlParam::Null => query.bind(None::<String>),
            SqlParam::Bool(v) => query.bind(*v),
            SqlParam::Int(v) => query.bind(*v),
            SqlParam::Float(v) => query.bind(*v),
            SqlParam::String(v) => query.bind(v.as_str()),
            SqlParam::Bytes(v) => query.bind(v.as_slice()),
        }
    }
}

mod mysql {
    use super::*;
    use futures_util::StreamExt;
    use sqlx::MySql;
    use sqlx::mysql::{MySqlArguments, MySqlRow};

    pub async fn fetch<'e, E>(
        target: E,
        sql: &str,
        params: &[SqlParam],
        fetch_limit: usize,
        timeout: Duration,
    ) -> DbResult<Vec<MySqlRow>>
    where
        E: sqlx::Executor<'e, Database = MySql>,
    {
        let rows_future = if params.is_empty() {
            target.fetch(sql).take(fetch_limit).collect::<Vec<_>>()
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind(query, param);
            }
            query.fetch(target).take(fetch_limit).collect::<Vec<_>>()
        };

        match tokio::time::timeout(timeout, rows_future).await {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", timeout)),
        }
    }

    pub async fn execute<'e, E>(
        target: E,
        sql: &str,
        params: &[SqlParam],
        timeout: Duration,
    ) -> DbResult<(u64, Option<i64>)>
    where
        E: sqlx::Executor<'e, Database = MySql>,
    {
        let result = if params.is_empty() {
            tokio::time::timeout(timeout, target.execute(sql)).await
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind(query, param);
            }
            tokio::time::timeout(timeout, query.execute(target)).await
        };

        match result {
            Ok(Ok(r)) => {
                let last_id = (r.last_insert_id() != 0).then(|| r.last_insert_id() as i64);
                Ok((r.rows_affected(), last_id))
            }
            Ok(Err(e)) => Err(DbError::from(e)),
            Err(_) => Err(timeout_error("write statement", timeout)),
        }
    }

    fn bind<'q>(
        query: sqlx::query::Query<'q, MySql, MySqlArguments>,
        param: &'q SqlParam,
    ) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
        match param {
            SqlParam::Null => query.bind(None::<String>),
            SqlParam::Bool(v) => query.bind(*v),
            SqlParam::Int(v) => query.bind(*v),
            SqlParam::Float(v) => query.bind(*v),
            SqlParam::String(v) => query.bind(v.as_str()),
            SqlParam::Bytes(v) => query.bind(v.as_slice()),
        }
    }
}

mod mssql {
    use super::*;
    use crate::db::handle::MssqlClient;

    pub async fn fetch(
        client: &mut MssqlClient,
        sql: &str,
        params: &[SqlParam],
        row_limit: u32,
        timeout: Duration,
        start: Instant,
    ) -> DbResult<QueryResult> {
        let rows_future = async {
            if params.is_empty() {
                client.simple_query(sql).await?.into_first_result().await
            } else {
                let refs: Vec<&dyn tiberius::ToSql> =
                    params.iter().map(|p| p as &dyn tiberius::ToSql).collect();
                client.query(sql, &refs).await?.into_first_result().await
            }
        };

        let mut rows = match tokio::time::timeout(timeout, rows_future).await {
            Ok(result) => result.map_err(DbError::from)?,
            Err(_) => return Err(timeout_error("query execution", timeout)),
        };

        let execution_time_ms = start.elapsed().as_millis() as u64;
        if rows.is_empty() {
            return Ok(QueryResult::empty(execution_time_ms));
        }

        let columns = mssql_column_metadata(rows[0].columns());
        let truncated = rows.len() > row_limit as usize;
        rows.truncate(row_limit as usize);
        let rows: Vec<serde_json::Map<String, serde_json::Value>> =
            rows.iter().map(mssql_row_to_json).collect();

        Ok(QueryResult {
            columns,
            rows,
            rows_affected: None,
            last_insert_id: None,
            truncated,
            execution_time_ms,
        })
    }

    pub async fn execute(
        client: &mut MssqlClient,
        sql: &str,
        params: &[SqlParam],
        timeout: Duration,
    ) -> DbResult<(u64, Option<i64>)> {
        let exec_future = async {
            if params.is_empty() {
                client.execute(sql, &[]).await
            } else {
                let refs: Vec<&dyn tiberius::ToSql> =
                    params.iter().map(|p| p as &dyn tiberius::ToSql).collect();
                client.execute(sql, &refs).await
            }
        };

        match tokio::time::timeout(timeout, exec_future).await {
            Ok(result) => {
                let result = result.map_err(DbError::from)?;
                Ok((result.total(), None))
            }
            Err(_) => Err(timeout_error("write statement", timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_limit_clamping() {
        let executor = StatementExecutor::new();
        assert_eq!(executor.effective_limit(None), DEFAULT_ROW_LIMIT);
        assert_eq!(executor.effective_limit(Some(0)), 1);
        assert_eq!(executor.effective_limit(Some(99999)), MAX_ROW_LIMIT);
        assert_eq!(executor.effective_limit(Some(50)), 50);
    }

    #[test]
    fn test_effective_timeout_clamping() {
        let executor = StatementExecutor::new();
        assert_eq!(
            executor.effective_timeout(None),
            Duration::from_secs(DEFAULT_STATEMENT_TIMEOUT_SECS as u64)
        );
        assert_eq!(
            executor.effective_timeout(Some(999)),
            Duration::from_secs(MAX_STATEMENT_TIMEOUT_SECS as u64)
        );
        assert_eq!(executor.effective_timeout(Some(5)), Duration::from_secs(5));
    }
}
