//! Backend connection handles.
//!
//! One live handle per registered connection. The sqlx-backed kinds hold a
//! driver pool capped at a single connection; SQL Server holds one dedicated
//! TDS client. Opening a handle doubles as the connectivity probe: the
//! backend must answer `SELECT 1` before `add_connection` reports success.

use crate::error::{DbError, DbResult};
use crate::models::{BackendKind, ConnectParams};
use sqlx::{
    MySqlPool, PgPool, SqlitePool, mysql::MySqlConnectOptions, mysql::MySqlPoolOptions,
    postgres::PgPoolOptions, sqlite::SqliteConnectOptions, sqlite::SqlitePoolOptions,
};
use std::str::FromStr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::warn;

/// Connect timeout applied to handle opening.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Dedicated SQL Server client over a TDS stream.
pub type MssqlClient = tiberius::Client<Compat<TcpStream>>;

/// A live connection to one backend.
pub enum BackendHandle {
    SQLite(SqlitePool),
    Postgres(PgPool),
    MySql(MySqlPool),
    MsSql(Box<MssqlClient>),
}

impl BackendHandle {
    /// Open a handle for `kind` and probe connectivity with `SELECT 1`.
    pub async fn open(kind: BackendKind, params: &ConnectParams) -> DbResult<Self> {
        let mut handle = match kind {
            BackendKind::SQLite => {
                let url = params.sqlx_url(kind)?;
                let options = SqliteConnectOptions::from_str(&url)
                    .map_err(|e| {
                        DbError::invalid_params(format!("invalid sqlite path: {}", e))
                    })?
                    .create_if_missing(true);
                let pool = SqlitePoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(CONNECT_TIMEOUT)
                    .connect_with(options)
                    .await
                    .map_err(|e| connect_error(kind, &e))?;
                Self::SQLite(pool)
            }
            BackendKind::Postgres => {
                let url = params.sqlx_url(kind)?;
                let pool = PgPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(CONNECT_TIMEOUT)
                    .connect(&url)
                    .await
                    .map_err(|e| connect_error(kind, &e))?;
                Self::Postgres(pool)
            }
            BackendKind::MySql => {
                let url = params.sqlx_url(kind)?;
                let options = MySqlConnectOptions::from_str(&url)
                    .map_err(|e| {
                        DbError::invalid_params(format!("invalid mysql parameters: {}", e))
                    })?
                    .charset("utf8mb4");
                let pool = MySqlPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(CONNECT_TIMEOUT)
                    .connect_with(options)
                    .await
                    .map_err(|e| connect_error(kind, &e))?;
                Self::MySql(pool)
            }
            BackendKind::MsSql => {
                let client = connect_mssql(params).await?;
                Self::MsSql(Box::new(client))
            }
        };

        handle.ping().await?;
        Ok(handle)
    }

    /// Get the backend kind for this handle.
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::SQLite(_) => BackendKind::SQLite,
            Self::Postgres(_) => BackendKind::Postgres,
            Self::MySql(_) => BackendKind::MySql,
            Self::MsSql(_) => BackendKind::MsSql,
        }
    }

    /// Round-trip the backend's no-op statement.
    pub async fn ping(&mut self) -> DbResult<()> {
        let probe = self.kind().probe_statement();
        match self {
            Self::SQLite(pool) => {
                sqlx::query(probe).execute(&*pool).await?;
            }
            Self::Postgres(pool) => {
                sqlx::query(probe).execute(&*pool).await?;
            }
            Self::MySql(pool) => {
                sqlx::query(probe).execute(&*pool).await?;
            }
            Self::MsSql(client) => {
                client.simple_query(probe).await?.into_results().await?;
            }
        }
        Ok(())
    }

    /// Close the handle. Invalidates it permanently.
    pub async fn close(self) {
        match self {
            Self::SQLite(pool) => pool.close().await,
            Self::Postgres(pool) => pool.close().await,
            Self::MySql(pool) => pool.close().await,
            Self::MsSql(client) => {
                if let Err(e) = client.close().await {
                    warn!(error = %e, "Error closing SQL Server connection");
                }
            }
        }
    }
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BackendHandle")
            .field(&self.kind().display_name())
            .finish()
    }
}

/// Establish a dedicated TDS connection.
async fn connect_mssql(params: &ConnectParams) -> DbResult<MssqlClient> {
    let host = params
        .host
        .as_deref()
        .ok_or_else(|| DbError::invalid_params("missing 'host'"))?;
    let port = params.port_or_default(BackendKind::MsSql);

    let mut config = tiberius::Config::new();
    config.host(host);
    config.port(port);
    if let (Some(user), Some(password)) = (&params.user, &params.password) {
        config.authentication(tiberius::AuthMethod::sql_server(user, password));
    }
    if let Some(database) = &params.database {
        config.database(database);
    }
    config.encryption(tiberius::EncryptionLevel::NotSupported);
    config.trust_cert();

    let tcp = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(config.get_addr()))
        .await
        .map_err(|_| DbError::timeout("mssql connect", CONNECT_TIMEOUT.as_secs()))?
        .map_err(|e| {
            DbError::connection_failed(format!("Failed to reach {}:{}: {}", host, port, e))
        })?;
    tcp.set_nodelay(true).ok();

    tiberius::Client::connect(config, tcp.compat_write())
        .await
        .map_err(|e| DbError::connection_failed(format!("TDS handshake failed: {}", e)))
}

fn connect_error(kind: BackendKind, err: &sqlx::Error) -> DbError {
    DbError::connection_failed(format!("Failed to connect to {}: {}", kind, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_sqlite_and_ping() {
        let dir = tempfile::tempdir().unwrap();
        let params = ConnectParams {
            path: Some(dir.path().join("t.db").display().to_string()),
            ..Default::default()
        };
        let mut handle = BackendHandle::open(BackendKind::SQLite, &params)
            .await
            .unwrap();
        assert_eq!(handle.kind(), BackendKind::SQLite);
        handle.ping().await.unwrap();
        handle.close().await;
    }

    #[tokio::test]
    async fn test_open_sqlite_bad_path_fails() {
        let params = ConnectParams {
            path: Some("/nonexistent-dir/deeper/t.db".to_string()),
            ..Default::default()
        };
        let result = BackendHandle::open(BackendKind::SQLite, &params).await;
        assert!(result.is_err());
    }
}
