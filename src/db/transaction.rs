//! Per-connection session state and the transaction state machine.
//!
//! A [`Session`] owns one backend handle and its transaction state. The only
//! transitions are `Idle -(begin)-> Active -(commit|rollback)-> Idle`; there
//! is no nesting and no savepoints. The registry wraps every session in a
//! per-identifier mutex, so transitions are atomic with respect to statement
//! execution on the same connection.

use crate::db::handle::BackendHandle;
use crate::error::{DbError, DbResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// An open transaction.
///
/// The sqlx backends hold a dedicated transaction object checked out of the
/// handle. SQL Server runs the transaction on the session's single client, so
/// only a marker is needed; BEGIN/COMMIT/ROLLBACK are statements on that
/// client.
pub enum ActiveTx {
    SQLite(sqlx::Transaction<'static, sqlx::Sqlite>),
    Postgres(sqlx::Transaction<'static, sqlx::Postgres>),
    MySql(sqlx::Transaction<'static, sqlx::MySql>),
    MsSql,
}

/// Live state of one registered connection: the backend handle and the
/// current transaction, if any. `handle == None` marks a closed session;
/// late waiters on the session lock observe that instead of a half-closed
/// handle.
pub struct Session {
    connection_id: String,
    pub(crate) handle: Option<BackendHandle>,
    pub(crate) tx: Option<ActiveTx>,
    tx_active: Arc<AtomicBool>,
}

impl Session {
    pub(crate) fn new(
        connection_id: String,
        handle: BackendHandle,
        tx_active: Arc<AtomicBool>,
    ) -> Self {
        Self {
            connection_id,
            handle: Some(handle),
            tx: None,
            tx_active,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Whether an explicit transaction is open.
    pub fn transaction_active(&self) -> bool {
        self.tx.is_some()
    }

    /// Whether the session has been closed by remove/shutdown.
    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    /// Access the live handle, or report the connection as gone.
    pub(crate) fn handle_mut(&mut self) -> DbResult<&mut BackendHandle> {
        let connection_id = &self.connection_id;
        self.handle
            .as_mut()
            .ok_or_else(|| DbError::not_found(connection_id))
    }

    /// Split borrow for the executor: handle and optional transaction.
    pub(crate) fn parts(&mut self) -> DbResult<(&mut BackendHandle, Option<&mut ActiveTx>)> {
        let Session {
            connection_id,
            handle,
            tx,
            ..
        } = self;
        let handle = handle
            .as_mut()
            .ok_or_else(|| DbError::not_found(connection_id.as_str()))?;
        Ok((handle, tx.as_mut()))
    }

    /// `Idle -> Active`. Fails with `TransactionAlreadyActive` when a
    /// transaction is already open.
    pub async fn begin(&mut self) -> DbResult<()> {
        if self.tx.is_some() {
            return Err(DbError::transaction_already_active(&self.connection_id));
        }
        let tx = match self.handle_mut()? {
            BackendHandle::SQLite(pool) => ActiveTx::SQLite(pool.begin().await?),
            BackendHandle::Postgres(pool) => ActiveTx::Postgres(pool.begin().await?),
            BackendHandle::MySql(pool) => ActiveTx::MySql(pool.begin().await?),
            BackendHandle::MsSql(client) => {
                client
                    .simple_query("BEGIN TRANSACTION")
                    .await?
                    .into_results()
                    .await?;
                ActiveTx::MsSql
            }
        };
        self.tx = Some(tx);
        self.tx_active.store(true, Ordering::Relaxed);
        info!(connection_id = %self.connection_id, "Transaction started");
        Ok(())
    }

    /// `Active -> Idle`, committing. Fails with `NoActiveTransaction` when
    /// idle. The state is Idle afterwards even if the backend commit failed;
    /// the transaction object is consumed either way.
    pub async fn commit(&mut self) -> DbResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| DbError::no_active_transaction(&self.connection_id))?;
        self.tx_active.store(false, Ordering::Relaxed);
        match tx {
            ActiveTx::SQLite(tx) => tx.commit().await?,
            ActiveTx::Postgres(tx) => tx.commit().await?,
            ActiveTx::MySql(tx) => tx.commit().await?,
            ActiveTx::MsSql => {
                self.handle_mut()?
                    .mssql_client()?
                    .simple_query("COMMIT")
                    .await?
                    .into_results()
                    .await?;
            }
        }
        info!(connection_id = %self.connection_id, "Transaction committed");
        Ok(())
    }

    /// `Active -> Idle`, discarding. Fails with `NoActiveTransaction` when idle.
    pub async fn rollback(&mut self) -> DbResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| DbError::no_active_transaction(&self.connection_id))?;
        self.tx_active.store(false, Ordering::Relaxed);
        match tx {
            ActiveTx::SQLite(tx) => tx.rollback().await?,
            ActiveTx::Postgres(tx) => tx.rollback().await?,
            ActiveTx::MySql(tx) => tx.rollback().await?,
            ActiveTx::MsSql => {
                self.handle_mut()?
                    .mssql_client()?
                    .simple_query("ROLLBACK")
                    .await?
                    .into_results()
                    .await?;
            }
        }
        info!(connection_id = %self.connection_id, "Transaction rolled back");
        Ok(())
    }

    /// Roll back any open transaction, swallowing errors. Used on shutdown.
    pub(crate) async fn rollback_best_effort(&mut self) {
        if self.tx.is_some() {
            warn!(
                connection_id = %self.connection_id,
                "Rolling back open transaction"
            );
            if let Err(e) = self.rollback().await {
                warn!(connection_id = %self.connection_id, error = %e, "Rollback failed");
            }
        }
    }

    /// Close the backend handle, rolling back first if needed. The session is
    /// permanently unusable afterwards.
    pub(crate) async fn close(&mut self) {
        self.rollback_best_effort().await;
        self.tx_active.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.close().await;
        }
    }
}

impl BackendHandle {
    /// The dedicated TDS client, for transaction statements.
    fn mssql_client(&mut self) -> DbResult<&mut crate::db::handle::MssqlClient> {
        match self {
            BackendHandle::MsSql(client) => Ok(client),
            _ => Err(DbError::internal(
                "mssql transaction marker on a non-mssql handle",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BackendKind, ConnectParams};

    async fn sqlite_session(dir: &tempfile::TempDir) -> Session {
        let params = ConnectParams {
            path: Some(dir.path().join("tx.db").display().to_string()),
            ..Default::default()
        };
        let handle = BackendHandle::open(BackendKind::SQLite, &params)
            .await
            .unwrap();
        Session::new(
            "test".to_string(),
            handle,
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[tokio::test]
    async fn test_begin_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = sqlite_session(&dir).await;

        session.begin().await.unwrap();
        assert!(session.transaction_active());

        let err = session.begin().await.unwrap_err();
        assert_eq!(err.kind(), "transaction_already_active");
        // State unchanged: the original transaction is still open
        assert!(session.transaction_active());

        session.rollback().await.unwrap();
        session.close().await;
    }

    #[tokio::test]
    async fn test_commit_on_idle_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = sqlite_session(&dir).await;

        let err = session.commit().await.unwrap_err();
        assert_eq!(err.kind(), "no_active_transaction");
        let err = session.rollback().await.unwrap_err();
        assert_eq!(err.kind(), "no_active_transaction");

        session.close().await;
    }

    #[tokio::test]
    async fn test_begin_after_commit_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = sqlite_session(&dir).await;

        session.begin().await.unwrap();
        session.commit().await.unwrap();
        assert!(!session.transaction_active());

        session.begin().await.unwrap();
        session.rollback().await.unwrap();
        assert!(!session.transaction_active());

        session.close().await;
    }

    #[tokio::test]
    async fn test_closed_session_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = sqlite_session(&dir).await;

        session.close().await;
        assert!(session.is_closed());
        let err = session.begin().await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
