//! Connection registry.
//!
//! Owns the mapping from caller-supplied connection identifiers to live
//! sessions (backend handle + transaction state). The locking discipline is
//! the correctness core of the server:
//!
//! - the registry map sits behind an `RwLock` held only for map lookups and
//!   mutations, never across backend I/O on an entry;
//! - each entry owns a `tokio::sync::Mutex<Session>` acquired for the whole
//!   of every statement, transaction transition, and removal, so operations
//!   on one identifier are serialized while different identifiers proceed in
//!   parallel;
//! - removal closes the handle while holding the session lock and leaves the
//!   session marked closed, so a statement that was queued behind it wakes to
//!   a clean `NotFound` instead of a half-closed handle.

use crate::db::handle::BackendHandle;
use crate::db::transaction::Session;
use crate::dialect::{Dialect, dialect_for};
use crate::error::{DbError, DbResult};
use crate::models::{BackendKind, ConnectParams, ConnectionProfile, validate_connection_id};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::info;

struct ConnectionEntry {
    id: String,
    kind: BackendKind,
    params: ConnectParams,
    session: Arc<Mutex<Session>>,
    tx_active: Arc<AtomicBool>,
}

/// Exclusive access to one connection's session for the duration of an
/// operation. Holding the lease is what makes "resolve connection → execute
/// statement" atomic with respect to removal.
pub struct ConnectionLease {
    entry: Arc<ConnectionEntry>,
    session: OwnedMutexGuard<Session>,
}

impl std::fmt::Debug for ConnectionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLease")
            .field("id", &self.entry.id)
            .field("kind", &self.entry.kind)
            .finish()
    }
}

impl ConnectionLease {
    pub fn kind(&self) -> BackendKind {
        self.entry.kind
    }

    pub fn dialect(&self) -> &'static dyn Dialect {
        dialect_for(self.entry.kind)
    }

    pub fn session(&mut self) -> &mut Session {
        &mut self.session
    }
}

/// Registry of named backend connections.
///
/// Constructed at transport startup and torn down (closing all handles) at
/// shutdown; there is no ambient global state.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    entries: Arc<RwLock<HashMap<String, Arc<ConnectionEntry>>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection.
    ///
    /// Validates the identifier and per-kind parameters, opens the backend
    /// handle (connectivity probe included), and stores the record with an
    /// idle transaction state. A duplicate identifier fails with
    /// `DuplicateIdentifier` and leaves the existing connection untouched.
    pub async fn add(
        &self,
        id: impl Into<String>,
        kind: BackendKind,
        params: ConnectParams,
    ) -> DbResult<()> {
        let id = id.into();
        validate_connection_id(&id)?;
        params.validate(kind)?;

        // Early check before paying for the connect
        {
            let entries = self.entries.read().await;
            if entries.contains_key(&id) {
                return Err(DbError::duplicate_identifier(id));
            }
        }

        info!(connection_id = %id, kind = %kind, "Opening connection");
        let handle = BackendHandle::open(kind, &params).await?;

        // Re-check after the async connect; a racing add may have won.
        // The losing handle is closed outside the lock.
        let stale = {
            let mut entries = self.entries.write().await;
            if entries.contains_key(&id) {
                Some(handle)
            } else {
                let tx_active = Arc::new(AtomicBool::new(false));
                let session = Session::new(id.clone(), handle, tx_active.clone());
                entries.insert(
                    id.clone(),
                    Arc::new(ConnectionEntry {
                        id: id.clone(),
                        kind,
                        params,
                        session: Arc::new(Mutex::new(session)),
                        tx_active,
                    }),
                );
                None
            }
        };

        if let Some(handle) = stale {
            handle.close().await;
            return Err(DbError::duplicate_identifier(id));
        }

        info!(connection_id = %id, kind = %kind, "Connection registered");
        Ok(())
    }

    /// Acquire the session lease for an identifier.
    ///
    /// Waits behind any in-flight operation on the same identifier. An entry
    /// removed while waiting surfaces as `NotFound`.
    pub async fn lease(&self, id: &str) -> DbResult<ConnectionLease> {
        let entry = {
            let entries = self.entries.read().await;
            entries
                .get(id)
                .cloned()
                .ok_or_else(|| DbError::not_found(id))?
        };
        let session = entry.session.clone().lock_owned().await;
        if session.is_closed() {
            return Err(DbError::not_found(id));
        }
        Ok(ConnectionLease { entry, session })
    }

    /// Round-trip a no-op statement on the stored handle.
    ///
    /// Does not touch transaction state. Retried once on a transient
    /// connection failure, as a read-only probe is safe to repeat.
    pub async fn test(&self, id: &str) -> DbResult<bool> {
        let mut lease = self.lease(id).await?;
        let first = lease.session().handle_mut()?.ping().await;
        match first {
            Ok(()) => Ok(true),
            Err(e) if e.is_retryable() => {
                lease.session().handle_mut()?.ping().await?;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// List registered connections with masked parameters.
    pub async fn list(&self) -> Vec<ConnectionProfile> {
        let entries = self.entries.read().await;
        let mut profiles: Vec<ConnectionProfile> = entries
            .values()
            .map(|entry| ConnectionProfile {
                id: entry.id.clone(),
                kind: entry.kind,
                params: entry.params.masked(),
                transaction_active: entry.tx_active.load(Ordering::Relaxed),
            })
            .collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        profiles
    }

    /// Remove a connection, closing its handle.
    ///
    /// Policy: an open transaction blocks removal (`TransactionInProgress`,
    /// state unchanged); commit or rollback first. Removing an unknown
    /// identifier is `NotFound`, not a silent success.
    pub async fn remove(&self, id: &str) -> DbResult<()> {
        let entry = {
            let entries = self.entries.read().await;
            entries
                .get(id)
                .cloned()
                .ok_or_else(|| DbError::not_found(id))?
        };

        let mut session = entry.session.clone().lock_owned().await;
        if session.is_closed() {
            // A concurrent remove won while we waited for the lock
            return Err(DbError::not_found(id));
        }
        if session.transaction_active() {
            return Err(DbError::transaction_in_progress(id));
        }
        session.close().await;
        drop(session);

        let mut entries = self.entries.write().await;
        if let Some(current) = entries.get(id) {
            if Arc::ptr_eq(current, &entry) {
                entries.remove(id);
            }
        }
        info!(connection_id = %id, "Connection removed");
        Ok(())
    }

    /// Whether an identifier is registered.
    pub async fn exists(&self, id: &str) -> bool {
        self.entries.read().await.contains_key(id)
    }

    /// Number of registered connections.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Close every connection, rolling back open transactions. Called at
    /// transport shutdown.
    pub async fn close_all(&self) {
        let drained: Vec<Arc<ConnectionEntry>> = {
            let mut entries = self.entries.write().await;
            entries.drain().map(|(_, entry)| entry).collect()
        };
        for entry in drained {
            let mut session = entry.session.lock().await;
            info!(connection_id = %entry.id, "Closing connection");
            session.close().await;
        }
        info!("All connections closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_starts_empty() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.count().await, 0);
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_lease_unknown_id_is_not_found() {
        let registry = ConnectionRegistry::new();
        let err = registry.lease("nope").await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_remove_unknown_id_is_not_found() {
        let registry = ConnectionRegistry::new();
        let err = registry.remove("nope").await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_add_rejects_invalid_identifier() {
        let registry = ConnectionRegistry::new();
        let params = ConnectParams {
            path: Some(":memory:".to_string()),
            ..Default::default()
        };
        let err = registry
            .add("bad id!", BackendKind::SQLite, params)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_params");
    }

    #[tokio::test]
    async fn test_add_rejects_missing_params() {
        let registry = ConnectionRegistry::new();
        let err = registry
            .add("pg", BackendKind::Postgres, ConnectParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_params");
    }
}
