//! Integration tests for the per-connection transaction state machine.

use dbhub_mcp_server::db::ConnectionRegistry;
use dbhub_mcp_server::models::{BackendKind, ConnectParams};
use dbhub_mcp_server::tools::query::{ExecuteQueryInput, QueryToolHandler};
use dbhub_mcp_server::tools::transaction::{
    BeginTransactionInput, CommitTransactionInput, RollbackTransactionInput,
    TransactionToolHandler,
};
use std::sync::Arc;

async fn sqlite_registry(dir: &tempfile::TempDir) -> Arc<ConnectionRegistry> {
    let registry = Arc::new(ConnectionRegistry::new());
    let params = ConnectParams {
        path: Some(dir.path().join("tx.db").display().to_string()),
        ..Default::default()
    };
    registry.add("db", BackendKind::SQLite, params).await.unwrap();
    registry
}

fn begin(id: &str) -> BeginTransactionInput {
    BeginTransactionInput {
        connection_id: id.to_string(),
    }
}

fn commit(id: &str) -> CommitTransactionInput {
    CommitTransactionInput {
        connection_id: id.to_string(),
    }
}

fn rollback(id: &str) -> RollbackTransactionInput {
    RollbackTransactionInput {
        connection_id: id.to_string(),
    }
}

fn query(id: &str, sql: &str) -> ExecuteQueryInput {
    ExecuteQueryInput {
        connection_id: id.to_string(),
        query: sql.to_string(),
        params: vec![],
        limit: None,
        timeout_secs: None,
    }
}

#[tokio::test]
async fn test_begin_begin_fails_with_already_active() {
    let dir = tempfile::tempdir().unwrap();
    let registry = sqlite_registry(&dir).await;
    let tx = TransactionToolHandler::new(registry.clone());

    let output = tx.begin_transaction(begin("db")).await.unwrap();
    assert_eq!(output.state, "active");

    let err = tx.begin_transaction(begin("db")).await.unwrap_err();
    assert_eq!(err.kind(), "transaction_already_active");

    // The original transaction survives and can be rolled back
    tx.rollback_transaction(rollback("db")).await.unwrap();
}

#[tokio::test]
async fn test_commit_and_rollback_on_idle_fail() {
    let dir = tempfile::tempdir().unwrap();
    let registry = sqlite_registry(&dir).await;
    let tx = TransactionToolHandler::new(registry.clone());

    let err = tx.commit_transaction(commit("db")).await.unwrap_err();
    assert_eq!(err.kind(), "no_active_transaction");

    let err = tx.rollback_transaction(rollback("db")).await.unwrap_err();
    assert_eq!(err.kind(), "no_active_transaction");
}

#[tokio::test]
async fn test_begin_succeeds_again_after_commit_and_rollback() {
    let dir = tempfile::tempdir().unwrap();
    let registry = sqlite_registry(&dir).await;
    let tx = TransactionToolHandler::new(registry.clone());

    tx.begin_transaction(begin("db")).await.unwrap();
    let output = tx.commit_transaction(commit("db")).await.unwrap();
    assert_eq!(output.state, "idle");

    tx.begin_transaction(begin("db")).await.unwrap();
    let output = tx.rollback_transaction(rollback("db")).await.unwrap();
    assert_eq!(output.state, "idle");

    tx.begin_transaction(begin("db")).await.unwrap();
    tx.rollback_transaction(rollback("db")).await.unwrap();
}

#[tokio::test]
async fn test_rollback_discards_and_commit_persists() {
    let dir = tempfile::tempdir().unwrap();
    let registry = sqlite_registry(&dir).await;
    let tx = TransactionToolHandler::new(registry.clone());
    let queries = QueryToolHandler::new(registry.clone());

    queries
        .execute_query(query(
            "db",
            "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)",
        ))
        .await
        .unwrap();

    // Rolled-back insert leaves no row
    tx.begin_transaction(begin("db")).await.unwrap();
    queries
        .execute_query(query("db", "INSERT INTO items (id, name) VALUES (1, 'a')"))
        .await
        .unwrap();
    tx.rollback_transaction(rollback("db")).await.unwrap();

    let result = queries
        .execute_query(query("db", "SELECT * FROM items"))
        .await
        .unwrap();
    assert_eq!(result.row_count, 0);

    // Committed insert persists
    tx.begin_transaction(begin("db")).await.unwrap();
    queries
        .execute_query(query("db", "INSERT INTO items (id, name) VALUES (2, 'b')"))
        .await
        .unwrap();
    tx.commit_transaction(commit("db")).await.unwrap();

    let result = queries
        .execute_query(query("db", "SELECT * FROM items"))
        .await
        .unwrap();
    assert_eq!(result.row_count, 1);
    assert_eq!(result.rows[0]["id"], serde_json::json!(2));
}

#[tokio::test]
async fn test_statement_error_does_not_auto_rollback() {
    let dir = tempfile::tempdir().unwrap();
    let registry = sqlite_registry(&dir).await;
    let tx = TransactionToolHandler::new(registry.clone());
    let queries = QueryToolHandler::new(registry.clone());

    queries
        .execute_query(query("db", "CREATE TABLE t (id INTEGER PRIMARY KEY)"))
        .await
        .unwrap();

    tx.begin_transaction(begin("db")).await.unwrap();
    queries
        .execute_query(query("db", "INSERT INTO t (id) VALUES (1)"))
        .await
        .unwrap();

    // A failing statement leaves the transaction open and its work intact
    let err = queries
        .execute_query(query("db", "INSERT INTO nonexistent VALUES (1)"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "statement_error");

    let result = queries
        .execute_query(query("db", "SELECT * FROM t"))
        .await
        .unwrap();
    assert_eq!(result.row_count, 1);

    // The caller decides; rolling back discards the earlier insert
    tx.rollback_transaction(rollback("db")).await.unwrap();
    let result = queries
        .execute_query(query("db", "SELECT * FROM t"))
        .await
        .unwrap();
    assert_eq!(result.row_count, 0);
}

#[tokio::test]
async fn test_remove_with_active_transaction_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let registry = sqlite_registry(&dir).await;
    let tx = TransactionToolHandler::new(registry.clone());
    let queries = QueryToolHandler::new(registry.clone());

    tx.begin_transaction(begin("db")).await.unwrap();

    let err = registry.remove("db").await.unwrap_err();
    assert_eq!(err.kind(), "transaction_in_progress");

    // State unchanged on failure: the connection and its transaction survive
    let profiles = registry.list().await;
    assert_eq!(profiles.len(), 1);
    assert!(profiles[0].transaction_active);
    queries
        .execute_query(query("db", "SELECT 1"))
        .await
        .unwrap();

    // After rollback the removal goes through
    tx.rollback_transaction(rollback("db")).await.unwrap();
    registry.remove("db").await.unwrap();
    assert_eq!(registry.count().await, 0);
}
