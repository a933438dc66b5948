//! Transaction management tools.
//!
//! This module implements the tools for the per-connection transaction state
//! machine:
//! - `begin_transaction`: `Idle -> Active`
//! - `commit_transaction`: `Active -> Idle`, applying the work
//! - `rollback_transaction`: `Active -> Idle`, discarding the work
//!
//! Statements issued between begin and commit/rollback automatically run
//! inside the transaction; statements on an idle connection auto-commit.

use crate::db::ConnectionRegistry;
use crate::error::DbResult;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Input for the begin_transaction tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct BeginTransactionInput {
    /// Connection identifier from add_connection/list_connections
    pub connection_id: String,
}

/// Input for the commit_transaction tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CommitTransactionInput {
    /// Connection identifier from add_connection/list_connections
    pub connection_id: String,
}

/// Input for the rollback_transaction tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RollbackTransactionInput {
    /// Connection identifier from add_connection/list_connections
    pub connection_id: String,
}

/// Output from the transaction tools.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TransactionOutput {
    /// The connection whose transaction state changed
    pub connection_id: String,
    /// Transaction state after the operation: "active" or "idle"
    pub state: &'static str,
    /// Human-readable status message
    pub message: String,
}

/// Handler for transaction management tools.
pub struct TransactionToolHandler {
    registry: Arc<ConnectionRegistry>,
}

impl TransactionToolHandler {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub async fn begin_transaction(
        &self,
        input: BeginTransactionInput,
    ) -> DbResult<TransactionOutput> {
        let mut lease = self.registry.lease(&input.connection_id).await?;
        lease.session().begin().await?;

        Ok(TransactionOutput {
            state: "active",
            message: format!(
                "Transaction started on '{}'. Statements now run inside it until \
                 commit_transaction or rollback_transaction.",
                input.connection_id
            ),
            connection_id: input.connection_id,
        })
    }

    pub async fn commit_transaction(
        &self,
        input: CommitTransactionInput,
    ) -> DbResult<TransactionOutput> {
        let mut lease = self.registry.lease(&input.connection_id).await?;
        lease.session().commit().await?;

        Ok(TransactionOutput {
            state: "idle",
            message: "Transaction committed".to_string(),
            connection_id: input.connection_id,
        })
    }

    pub async fn rollback_transaction(
        &self,
        input: RollbackTransactionInput,
    ) -> DbResult<TransactionOutput> {
        let mut lease = self.registry.lease(&input.connection_id).await?;
        lease.session().rollback().await?;

        Ok(TransactionOutput {
            state: "idle",
            message: "Transaction rolled back".to_string(),
            connection_id: input.connection_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inputs_deserialize() {
        let input: BeginTransactionInput =
            serde_json::from_str(r#"{"connection_id": "conn1"}"#).unwrap();
        assert_eq!(input.connection_id, "conn1");

        let input: CommitTransactionInput =
            serde_json::from_str(r#"{"connection_id": "conn1"}"#).unwrap();
        assert_eq!(input.connection_id, "conn1");
    }

    #[tokio::test]
    async fn test_begin_on_unknown_connection_errors() {
        let handler = TransactionToolHandler::new(Arc::new(ConnectionRegistry::new()));
        let err = handler
            .begin_transaction(BeginTransactionInput {
                connection_id: "ghost".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_output_serialization() {
        let output = TransactionOutput {
            connection_id: "conn1".to_string(),
            state: "idle",
            message: "Transaction committed".to_string(),
        };
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"state\":\"idle\""));
    }
}
