//! Connection management tools.
//!
//! This module implements the tools for registry operations:
//! - `add_connection`: register and probe a new backend connection
//! - `test_connection`: round-trip a no-op statement
//! - `list_connections`: enumerate connections with masked parameters
//! - `remove_connection`: close and delete a connection

use crate::db::ConnectionRegistry;
use crate::error::DbResult;
use crate::models::{BackendKind, ConnectParams, ConnectionProfile};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Input for the add_connection tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AddConnectionInput {
    /// Caller-chosen unique identifier for this connection (letters, digits, '-', '_')
    pub connection_id: String,
    /// Backend kind: "sqlite", "postgres", "mysql", or "mssql"
    #[serde(rename = "type")]
    pub kind: BackendKind,
    /// Backend-specific parameters: path (sqlite) or host/port/database/user/password
    #[serde(flatten)]
    pub params: ConnectParams,
}

/// Output from the add_connection tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct AddConnectionOutput {
    /// The registered connection identifier
    pub connection_id: String,
    /// Backend kind of the new connection
    pub kind: BackendKind,
    /// Human-readable status message
    pub message: String,
}

/// Input for the test_connection tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TestConnectionInput {
    /// Connection identifier from add_connection/list_connections
    pub connection_id: String,
}

/// Output from the test_connection tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TestConnectionOutput {
    /// The tested connection identifier
    pub connection_id: String,
    /// True when the backend answered the probe statement
    pub ok: bool,
    /// Human-readable status message
    pub message: String,
}

/// Output for the list_connections tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListConnectionsOutput {
    /// Registered connections with masked parameters
    pub connections: Vec<ConnectionProfile>,
    /// Number of connections
    pub count: usize,
}

/// Input for the remove_connection tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RemoveConnectionInput {
    /// Connection identifier to remove
    pub connection_id: String,
}

/// Output from the remove_connection tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RemoveConnectionOutput {
    /// The removed connection identifier
    pub connection_id: String,
    /// Human-readable status message
    pub message: String,
}

/// Handler for connection management tools.
pub struct ConnectionToolHandler {
    registry: Arc<ConnectionRegistry>,
}

impl ConnectionToolHandler {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub async fn add_connection(&self, input: AddConnectionInput) -> DbResult<AddConnectionOutput> {
        self.registry
            .add(input.connection_id.clone(), input.kind, input.params)
            .await?;

        Ok(AddConnectionOutput {
            kind: input.kind,
            message: format!(
                "Connection '{}' registered and reachable",
                input.connection_id
            ),
            connection_id: input.connection_id,
        })
    }

    pub async fn test_connection(
        &self,
        input: TestConnectionInput,
    ) -> DbResult<TestConnectionOutput> {
        let ok = self.registry.test(&input.connection_id).await?;

        info!(connection_id = %input.connection_id, ok, "Connection tested");

        Ok(TestConnectionOutput {
            ok,
            message: format!("Connection '{}' is working", input.connection_id),
            connection_id: input.connection_id,
        })
    }

    pub async fn list_connections(&self) -> ListConnectionsOutput {
        let connections = self.registry.list().await;
        let count = connections.len();
        ListConnectionsOutput { connections, count }
    }

    pub async fn remove_connection(
        &self,
        input: RemoveConnectionInput,
    ) -> DbResult<RemoveConnectionOutput> {
        self.registry.remove(&input.connection_id).await?;

        Ok(RemoveConnectionOutput {
            message: format!("Connection '{}' closed and removed", input.connection_id),
            connection_id: input.connection_id,
        })
    }
}
