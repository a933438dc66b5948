//! MCP service implementation using rmcp.
//!
//! This module defines the DbService struct exposing the tool surface via
//! the rmcp framework's macros. The service is the dispatch table: each tool
//! resolves to a handler call against the shared connection registry.

use crate::db::ConnectionRegistry;
use crate::error::DbError;
use crate::models::TableSchema;
use crate::tools::connection::{
    AddConnectionInput, AddConnectionOutput, ConnectionToolHandler, ListConnectionsOutput,
    RemoveConnectionInput, RemoveConnectionOutput, TestConnectionInput, TestConnectionOutput,
};
use crate::tools::query::{ExecuteQueryInput, ExecuteQueryOutput, QueryToolHandler};
use crate::tools::record::{
    DeleteRecordInput, GetRecordsInput, GetRecordsOutput, InsertRecordInput, MutationOutput,
    RecordToolHandler, UpdateRecordInput,
};
use crate::tools::schema::{
    AlterTableInput, CreateIndexInput, CreateTableInput, DdlOutput, DropIndexInput,
    DropTableInput, GetTableSchemaInput, ListTablesInput, ListTablesOutput, SchemaToolHandler,
};
use crate::tools::transaction::{
    BeginTransactionInput, CommitTransactionInput, RollbackTransactionInput, TransactionOutput,
    TransactionToolHandler,
};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct DbService {
    /// Shared connection registry for all database operations
    registry: Arc<ConnectionRegistry>,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl DbService {
    /// Create a new DbService backed by the given registry.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            tool_router: Self::tool_router(),
        }
    }

    /// Validate a connection ID argument - ensure it is provided and non-empty.
    fn validate_connection_id(&self, provided: &str) -> Result<String, McpError> {
        let trimmed = provided.trim();
        if trimmed.is_empty() {
            Err(McpError::invalid_params(
                "connection_id is required. Call list_connections first to get registered IDs.",
                None,
            ))
        } else {
            Ok(trimmed.to_string())
        }
    }

    fn connections(&self) -> ConnectionToolHandler {
        ConnectionToolHandler::new(self.registry.clone())
    }

    fn queries(&self) -> QueryToolHandler {
        QueryToolHandler::new(self.registry.clone())
    }

    fn records(&self) -> RecordToolHandler {
        RecordToolHandler::new(self.registry.clone())
    }

    fn schemas(&self) -> SchemaToolHandler {
        SchemaToolHandler::new(self.registry.clone())
    }

    fn transactions(&self) -> TransactionToolHandler {
        TransactionToolHandler::new(self.registry.clone())
    }
}

#[tool_router]
impl DbService {
    #[tool(
        description = "Register a new database connection under a caller-chosen ID.\nType: sqlite (path), postgres/mysql/mssql (host, port, database, user, password).\nThe backend is probed before the connection is stored."
    )]
    async fn add_connection(
        &self,
        Parameters(input): Parameters<AddConnectionInput>,
    ) -> Result<Json<AddConnectionOutput>, McpError> {
        let mut input = input;
        input.connection_id = self.validate_connection_id(&input.connection_id)?;
        self.connections()
            .add_connection(input)
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }

    #[tool(
        description = "Test a registered connection by round-tripping a no-op statement.\nDoes not affect transaction state."
    )]
    async fn test_connection(
        &self,
        Parameters(input): Parameters<TestConnectionInput>,
    ) -> Result<Json<TestConnectionOutput>, McpError> {
        let mut input = input;
        input.connection_id = self.validate_connection_id(&input.connection_id)?;
        self.connections()
            .test_connection(input)
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }

    #[tool(
        description = "List registered connections.\nReturns IDs, backend kinds, masked parameters (passwords redacted), and transaction state."
    )]
    async fn list_connections(&self) -> Json<ListConnectionsOutput> {
        Json(self.connections().list_connections().await)
    }

    #[tool(
        description = "Close and remove a registered connection.\nFails while a transaction is open on it; commit or rollback first."
    )]
    async fn remove_connection(
        &self,
        Parameters(input): Parameters<RemoveConnectionInput>,
    ) -> Result<Json<RemoveConnectionOutput>, McpError> {
        let mut input = input;
        input.connection_id = self.validate_connection_id(&input.connection_id)?;
        self.connections()
            .remove_connection(input)
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }

    #[tool(
        description = "Execute a raw SQL statement with bound parameters.\nPlaceholders: ? (sqlite/mysql), $1.. (postgres), @P1.. (mssql).\nRuns inside the connection's open transaction if one exists, else auto-commits."
    )]
    async fn execute_query(
        &self,
        Parameters(input): Parameters<ExecuteQueryInput>,
    ) -> Result<Json<ExecuteQueryOutput>, McpError> {
        let mut input = input;
        input.connection_id = self.validate_connection_id(&input.connection_id)?;
        self.queries()
            .execute_query(input)
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }

    #[tool(
        description = "Read rows from a table with optional column projection, filter, ordering, and pagination.\nFilter: {column: value} or {column: {\"op\": operand}} with eq/ne/gt/gte/lt/lte/like/not_like/in/not_in/between/is_null."
    )]
    async fn get_records(
        &self,
        Parameters(input): Parameters<GetRecordsInput>,
    ) -> Result<Json<GetRecordsOutput>, McpError> {
        let mut input = input;
        input.connection_id = self.validate_connection_id(&input.connection_id)?;
        self.records()
            .get_records(input)
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }

    #[tool(description = "Insert one record from column-value pairs.\nReturns the generated key where the backend reports one (sqlite/mysql).")]
    async fn insert_record(
        &self,
        Parameters(input): Parameters<InsertRecordInput>,
    ) -> Result<Json<MutationOutput>, McpError> {
        let mut input = input;
        input.connection_id = self.validate_connection_id(&input.connection_id)?;
        self.records()
            .insert_record(input)
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }

    #[tool(
        description = "Update records matching a filter with new column-value pairs.\nThe filter is required; use execute_query for full-table updates."
    )]
    async fn update_record(
        &self,
        Parameters(input): Parameters<UpdateRecordInput>,
    ) -> Result<Json<MutationOutput>, McpError> {
        let mut input = input;
        input.connection_id = self.validate_connection_id(&input.connection_id)?;
        self.records()
            .update_record(input)
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }

    #[tool(
        description = "Delete records matching a filter.\nThe filter is required; use execute_query for full-table deletes."
    )]
    async fn delete_record(
        &self,
        Parameters(input): Parameters<DeleteRecordInput>,
    ) -> Result<Json<MutationOutput>, McpError> {
        let mut input = input;
        input.connection_id = self.validate_connection_id(&input.connection_id)?;
        self.records()
            .delete_record(input)
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }

    #[tool(description = "List base tables on a connection.")]
    async fn list_tables(
        &self,
        Parameters(input): Parameters<ListTablesInput>,
    ) -> Result<Json<ListTablesOutput>, McpError> {
        let mut input = input;
        input.connection_id = self.validate_connection_id(&input.connection_id)?;
        self.schemas()
            .list_tables(input)
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }

    #[tool(
        description = "Describe a table: columns with logical types, nullability, primary keys, defaults, foreign keys, and indexes."
    )]
    async fn get_table_schema(
        &self,
        Parameters(input): Parameters<GetTableSchemaInput>,
    ) -> Result<Json<TableSchema>, McpError> {
        let mut input = input;
        input.connection_id = self.validate_connection_id(&input.connection_id)?;
        self.schemas()
            .get_table_schema(input)
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }

    #[tool(
        description = "Create a table from abstract column specs.\nLogical types (INTEGER, BIGINT, TEXT, REAL, DECIMAL, BLOB, BOOLEAN, DATE, DATETIME) are translated per backend."
    )]
    async fn create_table(
        &self,
        Parameters(input): Parameters<CreateTableInput>,
    ) -> Result<Json<DdlOutput>, McpError> {
        let mut input = input;
        input.connection_id = self.validate_connection_id(&input.connection_id)?;
        self.schemas()
            .create_table(input)
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }

    #[tool(description = "Drop a table.")]
    async fn drop_table(
        &self,
        Parameters(input): Parameters<DropTableInput>,
    ) -> Result<Json<DdlOutput>, McpError> {
        let mut input = input;
        input.connection_id = self.validate_connection_id(&input.connection_id)?;
        self.schemas()
            .drop_table(input)
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }

    #[tool(description = "Create an index on a table from an abstract descriptor (name, table, columns, unique).")]
    async fn create_index(
        &self,
        Parameters(input): Parameters<CreateIndexInput>,
    ) -> Result<Json<DdlOutput>, McpError> {
        let mut input = input;
        input.connection_id = self.validate_connection_id(&input.connection_id)?;
        self.schemas()
            .create_index(input)
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }

    #[tool(description = "Drop an index.\nmysql/mssql also require the owning table.")]
    async fn drop_index(
        &self,
        Parameters(input): Parameters<DropIndexInput>,
    ) -> Result<Json<DdlOutput>, McpError> {
        let mut input = input;
        input.connection_id = self.validate_connection_id(&input.connection_id)?;
        self.schemas()
            .drop_index(input)
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }

    #[tool(
        description = "Alter a table with add_column/drop_column/modify_column operations.\nOn SQLite this transparently uses the table-recreation strategy."
    )]
    async fn alter_table(
        &self,
        Parameters(input): Parameters<AlterTableInput>,
    ) -> Result<Json<DdlOutput>, McpError> {
        let mut input = input;
        input.connection_id = self.validate_connection_id(&input.connection_id)?;
        self.schemas()
            .alter_table(input)
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }

    #[tool(
        description = "Begin a transaction on a connection.\nFails if one is already active (no nesting). Subsequent statements on this connection run inside it."
    )]
    async fn begin_transaction(
        &self,
        Parameters(input): Parameters<BeginTransactionInput>,
    ) -> Result<Json<TransactionOutput>, McpError> {
        let mut input = input;
        input.connection_id = self.validate_connection_id(&input.connection_id)?;
        self.transactions()
            .begin_transaction(input)
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }

    #[tool(description = "Commit the connection's open transaction.\nFails when no transaction is active.")]
    async fn commit_transaction(
        &self,
        Parameters(input): Parameters<CommitTransactionInput>,
    ) -> Result<Json<TransactionOutput>, McpError> {
        let mut input = input;
        input.connection_id = self.validate_connection_id(&input.connection_id)?;
        self.transactions()
            .commit_transaction(input)
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }

    #[tool(description = "Roll back the connection's open transaction.\nFails when no transaction is active.")]
    async fn rollback_transaction(
        &self,
        Parameters(input): Parameters<RollbackTransactionInput>,
    ) -> Result<Json<TransactionOutput>, McpError> {
        let mut input = input;
        input.connection_id = self.validate_connection_id(&input.connection_id)?;
        self.transactions()
            .rollback_transaction(input)
            .await
            .map(Json)
            .map_err(|e: DbError| e.into())
    }
}

#[tool_handler]
impl ServerHandler for DbService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "dbhub-mcp-server".to_owned(),
                title: Some("DB Hub MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "SQL tools over named connections to SQLite, PostgreSQL, MySQL/MariaDB, \
                 and SQL Server.\n\
                 \n\
                 ## Workflow\n\
                 1. `add_connection` registers a backend under a connection_id \
                 (or use `list_connections` for preconfigured ones)\n\
                 2. Pass that connection_id to every other tool\n\
                 3. `remove_connection` closes it when done\n\
                 \n\
                 ## Transactions\n\
                 Each connection is either idle or holds one open transaction. \
                 `begin_transaction` starts one; every statement on that connection \
                 then joins it until `commit_transaction` or `rollback_transaction`. \
                 Idle connections auto-commit per statement. There is no nesting, \
                 and a failed statement does NOT auto-rollback - roll back explicitly.\n\
                 \n\
                 ## Structured vs raw\n\
                 `get_records`/`insert_record`/`update_record`/`delete_record` and the \
                 schema tools take abstract table/column descriptors and work identically \
                 on every backend. `execute_query` takes backend-native SQL with bound \
                 parameters (never concatenate values into the SQL text).\n\
                 \n\
                 ## Errors\n\
                 Errors carry a stable `kind` tag (not_found, duplicate_identifier, \
                 invalid_params, connection_failed, transaction_already_active, \
                 no_active_transaction, transaction_in_progress, statement_error, \
                 timeout, unsupported)."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_service() -> DbService {
        DbService::new(Arc::new(ConnectionRegistry::new()))
    }

    #[test]
    fn test_db_service_creation() {
        let _service = create_test_service();
    }

    #[test]
    fn test_validate_connection_id_with_valid() {
        let service = create_test_service();
        assert_eq!(service.validate_connection_id("mydb").unwrap(), "mydb");
    }

    #[test]
    fn test_validate_connection_id_trims_whitespace() {
        let service = create_test_service();
        assert_eq!(service.validate_connection_id("  mydb  ").unwrap(), "mydb");
    }

    #[test]
    fn test_validate_connection_id_rejects_empty() {
        let service = create_test_service();
        let err = service.validate_connection_id("").unwrap_err();
        assert!(err.to_string().contains("connection_id is required"));
    }

    #[test]
    fn test_server_info() {
        let service = create_test_service();
        let info = service.get_info();
        assert!(!info.server_info.name.is_empty());
        assert!(info.capabilities.tools.is_some());
    }
}
