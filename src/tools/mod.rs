//! Tool implementations.
//!
//! One handler per tool family, shared by every transport:
//! - `connection`: add/test/list/remove connections
//! - `query`: raw SQL with bound parameters
//! - `record`: structured get/insert/update/delete over descriptors
//! - `schema`: introspection and DDL
//! - `transaction`: begin/commit/rollback

pub mod connection;
pub mod query;
pub mod record;
pub mod schema;
pub mod transaction;

pub use connection::{
    AddConnectionInput, AddConnectionOutput, ConnectionToolHandler, ListConnectionsOutput,
    RemoveConnectionInput, RemoveConnectionOutput, TestConnectionInput, TestConnectionOutput,
};
pub use query::{ExecuteQueryInput, ExecuteQueryOutput, QueryToolHandler};
pub use record::{
    DeleteRecordInput, GetRecordsInput, GetRecordsOutput, InsertRecordInput, MutationOutput,
    RecordToolHandler, UpdateRecordInput,
};
pub use schema::{
    AlterTableInput, CreateIndexInput, CreateTableInput, DdlOutput, DropIndexInput,
    DropTableInput, GetTableSchemaInput, ListTablesInput, ListTablesOutput, SchemaToolHandler,
};
pub use transaction::{
    BeginTransactionInput, CommitTransactionInput, RollbackTransactionInput, TransactionOutput,
    TransactionToolHandler,
};
