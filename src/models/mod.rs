//! Data models for the SQL tool server.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{
    BackendKind, ConnectParams, ConnectionProfile, SECRET_MASK, validate_connection_id,
};
pub use query::{
    ColumnMetadata, DEFAULT_ROW_LIMIT, DEFAULT_STATEMENT_TIMEOUT_SECS, MAX_ROW_LIMIT,
    MAX_STATEMENT_TIMEOUT_SECS, QueryResult, SqlParam,
};
pub use schema::{
    AlterOp, ColumnDescription, ColumnSpec, FilterClause, FilterOp, ForeignKeyRef,
    IndexDescription, IndexSpec, LogicalType, TableSchema, parse_filter,
};
