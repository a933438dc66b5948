//! DB Hub MCP Server Library
//!
//! Tool-dispatch server letting MCP clients run SQL operations - connect,
//! query, mutate, manage schema, manage transactions - against SQLite,
//! PostgreSQL, MySQL/MariaDB, and SQL Server through one uniform surface.

pub mod config;
pub mod db;
pub mod dialect;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::DbError;
pub use mcp::DbService;
