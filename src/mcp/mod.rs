//! MCP protocol integration.
//!
//! Binds the tool handlers to the rmcp framework: the service here is the
//! dispatch table both transports serve.

pub mod service;

pub use service::DbService;
