//! Database core.
//!
//! This module owns the connection and transaction machinery:
//! - Backend handles (one live handle per registered connection)
//! - The connection registry and its per-identifier locking
//! - The per-connection transaction state machine
//! - Statement execution with bound parameters and normalized results
//! - Schema introspection
//! - Row-to-JSON type normalization

pub mod executor;
pub mod handle;
pub mod inspector;
pub mod registry;
pub mod transaction;
pub mod types;

pub use executor::StatementExecutor;
pub use handle::BackendHandle;
pub use inspector::SchemaInspector;
pub use registry::{ConnectionLease, ConnectionRegistry};
pub use transaction::{ActiveTx, Session};
