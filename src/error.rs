//! Error types for the SQL tool server.
//!
//! All fallible operations return [`DbError`], a `thiserror` enum covering the
//! common error taxonomy presented to callers. Backend-native failures are
//! classified into this taxonomy without discarding the original message,
//! which travels along as the diagnostic payload.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection '{connection_id}' not found")]
    NotFound { connection_id: String },

    #[error("Connection '{connection_id}' already exists")]
    DuplicateIdentifier { connection_id: String },

    #[error("Invalid parameters: {message}")]
    InvalidParams { message: String },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("A transaction is already active on connection '{connection_id}'")]
    TransactionAlreadyActive { connection_id: String },

    #[error("No active transaction on connection '{connection_id}'")]
    NoActiveTransaction { connection_id: String },

    #[error(
        "Connection '{connection_id}' has an open transaction; commit or rollback before removing it"
    )]
    TransactionInProgress { connection_id: String },

    #[error("Statement failed: {message}")]
    Statement {
        message: String,
        /// Backend error code when available, e.g. SQLSTATE "42P01"
        code: Option<String>,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Unsupported operation for this backend: {message}")]
    Unsupported { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    pub fn not_found(connection_id: impl Into<String>) -> Self {
        Self::NotFound {
            connection_id: connection_id.into(),
        }
    }

    pub fn duplicate_identifier(connection_id: impl Into<String>) -> Self {
        Self::DuplicateIdentifier {
            connection_id: connection_id.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    pub fn transaction_already_active(connection_id: impl Into<String>) -> Self {
        Self::TransactionAlreadyActive {
            connection_id: connection_id.into(),
        }
    }

    pub fn no_active_transaction(connection_id: impl Into<String>) -> Self {
        Self::NoActiveTransaction {
            connection_id: connection_id.into(),
        }
    }

    pub fn transaction_in_progress(connection_id: impl Into<String>) -> Self {
        Self::TransactionInProgress {
            connection_id: connection_id.into(),
        }
    }

    pub fn statement(message: impl Into<String>, code: Option<String>) -> Self {
        Self::Statement {
            message: message.into(),
            code,
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable machine-readable tag for this error, exposed to transports so
    /// they can map errors to protocol-specific failure representations.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::DuplicateIdentifier { .. } => "duplicate_identifier",
            Self::InvalidParams { .. } => "invalid_params",
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::TransactionAlreadyActive { .. } => "transaction_already_active",
            Self::NoActiveTransaction { .. } => "no_active_transaction",
            Self::TransactionInProgress { .. } => "transaction_in_progress",
            Self::Statement { .. } => "statement_error",
            Self::Timeout { .. } => "timeout",
            Self::Unsupported { .. } => "unsupported",
            Self::Internal { .. } => "internal",
        }
    }

    /// Whether a read-only operation may be retried once after this error.
    /// Mutating statements are never retried (a non-idempotent write could be
    /// applied twice).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection_failed(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::statement(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => DbError::statement("No rows returned", None),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection acquire", 30),
            sqlx::Error::PoolClosed => DbError::connection_failed("Connection handle is closed"),
            sqlx::Error::Io(io_err) => DbError::connection_failed(format!("I/O error: {}", io_err)),
            sqlx::Error::Tls(tls_err) => {
                DbError::connection_failed(format!("TLS error: {}", tls_err))
            }
            sqlx::Error::Protocol(msg) => {
                DbError::connection_failed(format!("Protocol error: {}", msg))
            }
            sqlx::Error::TypeNotFound { type_name } => {
                DbError::statement(format!("Type not found: {}", type_name), None)
            }
            sqlx::Error::ColumnNotFound(col) => {
                DbError::statement(format!("Column not found: {}", col), None)
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Convert tiberius errors to DbError.
impl From<tiberius::error::Error> for DbError {
    fn from(err: tiberius::error::Error) -> Self {
        match err {
            tiberius::error::Error::Server(token) => {
                DbError::statement(token.message().to_string(), Some(token.code().to_string()))
            }
            tiberius::error::Error::Io { message, .. } => {
                DbError::connection_failed(format!("I/O error: {}", message))
            }
            tiberius::error::Error::Tls(msg) => {
                DbError::connection_failed(format!("TLS error: {}", msg))
            }
            tiberius::error::Error::Routing { host, port } => {
                DbError::connection_failed(format!("Server redirected to {}:{}", host, port))
            }
            other => DbError::statement(other.to_string(), None),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Build the structured error payload attached to MCP error responses.
fn error_data(err: &DbError) -> Option<serde_json::Value> {
    Some(serde_json::json!({ "kind": err.kind() }))
}

/// Convert DbError to MCP ErrorData for semantic error categorization.
/// The stable `kind` tag rides in the `data` object.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        match &err {
            // Caller mistakes -> invalid_params
            DbError::InvalidParams { .. }
            | DbError::DuplicateIdentifier { .. }
            | DbError::TransactionAlreadyActive { .. }
            | DbError::NoActiveTransaction { .. }
            | DbError::TransactionInProgress { .. }
            | DbError::Statement { .. }
            | DbError::Unsupported { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), error_data(&err))
            }

            // Unknown connection id -> resource_not_found
            DbError::NotFound { .. } => {
                rmcp::ErrorData::resource_not_found(err.to_string(), error_data(&err))
            }

            // Environment failures -> internal_error
            DbError::ConnectionFailed { .. } | DbError::Timeout { .. } | DbError::Internal { .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), error_data(&err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::not_found("main");
        assert!(err.to_string().contains("'main' not found"));

        let err = DbError::statement("syntax error near SELECT", Some("42601".to_string()));
        assert!(err.to_string().contains("syntax error"));
    }

    #[test]
    fn test_error_kind_tags() {
        assert_eq!(DbError::not_found("a").kind(), "not_found");
        assert_eq!(
            DbError::duplicate_identifier("a").kind(),
            "duplicate_identifier"
        );
        assert_eq!(
            DbError::transaction_in_progress("a").kind(),
            "transaction_in_progress"
        );
        assert_eq!(DbError::statement("x", None).kind(), "statement_error");
        assert_eq!(DbError::timeout("query", 30).kind(), "timeout");
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::connection_failed("network down").is_retryable());
        assert!(!DbError::timeout("query", 30).is_retryable());
        assert!(!DbError::statement("constraint", None).is_retryable());
        assert!(!DbError::duplicate_identifier("a").is_retryable());
    }

    // Tests for From<DbError> for rmcp::ErrorData

    #[test]
    fn test_invalid_params_maps_to_invalid_params() {
        let err = DbError::invalid_params("bad input");
        let mcp_err: rmcp::ErrorData = err.into();
        // invalid_params uses -32602
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_statement_maps_to_invalid_params() {
        let err = DbError::statement("syntax error", Some("42601".to_string()));
        let mcp_err: rmcp::ErrorData = err.into();
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_not_found_maps_to_resource_not_found() {
        let err = DbError::not_found("conn1");
        let mcp_err: rmcp::ErrorData = err.into();
        // resource_not_found uses -32002 in rmcp
        assert_eq!(mcp_err.code.0, -32002);
    }

    #[test]
    fn test_connection_failed_maps_to_internal_error() {
        let err = DbError::connection_failed("refused");
        let mcp_err: rmcp::ErrorData = err.into();
        // internal_error uses -32603
        assert_eq!(mcp_err.code.0, -32603);
    }

    #[test]
    fn test_kind_rides_in_data() {
        let err = DbError::transaction_in_progress("conn1");
        let mcp_err: rmcp::ErrorData = err.into();
        let data = mcp_err.data.unwrap();
        assert_eq!(data["kind"], "transaction_in_progress");
    }

    #[test]
    fn test_sqlx_row_not_found_classifies_as_statement() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.kind(), "statement_error");
    }
}
