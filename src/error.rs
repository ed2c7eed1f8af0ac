//! Error types for the schema MCP server.
//!
//! All failures are expressed as [`DbError`]. Each operation decides how an
//! error is handled through its [`Disposition`]: some errors are reported to
//! the caller, others degrade to an empty result or are only logged.

use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection pool exhausted: {message}")]
    PoolExhausted { message: String },

    #[error("Connection failed: {message}")]
    ConnectFailed { message: String, suggestion: String },

    #[error("Query error: {message}")]
    Query {
        message: String,
        /// e.g., "25006" for a write inside a read-only transaction
        sql_state: Option<String>,
    },

    #[error("Invalid resource URI: {uri} ({reason})")]
    InvalidResourceUri { uri: String, reason: String },

    #[error("Transport closed before the response was written")]
    TransportClosed,

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a pool exhausted error.
    pub fn pool_exhausted(message: impl Into<String>) -> Self {
        Self::PoolExhausted {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connect_failed(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConnectFailed {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a query error with optional SQL state.
    pub fn query(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
        }
    }

    pub fn invalid_resource_uri(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResourceUri {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::ConnectFailed { suggestion, .. } => Some(suggestion),
            Self::PoolExhausted { .. } => {
                Some("Retry later or raise --max-connections / --acquire-timeout")
            }
            Self::Query { .. } => Some("Only read-only statements are accepted"),
            Self::InvalidResourceUri { .. } => Some("Use an address of the form table://<table>/schema"),
            Self::Timeout { .. } => Some("Simplify the query or raise --query-timeout"),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PoolExhausted { .. } | Self::ConnectFailed { .. } | Self::Timeout { .. }
        )
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            // Driver detail can name hosts, users or files; it goes to the log only
            sqlx::Error::Configuration(msg) => {
                warn!(error = %msg, "Database configuration error");
                DbError::connect_failed(
                    "Invalid database configuration",
                    "Check the DATABASE_URL format and credentials",
                )
            }
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::query(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => DbError::query("No rows returned", None),
            sqlx::Error::PoolTimedOut => {
                DbError::pool_exhausted("Timed out waiting for a free connection")
            }
            sqlx::Error::PoolClosed => {
                DbError::connect_failed("Connection pool is closed", "Restart the server")
            }
            sqlx::Error::Io(io_err) => {
                warn!(error = %io_err, "Database I/O error");
                DbError::connect_failed(
                    "I/O error talking to the database",
                    "Check network connectivity and database server status",
                )
            }
            sqlx::Error::Tls(tls_err) => {
                warn!(error = %tls_err, "Database TLS error");
                DbError::connect_failed(
                    "TLS error talking to the database",
                    "Verify TLS configuration and certificates",
                )
            }
            sqlx::Error::Protocol(msg) => {
                warn!(error = %msg, "Database protocol error");
                DbError::connect_failed(
                    "Database protocol error",
                    "Check database server compatibility",
                )
            }
            sqlx::Error::ColumnNotFound(col) => {
                DbError::query(format!("Column not found: {}", col), None)
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Operations at which errors are caught and classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListResources,
    ReadResource,
    ExecuteQuery,
    Rollback,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListResources => "list_resources",
            Self::ReadResource => "read_resource",
            Self::ExecuteQuery => "execute_query",
            Self::Rollback => "rollback",
        }
    }
}

/// How an error raised by an operation is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Returned to the caller as a protocol error.
    Propagate,
    /// Returned to the caller as an error tool result.
    ReportToCaller,
    /// Logged; the caller gets an empty result.
    Degrade,
    /// Logged as a warning; the operation's own result still stands.
    LogAndContinue,
    /// Nobody is left to report to.
    Silent,
}

impl Disposition {
    /// Decide the disposition of `err` raised by `op`.
    pub fn of(op: Operation, err: &DbError) -> Self {
        if matches!(err, DbError::TransportClosed) {
            return Self::Silent;
        }
        match op {
            Operation::ListResources => Self::Degrade,
            Operation::ReadResource => Self::Propagate,
            Operation::ExecuteQuery => Self::ReportToCaller,
            Operation::Rollback => Self::LogAndContinue,
        }
    }

    /// Emit the log line for this disposition.
    pub fn log(&self, op: Operation, err: &DbError) {
        match self {
            Self::Propagate | Self::ReportToCaller => {
                warn!(
                    operation = op.as_str(),
                    retryable = err.is_retryable(),
                    error = %err,
                    "Operation failed"
                )
            }
            Self::Degrade => {
                error!(operation = op.as_str(), error = %err, "Operation failed, returning empty result")
            }
            Self::LogAndContinue => {
                warn!(operation = op.as_str(), error = %err, "Non-fatal failure ignored")
            }
            Self::Silent => debug!(operation = op.as_str(), "Transport closed, abandoning work"),
        }
    }
}

/// Build suggestion data as JSON value.
fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert DbError to MCP ErrorData for semantic error categorization.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        let data = suggestion_data(err.suggestion());
        match &err {
            DbError::InvalidResourceUri { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), data)
            }
            DbError::Query { message, sql_state } => {
                let msg = match sql_state {
                    Some(code) => format!("{} (SQLSTATE: {})", message, code),
                    None => message.clone(),
                };
                rmcp::ErrorData::invalid_params(msg, data)
            }
            DbError::PoolExhausted { .. }
            | DbError::ConnectFailed { .. }
            | DbError::Timeout { .. }
            | DbError::TransportClosed
            | DbError::Internal { .. } => rmcp::ErrorData::internal_error(err.to_string(), data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connect_failed("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::timeout("query", 30).is_retryable());
        assert!(DbError::pool_exhausted("busy").is_retryable());
        assert!(DbError::connect_failed("err", "sugg").is_retryable());
        assert!(!DbError::query("read-only", None).is_retryable());
    }

    #[test]
    fn test_pool_timed_out_maps_to_pool_exhausted() {
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DbError::PoolExhausted { .. }));
    }

    #[test]
    fn test_io_error_message_omits_driver_detail() {
        let io = std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connect to db.internal.example:5432 refused",
        );
        let err: DbError = sqlx::Error::Io(io).into();
        assert!(matches!(err, DbError::ConnectFailed { .. }));
        assert!(!err.to_string().contains("db.internal.example"));
    }

    #[test]
    fn test_pool_closed_maps_to_connect_failed() {
        let err: DbError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, DbError::ConnectFailed { .. }));
    }

    #[test]
    fn test_invalid_uri_maps_to_invalid_params() {
        let err = DbError::invalid_resource_uri("table://users/columns", "bad segment");
        let mcp_err: rmcp::ErrorData = err.into();
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_connect_failed_maps_to_internal_error() {
        let err = DbError::connect_failed("failed", "try again");
        let mcp_err: rmcp::ErrorData = err.into();
        assert_eq!(mcp_err.code.0, -32603);
        assert_eq!(mcp_err.data.unwrap()["suggestion"], "try again");
    }

    #[test]
    fn test_query_error_includes_sql_state() {
        let err = DbError::query("cannot execute UPDATE", Some("25006".to_string()));
        let mcp_err: rmcp::ErrorData = err.into();
        assert_eq!(mcp_err.code.0, -32602);
        assert!(mcp_err.message.contains("25006"));
    }

    #[test]
    fn test_disposition_per_operation() {
        let err = DbError::query("boom", None);
        assert_eq!(
            Disposition::of(Operation::ListResources, &err),
            Disposition::Degrade
        );
        assert_eq!(
            Disposition::of(Operation::ReadResource, &err),
            Disposition::Propagate
        );
        assert_eq!(
            Disposition::of(Operation::ExecuteQuery, &err),
            Disposition::ReportToCaller
        );
        assert_eq!(
            Disposition::of(Operation::Rollback, &err),
            Disposition::LogAndContinue
        );
    }

    #[test]
    fn test_transport_closed_is_silent_everywhere() {
        for op in [
            Operation::ListResources,
            Operation::ReadResource,
            Operation::ExecuteQuery,
            Operation::Rollback,
        ] {
            let disposition = Disposition::of(op, &DbError::TransportClosed);
            assert_eq!(disposition, Disposition::Silent);
        }
    }
}
