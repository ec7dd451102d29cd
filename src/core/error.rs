//! Error types for command execution
//!
//! Faults fall into two families:
//!
//! - **Data faults**: anything the driver reports while preparing, binding or
//!   running a statement. These always surface as [`DbError::Execution`] and
//!   carry the statement text that failed.
//! - **Lifecycle faults**: connection and transaction misuse (cannot open,
//!   connection busy, begin/commit/rollback failures). These are distinct
//!   variants so callers never confuse them with ordinary data errors.

use super::transaction::{TransactionId, TransactionState};

/// Result type alias for command execution and transaction operations
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Fault reported by the underlying database driver
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// SQLite error
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Command exceeded its timeout
    #[error("Command timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Parameter name does not appear in the statement
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// Statement parameter without a bound value
    #[error("Missing value for parameter: {0}")]
    MissingParameter(String),

    /// Value could not be converted to the requested type
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Operation the driver does not support
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Connection is not open
    #[error("Connection is not open")]
    NotOpen,

    /// Background task running a driver call failed
    #[error("Driver task failed: {0}")]
    Task(String),

    /// Any other driver fault
    #[error("{0}")]
    Other(String),
}

impl DriverError {
    /// Create a timeout error
    pub fn timeout(timeout: std::time::Duration) -> Self {
        DriverError::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Create a generic driver error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        DriverError::Other(msg.into())
    }
}

/// A statement failed to run
///
/// Carries the exact statement text given to the command and the driver fault.
#[derive(Debug, thiserror::Error)]
#[error("Failed to execute '{statement}': {source}")]
pub struct ExecutionError {
    statement: String,
    #[source]
    source: DriverError,
}

impl ExecutionError {
    /// Create a new execution error
    pub fn new(statement: impl Into<String>, source: DriverError) -> Self {
        Self {
            statement: statement.into(),
            source,
        }
    }

    /// The statement text that failed
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// The underlying driver fault
    pub fn driver_error(&self) -> &DriverError {
        &self.source
    }

    /// Consume the error, returning the driver fault
    pub fn into_driver_error(self) -> DriverError {
        self.source
    }
}

/// Error returned by execution and transaction operations
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Statement failed to run
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Connection was closed and could not be opened
    #[error("Could not open connection: {0}")]
    CouldNotOpenConnection(#[source] DriverError),

    /// Connection is already serving another command
    #[error("Connection is busy with another command")]
    ConnectionBusy,

    /// Command references a transaction that is not open on the connection
    #[error("Transaction {0} is not open on this connection")]
    TransactionNotOpen(TransactionId),

    /// Transaction guard is not in the state the operation requires
    #[error("Transaction {id} is {actual}, expected {expected}")]
    InvalidTransactionState {
        id: TransactionId,
        expected: TransactionState,
        actual: TransactionState,
    },

    /// Transaction could not be started
    #[error("Could not begin transaction: {0}")]
    CouldNotBeginTransaction(#[source] DriverError),

    /// Transaction could not be committed (it was rolled back)
    #[error("Could not commit transaction: {0}")]
    CouldNotCommitTransaction(#[source] DriverError),

    /// Transaction could not be rolled back
    #[error("Could not rollback transaction: {0}")]
    CouldNotRollbackTransaction(#[source] DriverError),
}

impl DbError {
    /// Wrap a driver fault raised while running `statement`
    pub fn execution(statement: impl Into<String>, source: DriverError) -> Self {
        DbError::Execution(ExecutionError::new(statement, source))
    }

    /// Whether this is a connection/transaction lifecycle fault
    pub fn is_lifecycle(&self) -> bool {
        !matches!(self, DbError::Execution(_))
    }

    /// Statement text of a data fault
    pub fn statement(&self) -> Option<&str> {
        self.as_execution().map(ExecutionError::statement)
    }

    /// The execution error, if this is a data fault
    pub fn as_execution(&self) -> Option<&ExecutionError> {
        match self {
            DbError::Execution(e) => Some(e),
            _ => None,
        }
    }
}

/// Value could not be read as the requested Rust type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Type mismatch: expected {expected}, got {actual}")]
pub struct ConversionError {
    pub expected: &'static str,
    pub actual: String,
}

impl ConversionError {
    /// Create a new conversion error
    pub fn new(expected: &'static str, actual: impl Into<String>) -> Self {
        Self {
            expected,
            actual: actual.into(),
        }
    }
}

/// Field access on a [`Row`](super::row::Row) failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    /// No column at that position or with that name
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Column exists but its value has another type
    #[error("Column {column}: {source}")]
    Conversion {
        column: String,
        #[source]
        source: ConversionError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_keeps_statement() {
        let err = DbError::execution("SELECT 1", DriverError::other("boom"));
        assert!(!err.is_lifecycle());
        assert_eq!(err.statement(), Some("SELECT 1"));
        assert_eq!(err.to_string(), "Failed to execute 'SELECT 1': boom");
    }

    #[test]
    fn test_lifecycle_errors() {
        let err = DbError::ConnectionBusy;
        assert!(err.is_lifecycle());
        assert_eq!(err.statement(), None);

        let err = DbError::CouldNotCommitTransaction(DriverError::other("disk full"));
        assert!(err.is_lifecycle());
        assert_eq!(err.to_string(), "Could not commit transaction: disk full");
    }

    #[test]
    fn test_error_display() {
        let err = DriverError::timeout(std::time::Duration::from_secs(2));
        assert_eq!(err.to_string(), "Command timed out after 2000ms");

        let err = DriverError::timeout(std::time::Duration::MAX);
        assert!(matches!(err, DriverError::Timeout { timeout_ms: u64::MAX }));

        let err = RowError::Conversion {
            column: "age".to_string(),
            source: ConversionError::new("i32", "string"),
        };
        assert_eq!(
            err.to_string(),
            "Column age: Type mismatch: expected i32, got string"
        );
    }
}
