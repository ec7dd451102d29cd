//! Core command execution types and traits
//!
//! This module provides the building blocks shared by every driver: values,
//! rows, command descriptors, the driver contract, the execution engine,
//! transactions and result chaining.

pub mod chain;
pub mod command;
pub mod connection;
pub mod error;
mod execute;
mod execute_async;
pub mod row;
pub mod transaction;
pub mod value;

// Re-export commonly used types
pub use chain::{db_result, db_result_async, AsyncResultChain, ResultChain};
pub use command::{Command, CommandBuilder, CommandKind, Params};
pub use connection::{AsyncConnection, Binder, Connection, ConnectionState, NativeCommand, RowLimit};
pub use error::{ConversionError, DbError, DbResult, DriverError, ExecutionError, RowError};
pub use row::{ColumnIndex, Row};
pub use transaction::{
    AsyncTransaction, Transaction, TransactionFuture, TransactionId, TransactionState,
};
pub use value::{Decimal, FromSqlValue, SqlValue};
