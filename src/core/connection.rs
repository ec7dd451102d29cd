//! Driver boundary
//!
//! These traits are the contract this crate needs from a native database
//! driver. The execution engine turns a [`Command`](super::command::Command)
//! into a [`NativeCommand`] holding driver parameters produced by
//! [`Binder::bind`], then hands it to a [`Connection`] (blocking) or an
//! [`AsyncConnection`] (suspends while the driver works).

use super::command::CommandKind;
use super::error::DriverError;
use super::row::Row;
use super::transaction::TransactionId;
use super::value::SqlValue;
use async_trait::async_trait;
use std::time::Duration;

/// Availability of a connection for a new command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not open; the engine opens it before use
    Closed,
    /// Open and idle
    Open,
    /// Open but still serving another command
    Busy,
}

/// How many rows a query needs from the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RowLimit {
    /// The whole result set
    #[default]
    All,
    /// Only the first row; the driver may stop reading after it
    First,
}

/// A command materialized for one driver
#[derive(Debug, Clone, PartialEq)]
pub struct NativeCommand<P> {
    /// Statement text or procedure name
    pub text: String,
    /// How to interpret `text`
    pub kind: CommandKind,
    /// Timeout; `None` means the driver default
    pub timeout: Option<Duration>,
    /// Bound parameters in descriptor order
    pub params: Vec<P>,
    /// Transaction the command belongs to
    pub transaction: Option<TransactionId>,
}

/// Maps each [`SqlValue`] variant to the driver's native parameter
///
/// Binding must be pure and must not coerce between variants: each variant
/// has exactly one native representation.
pub trait Binder {
    /// Native parameter type
    type Param: Clone + Send + Sync + 'static;

    /// Bind `value` under `name`
    fn bind(name: &str, value: &SqlValue) -> Self::Param;
}

/// Blocking driver connection
pub trait Connection: Binder {
    /// Current availability
    fn state(&self) -> ConnectionState;

    /// Transaction currently open on this connection
    fn active_transaction(&self) -> Option<TransactionId>;

    /// Open the connection
    fn open(&mut self) -> Result<(), DriverError>;

    /// Close the connection
    fn close(&mut self) -> Result<(), DriverError>;

    /// Start a transaction identified by `id`
    fn begin_transaction(&mut self, id: TransactionId) -> Result<(), DriverError>;

    /// Commit the open transaction
    fn commit(&mut self) -> Result<(), DriverError>;

    /// Roll back the open transaction
    fn rollback(&mut self) -> Result<(), DriverError>;

    /// Run for effect, returning the number of affected rows
    fn execute(&mut self, command: &NativeCommand<Self::Param>) -> Result<u64, DriverError>;

    /// Run and return rows in result-set order
    fn query(
        &mut self,
        command: &NativeCommand<Self::Param>,
        limit: RowLimit,
    ) -> Result<Vec<Row>, DriverError>;

    /// Run and return the first column of the first row (`Null` if no rows)
    fn scalar(&mut self, command: &NativeCommand<Self::Param>) -> Result<SqlValue, DriverError>;
}

/// Suspension-capable driver connection
///
/// Same contract as [`Connection`]; every driver call yields to the runtime
/// until the driver completes.
#[async_trait]
pub trait AsyncConnection: Binder + Send {
    /// Current availability
    fn state(&self) -> ConnectionState;

    /// Transaction currently open on this connection
    fn active_transaction(&self) -> Option<TransactionId>;

    /// Open the connection
    async fn open(&mut self) -> Result<(), DriverError>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), DriverError>;

    /// Start a transaction identified by `id`
    async fn begin_transaction(&mut self, id: TransactionId) -> Result<(), DriverError>;

    /// Commit the open transaction
    async fn commit(&mut self) -> Result<(), DriverError>;

    /// Roll back the open transaction
    async fn rollback(&mut self) -> Result<(), DriverError>;

    /// Best-effort rollback that cannot wait for the driver
    ///
    /// Called when an async transaction guard is dropped while still open.
    fn rollback_detached(&mut self);

    /// Run for effect, returning the number of affected rows
    async fn execute(&mut self, command: &NativeCommand<Self::Param>) -> Result<u64, DriverError>;

    /// Run and return rows in result-set order
    async fn query(
        &mut self,
        command: &NativeCommand<Self::Param>,
        limit: RowLimit,
    ) -> Result<Vec<Row>, DriverError>;

    /// Run and return the first column of the first row (`Null` if no rows)
    async fn scalar(
        &mut self,
        command: &NativeCommand<Self::Param>,
    ) -> Result<SqlValue, DriverError>;
}
