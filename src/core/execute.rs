//! Blocking execution engine
//!
//! Each operation consumes a [`Command`], checks the connection, binds the
//! parameters, runs the statement and maps the outcome to a [`DbResult`].
//! Driver faults become [`DbError::Execution`] carrying the statement text;
//! connection and transaction misuse is reported through the lifecycle
//! variants before anything is sent to the driver.

use super::command::{Command, Params};
use super::connection::{Binder, Connection, ConnectionState, NativeCommand, RowLimit};
use super::error::{DbError, DbResult, DriverError};
use super::row::Row;
use super::transaction::TransactionId;
use super::value::FromSqlValue;
use tracing::{debug, warn};

impl Command {
    /// Run the statement for its side effect
    pub fn exec<C: Connection>(self, conn: &mut C) -> DbResult<()> {
        self.exec_affected(conn).map(|_| ())
    }

    /// Run the statement for its side effect, returning the affected row count
    pub fn exec_affected<C: Connection>(self, conn: &mut C) -> DbResult<u64> {
        prepare_connection(conn, self.transaction())?;
        let native = native_command::<C>(&self, self.params());
        log_command(&native, "exec");
        conn.execute(&native).map_err(|e| execution_failed(&native, e))
    }

    /// Run the statement once per parameter set, in order
    ///
    /// The descriptor's own parameters are replaced by each set in turn.
    /// Stops at the first failure; earlier executions are not undone, so
    /// pass a transaction on the descriptor when the batch must be atomic.
    pub fn exec_many<C, I>(mut self, conn: &mut C, param_sets: I) -> DbResult<()>
    where
        C: Connection,
        I: IntoIterator,
        I::Item: Into<Params>,
    {
        self.take_params();
        for (i, params) in param_sets.into_iter().enumerate() {
            prepare_connection(conn, self.transaction())?;
            let native = native_command::<C>(&self, &params.into());
            debug!(statement = %native.text, index = i, "exec_many step");
            conn.execute(&native).map_err(|e| execution_failed(&native, e))?;
        }
        Ok(())
    }

    /// Run the statement and project every returned row
    ///
    /// An empty result set yields an empty vector. `map` is called once per
    /// row in result-set order; a panic inside it is not caught.
    pub fn query<C, T, F>(self, conn: &mut C, mut map: F) -> DbResult<Vec<T>>
    where
        C: Connection,
        F: FnMut(&Row) -> T,
    {
        prepare_connection(conn, self.transaction())?;
        let native = native_command::<C>(&self, self.params());
        log_command(&native, "query");
        let rows = conn
            .query(&native, RowLimit::All)
            .map_err(|e| execution_failed(&native, e))?;
        Ok(rows.iter().map(&mut map).collect())
    }

    /// Run the statement and project the first row, if any
    ///
    /// Extra rows are ignored; no rows yields `Ok(None)`.
    pub fn query_single<C, T, F>(self, conn: &mut C, map: F) -> DbResult<Option<T>>
    where
        C: Connection,
        F: FnOnce(&Row) -> T,
    {
        prepare_connection(conn, self.transaction())?;
        let native = native_command::<C>(&self, self.params());
        log_command(&native, "query_single");
        let rows = conn
            .query(&native, RowLimit::First)
            .map_err(|e| execution_failed(&native, e))?;
        Ok(rows.first().map(map))
    }

    /// Run the statement and read the first column of the first row as `T`
    ///
    /// An empty result reads as the null marker, so use `Option<T>` when the
    /// query may return nothing.
    pub fn scalar<C, T>(self, conn: &mut C) -> DbResult<T>
    where
        C: Connection,
        T: FromSqlValue,
    {
        prepare_connection(conn, self.transaction())?;
        let native = native_command::<C>(&self, self.params());
        log_command(&native, "scalar");
        conn.scalar(&native)
            .and_then(|value| T::from_sql_value(&value).map_err(DriverError::from))
            .map_err(|e| execution_failed(&native, e))
    }
}

/// Lifecycle checks before a command reaches a blocking driver
fn prepare_connection<C: Connection>(
    conn: &mut C,
    transaction: Option<TransactionId>,
) -> DbResult<()> {
    match conn.state() {
        ConnectionState::Open => {}
        ConnectionState::Busy => return Err(DbError::ConnectionBusy),
        ConnectionState::Closed => {
            debug!("opening closed connection");
            conn.open().map_err(DbError::CouldNotOpenConnection)?;
        }
    }
    check_transaction(transaction, conn.active_transaction())
}

/// A command bound to a transaction may only run while that transaction is open
pub(crate) fn check_transaction(
    required: Option<TransactionId>,
    active: Option<TransactionId>,
) -> DbResult<()> {
    match required {
        Some(id) if active != Some(id) => Err(DbError::TransactionNotOpen(id)),
        _ => Ok(()),
    }
}

pub(crate) fn native_command<B: Binder + ?Sized>(
    command: &Command,
    params: &Params,
) -> NativeCommand<B::Param> {
    NativeCommand {
        text: command.statement().to_string(),
        kind: command.kind(),
        timeout: command.timeout(),
        params: params
            .iter()
            .map(|(name, value)| B::bind(name, value))
            .collect(),
        transaction: command.transaction(),
    }
}

pub(crate) fn log_command<P>(native: &NativeCommand<P>, operation: &'static str) {
    debug!(
        statement = %native.text,
        kind = %native.kind,
        params = native.params.len(),
        transaction = ?native.transaction,
        operation,
        "executing command"
    );
}

pub(crate) fn execution_failed<P>(native: &NativeCommand<P>, source: DriverError) -> DbError {
    warn!(statement = %native.text, error = %source, "command failed");
    DbError::execution(native.text.clone(), source)
}
