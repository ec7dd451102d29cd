//! Scripted in-memory driver
//!
//! [`ScriptedConnection`] implements both [`Connection`] and
//! [`AsyncConnection`] without a database. Results are queued up front and
//! every driver call is recorded, which makes failure paths (commit faults,
//! busy connections, partial batches) reproducible in tests.
//!
//! # Example
//! ```
//! use rust_db_command::backends::scripted::ScriptedConnection;
//! use rust_db_command::core::command::Command;
//!
//! let mut conn = ScriptedConnection::new().fail_execute("no such table: t");
//! let result = Command::text("DELETE FROM t").build().exec(&mut conn);
//! assert_eq!(result.unwrap_err().statement(), Some("DELETE FROM t"));
//! ```

use crate::core::connection::{
    AsyncConnection, Binder, Connection, ConnectionState, NativeCommand, RowLimit,
};
use crate::core::error::DriverError;
use crate::core::row::Row;
use crate::core::transaction::TransactionId;
use crate::core::value::SqlValue;
use async_trait::async_trait;
use std::collections::VecDeque;

/// A driver call recorded by [`ScriptedConnection`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Open,
    Close,
    Begin(TransactionId),
    Commit,
    Rollback,
    Execute(String, Vec<(String, SqlValue)>),
    Query(String, RowLimit),
    Scalar(String),
}

/// Driver that replays scripted outcomes
#[derive(Debug)]
pub struct ScriptedConnection {
    state: ConnectionState,
    transaction: Option<TransactionId>,
    executes: VecDeque<Result<u64, String>>,
    queries: VecDeque<Result<Vec<Row>, String>>,
    scalars: VecDeque<Result<SqlValue, String>>,
    open_error: Option<String>,
    begin_error: Option<String>,
    commit_error: Option<String>,
    rollback_error: Option<String>,
    calls: Vec<Call>,
}

impl ScriptedConnection {
    /// Create an open connection where every call succeeds
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Open,
            transaction: None,
            executes: VecDeque::new(),
            queries: VecDeque::new(),
            scalars: VecDeque::new(),
            open_error: None,
            begin_error: None,
            commit_error: None,
            rollback_error: None,
            calls: Vec::new(),
        }
    }

    /// Start in the given state
    pub fn with_state(mut self, state: ConnectionState) -> Self {
        self.state = state;
        self
    }

    /// Queue a successful execute with `affected` rows
    pub fn succeed_execute(mut self, affected: u64) -> Self {
        self.executes.push_back(Ok(affected));
        self
    }

    /// Queue a failing execute
    pub fn fail_execute(mut self, message: impl Into<String>) -> Self {
        self.executes.push_back(Err(message.into()));
        self
    }

    /// Queue a query result
    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.queries.push_back(Ok(rows));
        self
    }

    /// Queue a failing query
    pub fn fail_query(mut self, message: impl Into<String>) -> Self {
        self.queries.push_back(Err(message.into()));
        self
    }

    /// Queue a scalar result
    pub fn with_scalar(mut self, value: SqlValue) -> Self {
        self.scalars.push_back(Ok(value));
        self
    }

    /// Make `open` fail
    pub fn fail_open(mut self, message: impl Into<String>) -> Self {
        self.open_error = Some(message.into());
        self
    }

    /// Make `begin_transaction` fail
    pub fn fail_begin(mut self, message: impl Into<String>) -> Self {
        self.begin_error = Some(message.into());
        self
    }

    /// Make `commit` fail
    pub fn fail_commit(mut self, message: impl Into<String>) -> Self {
        self.commit_error = Some(message.into());
        self
    }

    /// Make `rollback` fail
    pub fn fail_rollback(mut self, message: impl Into<String>) -> Self {
        self.rollback_error = Some(message.into());
        self
    }

    /// Change the reported state
    pub fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    /// Every driver call so far, in order
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// Number of execute calls
    pub fn execute_count(&self) -> usize {
        self.count(|c| matches!(c, Call::Execute(..)))
    }

    /// Number of rollback calls
    pub fn rollback_count(&self) -> usize {
        self.count(|c| matches!(c, Call::Rollback))
    }

    /// Transaction the connection considers open
    pub fn active_transaction_id(&self) -> Option<TransactionId> {
        self.transaction
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    fn scripted_error(message: &Option<String>) -> Result<(), DriverError> {
        match message {
            Some(m) => Err(DriverError::other(m.clone())),
            None => Ok(()),
        }
    }

    fn do_open(&mut self) -> Result<(), DriverError> {
        self.calls.push(Call::Open);
        Self::scripted_error(&self.open_error)?;
        self.state = ConnectionState::Open;
        Ok(())
    }

    fn do_close(&mut self) -> Result<(), DriverError> {
        self.calls.push(Call::Close);
        self.state = ConnectionState::Closed;
        self.transaction = None;
        Ok(())
    }

    fn do_begin(&mut self, id: TransactionId) -> Result<(), DriverError> {
        self.calls.push(Call::Begin(id));
        Self::scripted_error(&self.begin_error)?;
        if self.transaction.is_some() {
            return Err(DriverError::other("a transaction is already active"));
        }
        self.transaction = Some(id);
        Ok(())
    }

    fn do_commit(&mut self) -> Result<(), DriverError> {
        self.calls.push(Call::Commit);
        Self::scripted_error(&self.commit_error)?;
        self.transaction = None;
        Ok(())
    }

    fn do_rollback(&mut self) -> Result<(), DriverError> {
        self.calls.push(Call::Rollback);
        Self::scripted_error(&self.rollback_error)?;
        self.transaction = None;
        Ok(())
    }

    fn do_execute(&mut self, command: &NativeCommand<(String, SqlValue)>) -> Result<u64, DriverError> {
        self.calls
            .push(Call::Execute(command.text.clone(), command.params.clone()));
        match self.executes.pop_front() {
            Some(Ok(affected)) => Ok(affected),
            Some(Err(message)) => Err(DriverError::Other(message)),
            None => Ok(0),
        }
    }

    fn do_query(
        &mut self,
        command: &NativeCommand<(String, SqlValue)>,
        limit: RowLimit,
    ) -> Result<Vec<Row>, DriverError> {
        self.calls.push(Call::Query(command.text.clone(), limit));
        let mut rows = match self.queries.pop_front() {
            Some(Ok(rows)) => rows,
            Some(Err(message)) => return Err(DriverError::Other(message)),
            None => Vec::new(),
        };
        if limit == RowLimit::First {
            rows.truncate(1);
        }
        Ok(rows)
    }

    fn do_scalar(
        &mut self,
        command: &NativeCommand<(String, SqlValue)>,
    ) -> Result<SqlValue, DriverError> {
        self.calls.push(Call::Scalar(command.text.clone()));
        match self.scalars.pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(DriverError::Other(message)),
            None => Ok(SqlValue::Null),
        }
    }
}

impl Default for ScriptedConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl Binder for ScriptedConnection {
    type Param = (String, SqlValue);

    fn bind(name: &str, value: &SqlValue) -> Self::Param {
        (name.to_string(), value.clone())
    }
}

impl Connection for ScriptedConnection {
    fn state(&self) -> ConnectionState {
        self.state
    }

    fn active_transaction(&self) -> Option<TransactionId> {
        self.transaction
    }

    fn open(&mut self) -> Result<(), DriverError> {
        self.do_open()
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.do_close()
    }

    fn begin_transaction(&mut self, id: TransactionId) -> Result<(), DriverError> {
        self.do_begin(id)
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.do_commit()
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.do_rollback()
    }

    fn execute(&mut self, command: &NativeCommand<Self::Param>) -> Result<u64, DriverError> {
        self.do_execute(command)
    }

    fn query(
        &mut self,
        command: &NativeCommand<Self::Param>,
        limit: RowLimit,
    ) -> Result<Vec<Row>, DriverError> {
        self.do_query(command, limit)
    }

    fn scalar(&mut self, command: &NativeCommand<Self::Param>) -> Result<SqlValue, DriverError> {
        self.do_scalar(command)
    }
}

#[async_trait]
impl AsyncConnection for ScriptedConnection {
    fn state(&self) -> ConnectionState {
        self.state
    }

    fn active_transaction(&self) -> Option<TransactionId> {
        self.transaction
    }

    async fn open(&mut self) -> Result<(), DriverError> {
        self.do_open()
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.do_close()
    }

    async fn begin_transaction(&mut self, id: TransactionId) -> Result<(), DriverError> {
        self.do_begin(id)
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        self.do_commit()
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.do_rollback()
    }

    fn rollback_detached(&mut self) {
        let _ = self.do_rollback();
    }

    async fn execute(&mut self, command: &NativeCommand<Self::Param>) -> Result<u64, DriverError> {
        self.do_execute(command)
    }

    async fn query(
        &mut self,
        command: &NativeCommand<Self::Param>,
        limit: RowLimit,
    ) -> Result<Vec<Row>, DriverError> {
        self.do_query(command, limit)
    }

    async fn scalar(
        &mut self,
        command: &NativeCommand<Self::Param>,
    ) -> Result<SqlValue, DriverError> {
        self.do_scalar(command)
    }
}
