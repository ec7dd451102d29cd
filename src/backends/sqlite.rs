//! SQLite driver
//!
//! [`SqliteConnection`] implements the blocking [`Connection`] contract on top
//! of `rusqlite`. Parameters are bound by name (`@name`, `:name` or `$name`
//! in the statement), command timeouts are enforced through SQLite's progress
//! handler, and every row is read into a [`Row`].

use crate::core::{
    command::CommandKind,
    connection::{Binder, Connection, ConnectionState, NativeCommand, RowLimit},
    error::DriverError,
    row::Row,
    transaction::TransactionId,
    value::{SqlValue, DATETIME_FORMAT, DATE_FORMAT, TIME_FORMAT},
};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{ErrorCode, OpenFlags, Statement};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default command timeout (30 seconds)
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time to wait on a locked database (5 seconds)
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Number of SQLite VM instructions between timeout checks
const PROGRESS_HANDLER_INTERVAL: i32 = 1_000;

/// Prefixes SQLite accepts for named parameters
const PARAMETER_PREFIXES: [char; 3] = ['@', ':', '$'];

/// SQLite connection configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database path, `:memory:` or a `file:` URI
    pub path: String,
    /// Open the database read-only
    pub read_only: bool,
    /// How long to wait on a locked database
    pub busy_timeout: Duration,
    /// Timeout for commands that do not set their own; zero disables it
    pub command_timeout: Duration,
    /// Enforce foreign key constraints
    pub foreign_keys: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            read_only: false,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            foreign_keys: true,
        }
    }
}

impl SqliteConfig {
    /// Create a configuration for the database at `path`
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Open read-only
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set the busy timeout
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Set the default command timeout
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Enable or disable foreign key enforcement
    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }
}

/// A bound SQLite parameter
#[derive(Debug, Clone, PartialEq)]
pub struct SqliteParam {
    /// Parameter name as given on the command
    pub name: String,
    /// Native value
    pub value: Value,
}

/// Map a parameter value to its SQLite storage class
///
/// Integers and booleans bind as INTEGER, floats as REAL, text-like values
/// (including decimals and dates) as TEXT, bytes and identifiers as BLOB.
pub fn to_sqlite_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(v) => Value::Integer(i64::from(*v)),
        SqlValue::TinyInt(v) => Value::Integer(i64::from(*v)),
        SqlValue::SmallInt(v) => Value::Integer(i64::from(*v)),
        SqlValue::Int(v) => Value::Integer(i64::from(*v)),
        SqlValue::BigInt(v) => Value::Integer(*v),
        SqlValue::Decimal(v) => Value::Text(v.to_string()),
        SqlValue::Float(v) => Value::Real(f64::from(*v)),
        SqlValue::Double(v) => Value::Real(*v),
        SqlValue::Char(v) => Value::Text(v.to_string()),
        SqlValue::String(v) => Value::Text(v.clone()),
        SqlValue::Bytes(v) => Value::Blob(v.clone()),
        SqlValue::Date(v) => Value::Text(v.format(DATE_FORMAT).to_string()),
        SqlValue::Time(v) => Value::Text(v.format(TIME_FORMAT).to_string()),
        SqlValue::DateTime(v) => Value::Text(v.format(DATETIME_FORMAT).to_string()),
        SqlValue::DateTimeOffset(v) => Value::Text(v.to_rfc3339()),
        SqlValue::Uuid(v) => Value::Blob(v.as_bytes().to_vec()),
    }
}

/// Convert a column value read from SQLite
fn from_sqlite_value(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::BigInt(v),
        ValueRef::Real(v) => SqlValue::Double(v),
        ValueRef::Text(v) => SqlValue::String(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => SqlValue::Bytes(v.to_vec()),
    }
}

/// Blocking SQLite connection
pub struct SqliteConnection {
    config: SqliteConfig,
    conn: Option<rusqlite::Connection>,
    transaction: Option<TransactionId>,
}

impl SqliteConnection {
    /// Create a closed connection; it opens on first use
    pub fn new(config: SqliteConfig) -> Self {
        Self {
            config,
            conn: None,
            transaction: None,
        }
    }

    /// Open a connection with the given configuration
    pub fn connect(config: SqliteConfig) -> Result<Self, DriverError> {
        let mut conn = Self::new(config);
        Connection::open(&mut conn)?;
        Ok(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, DriverError> {
        Self::connect(SqliteConfig::default())
    }

    /// Configuration in use
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    fn handle(&self) -> Result<&rusqlite::Connection, DriverError> {
        self.conn.as_ref().ok_or(DriverError::NotOpen)
    }

    /// Resolve `name` against the statement, trying the SQLite prefixes
    fn parameter_index(stmt: &Statement<'_>, name: &str) -> Result<usize, DriverError> {
        if let Some(index) = stmt.parameter_index(name)? {
            return Ok(index);
        }
        if !name.starts_with(PARAMETER_PREFIXES) {
            for prefix in PARAMETER_PREFIXES {
                if let Some(index) = stmt.parameter_index(&format!("{prefix}{name}"))? {
                    return Ok(index);
                }
            }
        }
        Err(DriverError::UnknownParameter(name.to_string()))
    }

    /// Prepare the statement and bind every parameter
    fn prepare<'c>(
        conn: &'c rusqlite::Connection,
        command: &NativeCommand<SqliteParam>,
    ) -> Result<Statement<'c>, DriverError> {
        if command.kind == CommandKind::StoredProcedure {
            return Err(DriverError::Unsupported(
                "SQLite does not support stored procedures".to_string(),
            ));
        }
        if command.text.trim().is_empty() {
            return Err(DriverError::other("statement text is empty"));
        }

        let mut stmt = conn.prepare(&command.text)?;
        let mut bound = vec![false; stmt.parameter_count()];
        for param in &command.params {
            let index = Self::parameter_index(&stmt, &param.name)?;
            stmt.raw_bind_parameter(index, &param.value)?;
            bound[index - 1] = true;
        }
        if let Some(missing) = bound.iter().position(|b| !b) {
            let index = missing + 1;
            let name = stmt
                .parameter_name(index)
                .map(str::to_string)
                .unwrap_or_else(|| format!("?{index}"));
            return Err(DriverError::MissingParameter(name));
        }
        Ok(stmt)
    }

    /// Run `f` with the command timeout armed on the progress handler
    fn with_timeout<T>(
        &self,
        timeout: Option<Duration>,
        f: impl FnOnce(&rusqlite::Connection) -> Result<T, DriverError>,
    ) -> Result<T, DriverError> {
        let conn = self.handle()?;
        let limit = timeout.unwrap_or(self.config.command_timeout);
        if limit.is_zero() {
            return f(conn);
        }

        let Some(deadline) = Instant::now().checked_add(limit) else {
            return f(conn);
        };
        conn.progress_handler(
            PROGRESS_HANDLER_INTERVAL,
            Some(move || Instant::now() >= deadline),
        );
        let result = f(conn);
        conn.progress_handler(0, None::<fn() -> bool>);

        match result {
            Err(DriverError::Sqlite(rusqlite::Error::SqliteFailure(e, _)))
                if e.code == ErrorCode::OperationInterrupted && Instant::now() >= deadline =>
            {
                Err(DriverError::timeout(limit))
            }
            other => other,
        }
    }

    fn run_transaction_statement(&mut self, sql: &str) -> Result<(), DriverError> {
        let result = self.handle()?.execute_batch(sql);
        if self.handle()?.is_autocommit() {
            self.transaction = None;
        }
        result.map_err(DriverError::from)
    }
}

impl Binder for SqliteConnection {
    type Param = SqliteParam;

    fn bind(name: &str, value: &SqlValue) -> Self::Param {
        SqliteParam {
            name: name.to_string(),
            value: to_sqlite_value(value),
        }
    }
}

impl Connection for SqliteConnection {
    fn state(&self) -> ConnectionState {
        match self.conn {
            Some(_) => ConnectionState::Open,
            None => ConnectionState::Closed,
        }
    }

    fn active_transaction(&self) -> Option<TransactionId> {
        self.transaction
    }

    fn open(&mut self) -> Result<(), DriverError> {
        if self.conn.is_some() {
            return Ok(());
        }

        debug!(path = %self.config.path, read_only = self.config.read_only, "opening SQLite connection");
        let conn = if self.config.read_only {
            rusqlite::Connection::open_with_flags(
                &self.config.path,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            rusqlite::Connection::open(&self.config.path)?
        };

        conn.busy_timeout(self.config.busy_timeout)?;
        if self.config.foreign_keys {
            conn.execute("PRAGMA foreign_keys = ON", [])?;
        }

        self.conn = Some(conn);
        self.transaction = None;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.transaction = None;
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| DriverError::from(e))?;
        }
        Ok(())
    }

    fn begin_transaction(&mut self, id: TransactionId) -> Result<(), DriverError> {
        if let Some(active) = self.transaction {
            return Err(DriverError::other(format!(
                "transaction {active} is already active"
            )));
        }
        self.handle()?.execute_batch("BEGIN TRANSACTION")?;
        self.transaction = Some(id);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.run_transaction_statement("COMMIT")
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.run_transaction_statement("ROLLBACK")
    }

    fn execute(&mut self, command: &NativeCommand<Self::Param>) -> Result<u64, DriverError> {
        self.with_timeout(command.timeout, |conn| {
            let mut stmt = Self::prepare(conn, command)?;
            if stmt.column_count() == 0 {
                let affected = stmt.raw_execute()?;
                return Ok(affected as u64);
            }

            // Row-returning statements run for effect; rows are discarded
            let mut rows = stmt.raw_query();
            while rows.next()?.is_some() {}
            Ok(conn.changes() as u64)
        })
    }

    fn query(
        &mut self,
        command: &NativeCommand<Self::Param>,
        limit: RowLimit,
    ) -> Result<Vec<Row>, DriverError> {
        self.with_timeout(command.timeout, |conn| {
            let mut stmt = Self::prepare(conn, command)?;
            let columns: Arc<[String]> = stmt
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>()
                .into();

            let mut results = Vec::new();
            let mut rows = stmt.raw_query();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(columns.len());
                for i in 0..columns.len() {
                    values.push(from_sqlite_value(row.get_ref(i)?));
                }
                results.push(Row::new(Arc::clone(&columns), values));
                if limit == RowLimit::First {
                    break;
                }
            }
            Ok(results)
        })
    }

    fn scalar(&mut self, command: &NativeCommand<Self::Param>) -> Result<SqlValue, DriverError> {
        let rows = self.query(command, RowLimit::First)?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_values().into_iter().next())
            .unwrap_or(SqlValue::Null))
    }
}
