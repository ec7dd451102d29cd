//! Async SQLite driver
//!
//! [`AsyncSqliteConnection`] runs a [`SqliteConnection`] on Tokio's blocking
//! thread pool so callers can await commands without stalling the runtime.
//! While a command is in flight the connection reports
//! [`ConnectionState::Busy`].

use super::sqlite::{SqliteConfig, SqliteConnection, SqliteParam};
use crate::core::{
    connection::{AsyncConnection, Binder, Connection, ConnectionState, NativeCommand, RowLimit},
    error::DriverError,
    row::Row,
    transaction::TransactionId,
    value::SqlValue,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Extra time the watchdog allows beyond the command timeout
///
/// SQLite interrupts itself at the command timeout; the watchdog only fires
/// when the blocking task cannot get to the database at all.
const WATCHDOG_GRACE: Duration = Duration::from_secs(1);

/// Timeout applied to open, close and transaction control
const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);

/// SQLite connection usable from async code
pub struct AsyncSqliteConnection {
    inner: Arc<Mutex<SqliteConnection>>,
    transaction: Option<TransactionId>,
    /// Set while a dropped transaction waits for its rollback
    rollback_pending: Arc<AtomicBool>,
    command_timeout: Duration,
}

impl AsyncSqliteConnection {
    /// Create a closed connection; it opens on first use
    pub fn new(config: SqliteConfig) -> Self {
        let command_timeout = config.command_timeout;
        Self {
            inner: Arc::new(Mutex::new(SqliteConnection::new(config))),
            transaction: None,
            rollback_pending: Arc::new(AtomicBool::new(false)),
            command_timeout,
        }
    }

    /// Open a connection with the given configuration
    pub async fn connect(config: SqliteConfig) -> Result<Self, DriverError> {
        let mut conn = Self::new(config);
        AsyncConnection::open(&mut conn).await?;
        Ok(conn)
    }

    /// Run `f` against the blocking connection on the blocking pool
    async fn run<T, F>(&self, limit: Duration, f: F) -> Result<T, DriverError>
    where
        F: FnOnce(&mut SqliteConnection) -> T + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let mut task = tokio::task::spawn_blocking(move || {
            let mut conn = inner.lock();
            f(&mut conn)
        });

        let watchdog = limit.saturating_add(WATCHDOG_GRACE);
        if limit.is_zero() || tokio::time::Instant::now().checked_add(watchdog).is_none() {
            return task
                .await
                .map_err(|e| DriverError::Task(format!("Task join error: {e}")));
        }

        tokio::select! {
            result = &mut task => {
                result.map_err(|e| DriverError::Task(format!("Task join error: {e}")))
            }
            _ = tokio::time::sleep(watchdog) => {
                task.abort();
                warn!(timeout = ?limit, "SQLite task did not finish in time");
                Err(DriverError::timeout(limit))
            }
        }
    }

    fn command_limit(&self, command: &NativeCommand<SqliteParam>) -> Duration {
        command.timeout.unwrap_or(self.command_timeout)
    }

    /// Run a transaction control call and mirror the resulting transaction
    async fn control<F>(&mut self, f: F) -> Result<(), DriverError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<(), DriverError> + Send + 'static,
    {
        let (result, active) = self
            .run(CONTROL_TIMEOUT, move |conn| {
                let result = f(conn);
                (result, conn.active_transaction())
            })
            .await?;
        self.transaction = active;
        result
    }
}

impl Binder for AsyncSqliteConnection {
    type Param = SqliteParam;

    fn bind(name: &str, value: &SqlValue) -> Self::Param {
        <SqliteConnection as Binder>::bind(name, value)
    }
}

#[async_trait]
impl AsyncConnection for AsyncSqliteConnection {
    fn state(&self) -> ConnectionState {
        if self.rollback_pending.load(Ordering::Acquire) {
            return ConnectionState::Busy;
        }
        match self.inner.try_lock() {
            Some(conn) => conn.state(),
            None => ConnectionState::Busy,
        }
    }

    fn active_transaction(&self) -> Option<TransactionId> {
        self.transaction
    }

    async fn open(&mut self) -> Result<(), DriverError> {
        self.control(|conn| conn.open()).await
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.control(|conn| conn.close()).await
    }

    async fn begin_transaction(&mut self, id: TransactionId) -> Result<(), DriverError> {
        self.control(move |conn| conn.begin_transaction(id)).await
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        self.control(|conn| conn.commit()).await
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.control(|conn| conn.rollback()).await
    }

    fn rollback_detached(&mut self) {
        self.transaction = None;
        let rollback = |conn: &mut SqliteConnection| {
            if let Err(e) = conn.rollback() {
                error!(error = %e, "Failed to roll back dropped transaction");
            }
        };

        // Roll back inline when idle so the next command cannot run inside
        // the abandoned transaction.
        if let Some(mut conn) = self.inner.try_lock() {
            rollback(&mut conn);
            return;
        }

        // Report busy until the deferred rollback has run, so no command
        // slips into the abandoned transaction while it waits for the lock.
        self.rollback_pending.store(true, Ordering::Release);
        let inner = Arc::clone(&self.inner);
        let pending = Arc::clone(&self.rollback_pending);
        let deferred = move || {
            let mut conn = inner.lock();
            rollback(&mut conn);
            pending.store(false, Ordering::Release);
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(deferred);
            }
            Err(_) => deferred(),
        }
    }

    async fn execute(&mut self, command: &NativeCommand<Self::Param>) -> Result<u64, DriverError> {
        let limit = self.command_limit(command);
        let command = command.clone();
        self.run(limit, move |conn| conn.execute(&command)).await?
    }

    async fn query(
        &mut self,
        command: &NativeCommand<Self::Param>,
        limit: RowLimit,
    ) -> Result<Vec<Row>, DriverError> {
        let timeout = self.command_limit(command);
        let command = command.clone();
        self.run(timeout, move |conn| conn.query(&command, limit))
            .await?
    }

    async fn scalar(
        &mut self,
        command: &NativeCommand<Self::Param>,
    ) -> Result<SqlValue, DriverError> {
        let limit = self.command_limit(command);
        let command = command.clone();
        self.run(limit, move |conn| conn.scalar(&command)).await?
    }
}
