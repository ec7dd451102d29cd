//! Transaction guards
//!
//! A guard wraps one native transaction and walks the state machine
//! `Unopened -> Open -> Committed | RolledBack`, moving to `Faulted` when the
//! driver fails a begin, commit or rollback. A guard dropped while `Open` is
//! rolled back, so the transaction is released on every exit path.
//!
//! When a commit fails the guard attempts exactly one rollback before
//! reporting. If that rollback fails as well, the rollback fault is the one
//! returned.
//!
//! ```ignore
//! let mut tx = Transaction::begin(&mut conn)?;
//! Command::text("UPDATE accounts SET balance = balance - 100 WHERE id = 1")
//!     .transaction(&tx)
//!     .build()
//!     .exec(tx.connection())?;
//! tx.commit()?;
//! ```

use super::connection::{AsyncConnection, Connection, ConnectionState};
use super::error::{DbError, DbResult, DriverError};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, warn};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a transaction guard
///
/// Commands carry this to name the transaction they must run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Allocate a fresh identifier
    pub fn next() -> Self {
        TransactionId(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

/// Lifecycle state of a transaction guard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Created, not yet begun
    Unopened,
    /// Begun and accepting commands
    Open,
    /// Committed
    Committed,
    /// Rolled back
    RolledBack,
    /// A begin, commit or rollback failed
    Faulted,
}

impl TransactionState {
    /// Convert state to string representation
    pub fn to_str(&self) -> &'static str {
        match self {
            TransactionState::Unopened => "unopened",
            TransactionState::Open => "open",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
            TransactionState::Faulted => "faulted",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

fn expect_state(
    id: TransactionId,
    actual: TransactionState,
    expected: TransactionState,
) -> DbResult<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(DbError::InvalidTransactionState {
            id,
            expected,
            actual,
        })
    }
}

/// Outcome of a failed commit after the cleanup rollback ran
fn commit_failure(id: TransactionId, commit: DriverError, rollback: Result<(), DriverError>) -> DbError {
    warn!(transaction = %id, error = %commit, "commit failed, rolled back");
    match rollback {
        Ok(()) => DbError::CouldNotCommitTransaction(commit),
        Err(rollback) => {
            error!(
                transaction = %id,
                commit_error = %commit,
                error = %rollback,
                "rollback after failed commit also failed"
            );
            DbError::CouldNotRollbackTransaction(rollback)
        }
    }
}

/// Transaction guard over a blocking [`Connection`]
///
/// Holds the connection exclusively while alive; run commands through
/// [`Transaction::connection`].
pub struct Transaction<'c, C: Connection> {
    conn: &'c mut C,
    id: TransactionId,
    state: TransactionState,
}

impl<'c, C: Connection> Transaction<'c, C> {
    /// Create an unopened guard
    pub fn new(conn: &'c mut C) -> Self {
        Self {
            conn,
            id: TransactionId::next(),
            state: TransactionState::Unopened,
        }
    }

    /// Create a guard and begin the transaction
    ///
    /// # Errors
    ///
    /// Returns a lifecycle error if the connection cannot be used or the
    /// driver refuses to begin.
    pub fn begin(conn: &'c mut C) -> DbResult<Self> {
        let mut tx = Self::new(conn);
        tx.open()?;
        Ok(tx)
    }

    /// Begin the transaction
    pub fn open(&mut self) -> DbResult<()> {
        expect_state(self.id, self.state, TransactionState::Unopened)?;
        match self.conn.state() {
            ConnectionState::Open => {}
            ConnectionState::Busy => return Err(DbError::ConnectionBusy),
            ConnectionState::Closed => self.conn.open().map_err(DbError::CouldNotOpenConnection)?,
        }

        match self.conn.begin_transaction(self.id) {
            Ok(()) => {
                debug!(transaction = %self.id, "transaction opened");
                self.state = TransactionState::Open;
                Ok(())
            }
            Err(e) => {
                warn!(transaction = %self.id, error = %e, "could not begin transaction");
                self.state = TransactionState::Faulted;
                Err(DbError::CouldNotBeginTransaction(e))
            }
        }
    }

    /// Identifier to pass to [`CommandBuilder::transaction`](super::command::CommandBuilder::transaction)
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Current state
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// The underlying connection, for executing commands in this transaction
    pub fn connection(&mut self) -> &mut C {
        self.conn
    }

    /// Commit the transaction
    ///
    /// # Errors
    ///
    /// On a commit fault the guard rolls back once and returns
    /// `CouldNotCommitTransaction`, or `CouldNotRollbackTransaction` if
    /// that rollback failed too. The guard ends `Faulted` either way.
    pub fn commit(&mut self) -> DbResult<()> {
        expect_state(self.id, self.state, TransactionState::Open)?;
        match self.conn.commit() {
            Ok(()) => {
                debug!(transaction = %self.id, "transaction committed");
                self.state = TransactionState::Committed;
                Ok(())
            }
            Err(commit) => {
                self.state = TransactionState::Faulted;
                let rollback = self.conn.rollback();
                Err(commit_failure(self.id, commit, rollback))
            }
        }
    }

    /// Roll the transaction back
    pub fn rollback(&mut self) -> DbResult<()> {
        expect_state(self.id, self.state, TransactionState::Open)?;
        match self.conn.rollback() {
            Ok(()) => {
                debug!(transaction = %self.id, "transaction rolled back");
                self.state = TransactionState::RolledBack;
                Ok(())
            }
            Err(e) => {
                warn!(transaction = %self.id, error = %e, "could not roll back transaction");
                self.state = TransactionState::Faulted;
                Err(DbError::CouldNotRollbackTransaction(e))
            }
        }
    }

    /// Run `f` in a new transaction
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`.
    /// The error from `f` is returned even if the rollback fails.
    pub fn run<T, F>(conn: &'c mut C, f: F) -> DbResult<T>
    where
        F: FnOnce(&mut Transaction<'c, C>) -> DbResult<T>,
    {
        let mut tx = Self::begin(conn)?;
        match f(&mut tx) {
            Ok(value) => {
                if tx.state == TransactionState::Open {
                    tx.commit()?;
                }
                Ok(value)
            }
            Err(e) => {
                if tx.state == TransactionState::Open {
                    if let Err(rollback) = tx.rollback() {
                        error!(transaction = %tx.id, error = %rollback, "rollback after failed workflow failed");
                    }
                }
                Err(e)
            }
        }
    }
}

impl<C: Connection> From<&Transaction<'_, C>> for TransactionId {
    fn from(tx: &Transaction<'_, C>) -> Self {
        tx.id
    }
}

impl<C: Connection> Drop for Transaction<'_, C> {
    fn drop(&mut self) {
        if self.state != TransactionState::Open {
            return;
        }
        match self.conn.rollback() {
            Ok(()) => {
                debug!(transaction = %self.id, "open transaction rolled back on drop");
                self.state = TransactionState::RolledBack;
            }
            Err(e) => {
                error!(transaction = %self.id, error = %e, "rollback on drop failed");
                self.state = TransactionState::Faulted;
            }
        }
    }
}

/// Boxed future returned by the closure given to [`AsyncTransaction::run`]
pub type TransactionFuture<'t, T> = Pin<Box<dyn Future<Output = DbResult<T>> + Send + 't>>;

/// Transaction guard over an [`AsyncConnection`]
///
/// Dropping an open guard cannot wait for the driver; it asks the connection
/// for a detached rollback instead. Prefer an explicit `commit` or
/// `rollback`.
pub struct AsyncTransaction<'c, C: AsyncConnection> {
    conn: &'c mut C,
    id: TransactionId,
    state: TransactionState,
}

impl<'c, C: AsyncConnection> AsyncTransaction<'c, C> {
    /// Create an unopened guard
    pub fn new(conn: &'c mut C) -> Self {
        Self {
            conn,
            id: TransactionId::next(),
            state: TransactionState::Unopened,
        }
    }

    /// Create a guard and begin the transaction
    pub async fn begin(conn: &'c mut C) -> DbResult<Self> {
        let mut tx = Self::new(conn);
        tx.open().await?;
        Ok(tx)
    }

    /// Begin the transaction
    pub async fn open(&mut self) -> DbResult<()> {
        expect_state(self.id, self.state, TransactionState::Unopened)?;
        match self.conn.state() {
            ConnectionState::Open => {}
            ConnectionState::Busy => return Err(DbError::ConnectionBusy),
            ConnectionState::Closed => self
                .conn
                .open()
                .await
                .map_err(DbError::CouldNotOpenConnection)?,
        }

        match self.conn.begin_transaction(self.id).await {
            Ok(()) => {
                debug!(transaction = %self.id, "transaction opened");
                self.state = TransactionState::Open;
                Ok(())
            }
            Err(e) => {
                warn!(transaction = %self.id, error = %e, "could not begin transaction");
                self.state = TransactionState::Faulted;
                Err(DbError::CouldNotBeginTransaction(e))
            }
        }
    }

    /// Identifier to pass to [`CommandBuilder::transaction`](super::command::CommandBuilder::transaction)
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Current state
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// The underlying connection, for executing commands in this transaction
    pub fn connection(&mut self) -> &mut C {
        self.conn
    }

    /// Commit the transaction; see [`Transaction::commit`]
    pub async fn commit(&mut self) -> DbResult<()> {
        expect_state(self.id, self.state, TransactionState::Open)?;
        match self.conn.commit().await {
            Ok(()) => {
                debug!(transaction = %self.id, "transaction committed");
                self.state = TransactionState::Committed;
                Ok(())
            }
            Err(commit) => {
                self.state = TransactionState::Faulted;
                let rollback = self.conn.rollback().await;
                Err(commit_failure(self.id, commit, rollback))
            }
        }
    }

    /// Roll the transaction back
    pub async fn rollback(&mut self) -> DbResult<()> {
        expect_state(self.id, self.state, TransactionState::Open)?;
        match self.conn.rollback().await {
            Ok(()) => {
                debug!(transaction = %self.id, "transaction rolled back");
                self.state = TransactionState::RolledBack;
                Ok(())
            }
            Err(e) => {
                warn!(transaction = %self.id, error = %e, "could not roll back transaction");
                self.state = TransactionState::Faulted;
                Err(DbError::CouldNotRollbackTransaction(e))
            }
        }
    }

    /// Run `f` in a new transaction; see [`Transaction::run`]
    ///
    /// ```ignore
    /// let id = AsyncTransaction::run(&mut conn, |tx| {
    ///     Box::pin(async move {
    ///         Command::text("INSERT INTO users (name) VALUES (@name)")
    ///             .param("name", "Bob")
    ///             .transaction(&*tx)
    ///             .build()
    ///             .exec_async(tx.connection())
    ///             .await?;
    ///         Command::text("SELECT last_insert_rowid()")
    ///             .build()
    ///             .scalar_async::<_, i64>(tx.connection())
    ///             .await
    ///     })
    /// })
    /// .await?;
    /// ```
    pub async fn run<T, F>(conn: &'c mut C, f: F) -> DbResult<T>
    where
        F: for<'t> FnOnce(&'t mut AsyncTransaction<'c, C>) -> TransactionFuture<'t, T>,
    {
        let mut tx = Self::begin(conn).await?;
        match f(&mut tx).await {
            Ok(value) => {
                if tx.state == TransactionState::Open {
                    tx.commit().await?;
                }
                Ok(value)
            }
            Err(e) => {
                if tx.state == TransactionState::Open {
                    if let Err(rollback) = tx.rollback().await {
                        error!(transaction = %tx.id, error = %rollback, "rollback after failed workflow failed");
                    }
                }
                Err(e)
            }
        }
    }
}

impl<C: AsyncConnection> From<&AsyncTransaction<'_, C>> for TransactionId {
    fn from(tx: &AsyncTransaction<'_, C>) -> Self {
        tx.id
    }
}

impl<C: AsyncConnection> Drop for AsyncTransaction<'_, C> {
    fn drop(&mut self) {
        if self.state != TransactionState::Open {
            return;
        }
        warn!(
            transaction = %self.id,
            "async transaction dropped while open, rolling back in the background"
        );
        self.conn.rollback_detached();
        self.state = TransactionState::RolledBack;
    }
}
