//! # Rust DB Command
//!
//! A small, strongly-typed command layer over relational database drivers.
//! Describe a statement once as an immutable [`Command`], then execute it in
//! one of several modes (for effect, as a row query, as a single row or as a
//! scalar), from blocking or async code, optionally inside a transaction.
//!
//! ## Features
//!
//! - **Immutable Commands**: Builder-style descriptors with named, typed parameters
//! - **Uniform Failures**: Every data-level failure carries the offending statement text
//! - **Transactions**: Guards that commit or roll back on every exit path
//! - **Async Support**: Async/await twins of every operation on Tokio
//! - **Result Chaining**: Sequence dependent commands without nested error checks
//! - **Pluggable Drivers**: SQLite bundled, anything else through two traits
//!
//! ## Quick Start
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! rust_db_command = { version = "0.1", features = ["sqlite"] }
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! ### Basic Usage
//!
//! ```rust,no_run
//! use rust_db_command::prelude::*;
//!
//! fn main() -> DbResult<()> {
//!     let mut conn = SqliteConnection::new(SqliteConfig::default());
//!
//!     Command::text("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")
//!         .build()
//!         .exec(&mut conn)?;
//!
//!     Command::text("INSERT INTO users (name) VALUES (@name)")
//!         .param("name", "Alice")
//!         .build()
//!         .exec(&mut conn)?;
//!
//!     let names: Vec<String> = Command::text("SELECT name FROM users ORDER BY id")
//!         .build()
//!         .query(&mut conn, |row| row.get("name"))?;
//!     for name in names {
//!         println!("User: {}", name);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Working with Transactions
//!
//! ```rust,no_run
//! use rust_db_command::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> DbResult<()> {
//!     let mut conn = AsyncSqliteConnection::new(SqliteConfig::default());
//!
//!     Command::text("CREATE TABLE accounts (id INTEGER PRIMARY KEY, balance REAL)")
//!         .build()
//!         .exec_async(&mut conn)
//!         .await?;
//!
//!     let mut tx = AsyncTransaction::begin(&mut conn).await?;
//!     Command::text("INSERT INTO accounts (balance) VALUES (@balance)")
//!         .param("balance", 100.0)
//!         .transaction(&tx)
//!         .build()
//!         .exec_async(tx.connection())
//!         .await?;
//!     tx.commit().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Project Structure
//!
//! ```text
//! src/
//! ├── core/               # Driver-independent types and traits
//! │   ├── chain.rs        # Result chaining
//! │   ├── command.rs      # Command descriptor and builder
//! │   ├── connection.rs   # Driver contract
//! │   ├── error.rs        # Error types
//! │   ├── execute.rs      # Blocking execution engine
//! │   ├── execute_async.rs# Async execution engine
//! │   ├── row.rs          # Result rows
//! │   ├── transaction.rs  # Transaction guards
//! │   └── value.rs        # Parameter and column values
//! ├── backends/           # Driver implementations
//! │   ├── async_sqlite.rs # SQLite on the blocking pool
//! │   ├── scripted.rs     # Scripted in-memory driver
//! │   └── sqlite.rs       # SQLite via rusqlite
//! └── lib.rs
//! ```

/// Core command types and traits
pub mod core;

/// Driver implementations
pub mod backends;

/// Prelude for convenient imports
///
/// ```rust
/// use rust_db_command::prelude::*;
///
/// let command = Command::text("SELECT 1").build();
/// assert_eq!(command.kind(), CommandKind::Text);
/// ```
pub mod prelude {
    pub use crate::core::{
        db_result, db_result_async, AsyncConnection, AsyncResultChain, AsyncTransaction, Command,
        CommandBuilder, CommandKind, Connection, ConnectionState, DbError, DbResult, Decimal,
        DriverError, FromSqlValue, Params, ResultChain, Row, SqlValue, Transaction, TransactionId,
        TransactionState,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::backends::{AsyncSqliteConnection, SqliteConfig, SqliteConnection};
}

// Re-export at root level for convenience
pub use crate::core::{
    AsyncConnection, AsyncTransaction, Command, CommandBuilder, CommandKind, Connection, DbError,
    DbResult, Params, Row, SqlValue, Transaction, TransactionId,
};

#[cfg(feature = "sqlite")]
pub use crate::backends::{AsyncSqliteConnection, SqliteConfig, SqliteConnection};
