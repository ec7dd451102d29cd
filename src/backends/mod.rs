//! Driver implementations
//!
//! This module contains concrete implementations of the [`Connection`] and
//! [`AsyncConnection`] traits.
//!
//! [`Connection`]: crate::core::Connection
//! [`AsyncConnection`]: crate::core::AsyncConnection

pub mod scripted;

#[cfg(feature = "sqlite")]
pub mod async_sqlite;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use scripted::{Call, ScriptedConnection};

#[cfg(feature = "sqlite")]
pub use async_sqlite::AsyncSqliteConnection;
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConfig, SqliteConnection, SqliteParam, DEFAULT_COMMAND_TIMEOUT};
