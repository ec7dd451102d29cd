//! Command descriptors
//!
//! A [`Command`] describes one statement: text, named parameters, kind,
//! optional transaction and optional timeout. It is built with
//! [`CommandBuilder`] and consumed by exactly one execution call.
//!
//! ```
//! use rust_db_command::core::command::{Command, Params};
//! use std::time::Duration;
//!
//! let cmd = Command::builder()
//!     .text("INSERT INTO users (name, age) VALUES (@name, @age)")
//!     .params(Params::new().with("name", "Alice").with("age", 30))
//!     .timeout(Duration::from_secs(5))
//!     .build();
//!
//! assert_eq!(cmd.params().len(), 2);
//! ```

use super::transaction::TransactionId;
use super::value::SqlValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the driver should interpret the statement text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CommandKind {
    /// Plain SQL text
    #[default]
    Text,
    /// Name of a stored procedure
    StoredProcedure,
}

impl CommandKind {
    /// Convert command kind to string representation
    pub fn to_str(&self) -> &'static str {
        match self {
            CommandKind::Text => "text",
            CommandKind::StoredProcedure => "stored_procedure",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

/// Named parameter values, kept in insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Params(IndexMap<String, SqlValue>);

impl Params {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, returning the updated set
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Add or replace a parameter
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Value bound to `name`
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.0.get(name)
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no parameters are set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parameters in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for Params {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<SqlValue>> From<Vec<(K, V)>> for Params {
    fn from(v: Vec<(K, V)>) -> Self {
        v.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<SqlValue>, const N: usize> From<[(K, V); N]> for Params {
    fn from(v: [(K, V); N]) -> Self {
        v.into_iter().collect()
    }
}

/// A statement ready for execution
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    text: String,
    params: Params,
    kind: CommandKind,
    transaction: Option<TransactionId>,
    timeout: Option<Duration>,
}

impl Command {
    /// Start building a command
    pub fn builder() -> CommandBuilder {
        CommandBuilder::default()
    }

    /// Start building a command with the given statement text
    pub fn text(text: impl Into<String>) -> CommandBuilder {
        CommandBuilder::default().text(text)
    }

    /// Statement text
    pub fn statement(&self) -> &str {
        &self.text
    }

    /// Bound parameters
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Command kind
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Transaction the command runs in, if any
    pub fn transaction(&self) -> Option<TransactionId> {
        self.transaction
    }

    /// Timeout; `None` leaves the driver default in place
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn take_params(&mut self) -> Params {
        std::mem::take(&mut self.params)
    }
}

/// Builder for [`Command`]
///
/// Every setting is optional and the last call of each setter wins.
/// No SQL validation happens here; an empty statement fails at execution.
#[derive(Debug, Clone, Default)]
pub struct CommandBuilder {
    text: String,
    params: Params,
    kind: CommandKind,
    transaction: Option<TransactionId>,
    timeout: Option<Duration>,
}

impl CommandBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the statement text
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Replace all parameters
    #[must_use]
    pub fn params(mut self, params: impl Into<Params>) -> Self {
        self.params = params.into();
        self
    }

    /// Add a single parameter
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.params.insert(name, value);
        self
    }

    /// Set the command kind
    #[must_use]
    pub fn kind(mut self, kind: CommandKind) -> Self {
        self.kind = kind;
        self
    }

    /// Interpret the text as a stored procedure name
    #[must_use]
    pub fn stored_procedure(self) -> Self {
        self.kind(CommandKind::StoredProcedure)
    }

    /// Run inside an open transaction
    ///
    /// Accepts a [`Transaction`](super::transaction::Transaction), an
    /// [`AsyncTransaction`](super::transaction::AsyncTransaction) or a bare
    /// [`TransactionId`].
    #[must_use]
    pub fn transaction(mut self, transaction: impl Into<TransactionId>) -> Self {
        self.transaction = Some(transaction.into());
        self
    }

    /// Set the command timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Finish the descriptor
    pub fn build(self) -> Command {
        Command {
            text: self.text,
            params: self.params,
            kind: self.kind,
            transaction: self.transaction,
            timeout: self.timeout,
        }
    }
}

impl From<CommandBuilder> for Command {
    fn from(builder: CommandBuilder) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let cmd = Command::builder().build();
        assert_eq!(cmd.statement(), "");
        assert!(cmd.params().is_empty());
        assert_eq!(cmd.kind(), CommandKind::Text);
        assert_eq!(cmd.transaction(), None);
        assert_eq!(cmd.timeout(), None);
    }

    #[test]
    fn test_params_last_call_wins() {
        let cmd = Command::text("SELECT @a, @b")
            .params([("a", 1)])
            .params([("b", 2)])
            .build();
        assert_eq!(cmd.params().len(), 1);
        assert_eq!(cmd.params().get("b"), Some(&SqlValue::Int(2)));
        assert_eq!(cmd.params().get("a"), None);
    }

    #[test]
    fn test_params_keep_insertion_order() {
        let params = Params::new().with("z", 1).with("a", "x").with("m", Option::<i32>::None);
        let names: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["z", "a", "m"]);
        assert_eq!(params.get("m"), Some(&SqlValue::Null));
    }

    #[test]
    fn test_builder_settings_in_any_order() {
        let a = Command::builder()
            .timeout(Duration::from_secs(3))
            .stored_procedure()
            .text("usp_cleanup")
            .build();
        let b = Command::text("usp_cleanup")
            .kind(CommandKind::StoredProcedure)
            .timeout(Duration::from_secs(3))
            .build();
        assert_eq!(a, b);
    }

    #[test]
    fn test_command_kind_display() {
        assert_eq!(CommandKind::Text.to_string(), "text");
        assert_eq!(CommandKind::StoredProcedure.to_string(), "stored_procedure");
    }
}
