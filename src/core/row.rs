//! Result rows
//!
//! A [`Row`] is one record of a result set, produced by the driver and handed
//! to the caller's projection. Fields are read by position or by name.

use super::error::RowError;
use super::value::{FromSqlValue, SqlValue};
use std::sync::Arc;

/// One row of a result set
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Create a row; `columns` is shared by every row of a result set
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Column names in result-set order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no fields
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value of a field
    pub fn value<I: ColumnIndex>(&self, index: I) -> Option<&SqlValue> {
        index.position(self).map(|i| &self.values[i])
    }

    /// Whether a field holds the null marker
    pub fn is_null<I: ColumnIndex>(&self, index: I) -> Result<bool, RowError> {
        self.lookup(&index).map(SqlValue::is_null)
    }

    /// Read a field as `T`
    pub fn try_get<T: FromSqlValue, I: ColumnIndex>(&self, index: I) -> Result<T, RowError> {
        let value = self.lookup(&index)?;
        T::from_sql_value(value).map_err(|source| RowError::Conversion {
            column: index.describe(),
            source,
        })
    }

    /// Read a nullable field; the null marker becomes `None`
    pub fn get_opt<T: FromSqlValue, I: ColumnIndex>(&self, index: I) -> Result<Option<T>, RowError> {
        self.try_get::<Option<T>, I>(index)
    }

    /// Read a field as `T`
    ///
    /// # Panics
    ///
    /// Panics if the column does not exist or cannot be read as `T`.
    /// Use [`Row::try_get`] to handle that case.
    pub fn get<T: FromSqlValue, I: ColumnIndex>(&self, index: I) -> T {
        match self.try_get(index) {
            Ok(value) => value,
            Err(e) => panic!("{e}"),
        }
    }

    /// Consume the row, returning its values
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    fn lookup<I: ColumnIndex>(&self, index: &I) -> Result<&SqlValue, RowError> {
        index
            .position(self)
            .map(|i| &self.values[i])
            .ok_or_else(|| RowError::ColumnNotFound(index.describe()))
    }
}

/// Position or name of a column
pub trait ColumnIndex {
    /// Resolve to a position within `row`
    fn position(&self, row: &Row) -> Option<usize>;

    /// Human-readable form for error messages
    fn describe(&self) -> String;
}

impl ColumnIndex for usize {
    fn position(&self, row: &Row) -> Option<usize> {
        (*self < row.len()).then_some(*self)
    }

    fn describe(&self) -> String {
        format!("#{self}")
    }
}

impl ColumnIndex for &str {
    fn position(&self, row: &Row) -> Option<usize> {
        let columns = row.columns();
        columns
            .iter()
            .position(|c| c.as_str() == *self)
            .or_else(|| columns.iter().position(|c| c.eq_ignore_ascii_case(self)))
    }

    fn describe(&self) -> String {
        (*self).to_string()
    }
}

impl ColumnIndex for String {
    fn position(&self, row: &Row) -> Option<usize> {
        self.as_str().position(row)
    }

    fn describe(&self) -> String {
        self.clone()
    }
}
