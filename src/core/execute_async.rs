//! Suspension-capable execution engine
//!
//! Async twins of the operations in [`execute`](super::execute). Control
//! flow and error mapping are identical; the only difference is that the
//! calling task yields while the driver works.

use super::command::{Command, Params};
use super::connection::{AsyncConnection, ConnectionState, RowLimit};
use super::error::{DbError, DbResult, DriverError};
use super::execute::{check_transaction, execution_failed, log_command, native_command};
use super::row::Row;
use super::transaction::TransactionId;
use super::value::FromSqlValue;
use tracing::debug;

impl Command {
    /// Async version of [`Command::exec`]
    pub async fn exec_async<C: AsyncConnection>(self, conn: &mut C) -> DbResult<()> {
        self.exec_affected_async(conn).await.map(|_| ())
    }

    /// Async version of [`Command::exec_affected`]
    pub async fn exec_affected_async<C: AsyncConnection>(self, conn: &mut C) -> DbResult<u64> {
        prepare_connection(conn, self.transaction()).await?;
        let native = native_command::<C>(&self, self.params());
        log_command(&native, "exec");
        conn.execute(&native)
            .await
            .map_err(|e| execution_failed(&native, e))
    }

    /// Async version of [`Command::exec_many`]
    ///
    /// Parameter sets run strictly one after another.
    pub async fn exec_many_async<C, I>(mut self, conn: &mut C, param_sets: I) -> DbResult<()>
    where
        C: AsyncConnection,
        I: IntoIterator,
        I::Item: Into<Params>,
    {
        self.take_params();
        for (i, params) in param_sets.into_iter().enumerate() {
            prepare_connection(conn, self.transaction()).await?;
            let native = native_command::<C>(&self, &params.into());
            debug!(statement = %native.text, index = i, "exec_many step");
            conn.execute(&native)
                .await
                .map_err(|e| execution_failed(&native, e))?;
        }
        Ok(())
    }

    /// Async version of [`Command::query`]
    pub async fn query_async<C, T, F>(self, conn: &mut C, mut map: F) -> DbResult<Vec<T>>
    where
        C: AsyncConnection,
        F: FnMut(&Row) -> T,
    {
        prepare_connection(conn, self.transaction()).await?;
        let native = native_command::<C>(&self, self.params());
        log_command(&native, "query");
        let rows = conn
            .query(&native, RowLimit::All)
            .await
            .map_err(|e| execution_failed(&native, e))?;
        Ok(rows.iter().map(&mut map).collect())
    }

    /// Async version of [`Command::query_single`]
    pub async fn query_single_async<C, T, F>(self, conn: &mut C, map: F) -> DbResult<Option<T>>
    where
        C: AsyncConnection,
        F: FnOnce(&Row) -> T,
    {
        prepare_connection(conn, self.transaction()).await?;
        let native = native_command::<C>(&self, self.params());
        log_command(&native, "query_single");
        let rows = conn
            .query(&native, RowLimit::First)
            .await
            .map_err(|e| execution_failed(&native, e))?;
        Ok(rows.first().map(map))
    }

    /// Async version of [`Command::scalar`]
    pub async fn scalar_async<C, T>(self, conn: &mut C) -> DbResult<T>
    where
        C: AsyncConnection,
        T: FromSqlValue,
    {
        prepare_connection(conn, self.transaction()).await?;
        let native = native_command::<C>(&self, self.params());
        log_command(&native, "scalar");
        conn.scalar(&native)
            .await
            .and_then(|value| T::from_sql_value(&value).map_err(DriverError::from))
            .map_err(|e| execution_failed(&native, e))
    }
}

async fn prepare_connection<C: AsyncConnection>(
    conn: &mut C,
    transaction: Option<TransactionId>,
) -> DbResult<()> {
    match conn.state() {
        ConnectionState::Open => {}
        ConnectionState::Busy => return Err(DbError::ConnectionBusy),
        ConnectionState::Closed => {
            debug!("opening closed connection");
            conn.open().await.map_err(DbError::CouldNotOpenConnection)?;
        }
    }
    check_transaction(transaction, conn.active_transaction())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::scripted::ScriptedConnection;
    use crate::core::value::SqlValue;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_exec_async_failure_keeps_statement() {
        let mut conn = ScriptedConnection::new().fail_execute("syntax error");
        let err = Command::text("DELETE FRM t")
            .build()
            .exec_async(&mut conn)
            .await
            .unwrap_err();
        assert_eq!(err.statement(), Some("DELETE FRM t"));
    }

    #[tokio::test]
    async fn test_query_async_keeps_driver_order() {
        let columns: Arc<[String]> = vec!["v".to_string()].into();
        let rows = [3i64, 1, 2]
            .iter()
            .map(|v| Row::new(Arc::clone(&columns), vec![SqlValue::BigInt(*v)]))
            .collect();
        let mut conn = ScriptedConnection::new().with_rows(rows);
        let out: Vec<i64> = Command::text("SELECT v FROM t")
            .build()
            .query_async(&mut conn, |r| r.get(0usize))
            .await
            .unwrap();
        assert_eq!(out, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_exec_many_async_stops_at_first_failure() {
        let mut conn = ScriptedConnection::new()
            .succeed_execute(1)
            .fail_execute("UNIQUE constraint failed");
        let sets = vec![
            Params::new().with("v", 1),
            Params::new().with("v", 1),
            Params::new().with("v", 2),
        ];
        let result = Command::text("INSERT INTO t(v) VALUES(@v)")
            .build()
            .exec_many_async(&mut conn, sets)
            .await;
        assert!(result.is_err());
        assert_eq!(conn.execute_count(), 2);
    }

    #[tokio::test]
    async fn test_scalar_async_empty_result_reads_null() {
        let mut conn = ScriptedConnection::new().with_scalar(SqlValue::Null);
        let value: Option<i64> = Command::text("SELECT max(v) FROM t")
            .build()
            .scalar_async(&mut conn)
            .await
            .unwrap();
        assert_eq!(value, None);
    }
}
