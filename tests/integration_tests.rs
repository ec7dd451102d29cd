//! Integration tests for command execution
//!
//! These tests run commands end to end against SQLite:
//! - Every execution mode, blocking and async
//! - Failure reporting with the offending statement
//! - Transaction handling
//! - On-disk databases and timeouts

#[cfg(feature = "sqlite")]
mod sqlite_tests {
    use rust_db_command::core::error::{DbError, DriverError};
    use rust_db_command::prelude::*;
    use std::time::Duration;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    }

    fn memory() -> SqliteConnection {
        init_tracing();
        SqliteConnection::open_in_memory().expect("Failed to open database")
    }

    fn create_items(conn: &mut SqliteConnection) {
        Command::text("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL, qty INTEGER)")
            .build()
            .exec(conn)
            .expect("Failed to create table");
    }

    #[test]
    fn test_insert_into_missing_column_reports_statement() {
        let mut conn = memory();
        Command::text("CREATE TABLE t (u INTEGER)")
            .build()
            .exec(&mut conn)
            .expect("Failed to create table");

        let statement = "INSERT INTO t (v) VALUES (@v)";
        let err = Command::text(statement)
            .param("v", 1)
            .build()
            .exec(&mut conn)
            .unwrap_err();

        assert_eq!(err.statement(), Some(statement));
        assert!(!err.is_lifecycle());
        assert!(err.to_string().contains(statement));
        match err {
            DbError::Execution(e) => assert!(matches!(e.driver_error(), DriverError::Sqlite(_))),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_query_preserves_result_order() {
        let mut conn = memory();
        create_items(&mut conn);
        Command::text("INSERT INTO items (id, name) VALUES (@id, @name)")
            .build()
            .exec_many(
                &mut conn,
                vec![
                    Params::new().with("id", 1).with("name", "a"),
                    Params::new().with("id", 2).with("name", "b"),
                    Params::new().with("id", 3).with("name", "c"),
                ],
            )
            .expect("Failed to insert");

        let names: Vec<String> = Command::text("SELECT name FROM items ORDER BY id DESC")
            .build()
            .query(&mut conn, |row| row.get("name"))
            .expect("Query failed");
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_exec_affected_and_scalar() {
        let mut conn = memory();
        create_items(&mut conn);
        for (id, qty) in [(1, 5), (2, 0), (3, 7)] {
            Command::text("INSERT INTO items (id, name, qty) VALUES (@id, 'x', @qty)")
                .param("id", id)
                .param("qty", qty)
                .build()
                .exec(&mut conn)
                .expect("Failed to insert");
        }

        let affected = Command::text("UPDATE items SET qty = qty + 1 WHERE qty > @min")
            .param("min", 0)
            .build()
            .exec_affected(&mut conn)
            .expect("Update failed");
        assert_eq!(affected, 2);

        let total: i64 = Command::text("SELECT sum(qty) FROM items")
            .build()
            .scalar(&mut conn)
            .expect("Scalar failed");
        assert_eq!(total, 14);
    }

    #[test]
    fn test_query_single_empty_and_null_handling() {
        let mut conn = memory();
        create_items(&mut conn);

        let none = Command::text("SELECT name FROM items WHERE id = @id")
            .param("id", 99)
            .build()
            .query_single(&mut conn, |row| row.get::<String, _>(0usize))
            .expect("Query failed");
        assert_eq!(none, None);

        Command::text("INSERT INTO items (id, name, qty) VALUES (1, 'x', @qty)")
            .param("qty", Option::<i32>::None)
            .build()
            .exec(&mut conn)
            .expect("Failed to insert");

        let qty = Command::text("SELECT qty FROM items WHERE id = 1")
            .build()
            .query_single(&mut conn, |row| row.get_opt::<i64, _>("qty"))
            .expect("Query failed")
            .expect("Row missing")
            .expect("Column missing");
        assert_eq!(qty, None);

        let max: Option<i64> = Command::text("SELECT max(qty) FROM items")
            .build()
            .scalar(&mut conn)
            .expect("Scalar failed");
        assert_eq!(max, None);
    }

    #[test]
    fn test_scalar_type_mismatch_is_execution_error() {
        let mut conn = memory();
        let err = Command::text("SELECT 'not a number'")
            .build()
            .scalar::<_, i64>(&mut conn)
            .unwrap_err();
        assert_eq!(err.statement(), Some("SELECT 'not a number'"));
        assert!(matches!(
            err.as_execution().map(|e| e.driver_error()),
            Some(DriverError::Conversion(_))
        ));
    }

    #[test]
    fn test_string_parameter_stays_text() {
        let mut conn = memory();
        let type_name: String = Command::text("SELECT typeof(@v)")
            .param("v", "42")
            .build()
            .scalar(&mut conn)
            .expect("Scalar failed");
        assert_eq!(type_name, "text");

        let type_name: String = Command::text("SELECT typeof(@v)")
            .param("v", 42)
            .build()
            .scalar(&mut conn)
            .expect("Scalar failed");
        assert_eq!(type_name, "integer");
    }

    #[test]
    fn test_exec_many_stops_at_first_failure() {
        let mut conn = memory();
        create_items(&mut conn);
        let result = Command::text("INSERT INTO items (id, name) VALUES (@id, 'x')")
            .build()
            .exec_many(&mut conn, (1..=4).map(|id| Params::new().with("id", if id == 3 { 1 } else { id })));
        assert!(result.is_err());

        let count: i64 = Command::text("SELECT count(*) FROM items")
            .build()
            .scalar(&mut conn)
            .expect("Scalar failed");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_transaction_commit_and_rollback() {
        let mut conn = memory();
        create_items(&mut conn);

        let mut tx = Transaction::begin(&mut conn).expect("Failed to begin");
        Command::text("INSERT INTO items (id, name) VALUES (1, 'kept')")
            .transaction(&tx)
            .build()
            .exec(tx.connection())
            .expect("Insert failed");
        tx.commit().expect("Commit failed");
        assert_eq!(tx.state(), TransactionState::Committed);
        drop(tx);

        let mut tx = Transaction::begin(&mut conn).expect("Failed to begin");
        Command::text("INSERT INTO items (id, name) VALUES (2, 'discarded')")
            .transaction(&tx)
            .build()
            .exec(tx.connection())
            .expect("Insert failed");
        tx.rollback().expect("Rollback failed");
        drop(tx);

        let names: Vec<String> = Command::text("SELECT name FROM items")
            .build()
            .query(&mut conn, |row| row.get(0usize))
            .expect("Query failed");
        assert_eq!(names, vec!["kept"]);
    }

    #[test]
    fn test_transaction_rollback_on_error() {
        let mut conn = memory();
        create_items(&mut conn);

        let result = Transaction::run(&mut conn, |tx| {
            let id = tx.id();
            Command::text("INSERT INTO items (id, name) VALUES (1, 'a')")
                .transaction(id)
                .build()
                .exec(tx.connection())?;
            Command::text("INSERT INTO items (id, name) VALUES (1, 'duplicate')")
                .transaction(id)
                .build()
                .exec(tx.connection())
        });
        assert!(result.is_err());

        let count: i64 = Command::text("SELECT count(*) FROM items")
            .build()
            .scalar(&mut conn)
            .expect("Scalar failed");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let mut conn = memory();
        create_items(&mut conn);
        {
            let mut tx = Transaction::begin(&mut conn).expect("Failed to begin");
            Command::text("INSERT INTO items (id, name) VALUES (1, 'a')")
                .transaction(&tx)
                .build()
                .exec(tx.connection())
                .expect("Insert failed");
        }
        assert_eq!(Connection::active_transaction(&conn), None);

        let count: i64 = Command::text("SELECT count(*) FROM items")
            .build()
            .scalar(&mut conn)
            .expect("Scalar failed");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_command_for_other_transaction_is_rejected() {
        let mut conn = memory();
        create_items(&mut conn);
        let stale = TransactionId::next();

        let err = Command::text("INSERT INTO items (id, name) VALUES (1, 'a')")
            .transaction(stale)
            .build()
            .exec(&mut conn)
            .unwrap_err();
        assert!(matches!(err, DbError::TransactionNotOpen(id) if id == stale));
    }

    #[test]
    fn test_chained_commands_stop_at_first_failure() {
        let mut conn = memory();
        create_items(&mut conn);

        let result = db_result(|| {
            Command::text("INSERT INTO items (id, name) VALUES (1, 'a')")
                .build()
                .exec(&mut conn)?;
            Command::text("INSERT INTO missing (id) VALUES (1)")
                .build()
                .exec(&mut conn)?;
            Command::text("INSERT INTO items (id, name) VALUES (2, 'b')")
                .build()
                .exec(&mut conn)
        });
        assert_eq!(result.unwrap_err().statement(), Some("INSERT INTO missing (id) VALUES (1)"));

        let count: i64 = Command::text("SELECT count(*) FROM items")
            .build()
            .scalar(&mut conn)
            .expect("Scalar failed");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_on_disk_database_persists() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("items.db");
        let config = SqliteConfig::new(path.to_string_lossy());

        {
            let mut conn = SqliteConnection::connect(config.clone()).expect("Failed to open");
            create_items(&mut conn);
            Command::text("INSERT INTO items (id, name) VALUES (1, 'persisted')")
                .build()
                .exec(&mut conn)
                .expect("Insert failed");
        }

        let mut conn = SqliteConnection::connect(config.with_read_only(true)).expect("Failed to reopen");
        let name: String = Command::text("SELECT name FROM items WHERE id = 1")
            .build()
            .scalar(&mut conn)
            .expect("Scalar failed");
        assert_eq!(name, "persisted");

        let err = Command::text("DELETE FROM items")
            .build()
            .exec(&mut conn)
            .unwrap_err();
        assert_eq!(err.statement(), Some("DELETE FROM items"));
    }

    #[tokio::test]
    async fn test_async_modes() {
        let mut conn = AsyncSqliteConnection::connect(SqliteConfig::default())
            .await
            .expect("Failed to open");
        Command::text("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .build()
            .exec_async(&mut conn)
            .await
            .expect("Failed to create table");

        Command::text("INSERT INTO items (id, name) VALUES (@id, @name)")
            .build()
            .exec_many_async(
                &mut conn,
                vec![
                    Params::new().with("id", 1).with("name", "a"),
                    Params::new().with("id", 2).with("name", "b"),
                ],
            )
            .await
            .expect("Failed to insert");

        let names: Vec<String> = Command::text("SELECT name FROM items ORDER BY id")
            .build()
            .query_async(&mut conn, |row| row.get("name"))
            .await
            .expect("Query failed");
        assert_eq!(names, vec!["a", "b"]);

        let first = Command::text("SELECT id FROM items ORDER BY id")
            .build()
            .query_single_async(&mut conn, |row| row.get::<i64, _>("id"))
            .await
            .expect("Query failed");
        assert_eq!(first, Some(1));

        let affected = Command::text("DELETE FROM items WHERE id = @id")
            .param("id", 2)
            .build()
            .exec_affected_async(&mut conn)
            .await
            .expect("Delete failed");
        assert_eq!(affected, 1);
    }

    #[tokio::test]
    async fn test_async_chain_short_circuits() {
        let mut conn = AsyncSqliteConnection::connect(SqliteConfig::default())
            .await
            .expect("Failed to open");

        let conn = &mut conn;
        let result = db_result_async(move || async move {
            let one: i64 = Command::text("SELECT 1").build().scalar_async(&mut *conn).await?;
            let bad: i64 = Command::text("SELECT nope FROM nowhere")
                .build()
                .scalar_async(&mut *conn)
                .await?;
            Ok(one + bad)
        })
        .await;
        assert_eq!(result.unwrap_err().statement(), Some("SELECT nope FROM nowhere"));
    }

    #[tokio::test]
    async fn test_async_transaction_run() {
        let mut conn = AsyncSqliteConnection::connect(SqliteConfig::default())
            .await
            .expect("Failed to open");
        Command::text("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .build()
            .exec_async(&mut conn)
            .await
            .expect("Failed to create table");

        let id = AsyncTransaction::run(&mut conn, |tx| {
            Box::pin(async move {
                let id = tx.id();
                Command::text("INSERT INTO items (name) VALUES ('a')")
                    .transaction(id)
                    .build()
                    .exec_async(tx.connection())
                    .await?;
                Command::text("SELECT last_insert_rowid()")
                    .transaction(id)
                    .build()
                    .scalar_async::<_, i64>(tx.connection())
                    .await
            })
        })
        .await
        .expect("Transaction failed");
        assert_eq!(id, 1);
        assert_eq!(AsyncConnection::active_transaction(&conn), None);
    }

    #[tokio::test]
    async fn test_async_command_timeout() {
        let mut conn = AsyncSqliteConnection::connect(SqliteConfig::default())
            .await
            .expect("Failed to open");
        let err = Command::text(
            "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT count(*) FROM c",
        )
        .timeout(Duration::from_millis(50))
        .build()
        .scalar_async::<_, i64>(&mut conn)
        .await
        .unwrap_err();
        assert!(matches!(
            err.as_execution().map(|e| e.driver_error()),
            Some(DriverError::Timeout { .. })
        ));
    }
}
