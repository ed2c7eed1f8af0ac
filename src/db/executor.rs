//! Read-only query execution.
//!
//! Caller SQL runs inside a transaction the engine itself pins to read-only
//! mode, and that transaction is always rolled back:
//!
//! - PostgreSQL: `BEGIN TRANSACTION READ ONLY`
//! - MySQL: session and transaction both set `READ ONLY`, so a DDL implicit
//!   commit lands in another read-only transaction
//! - SQLite: `PRAGMA query_only = ON` on a connection opened read-only
//!
//! Exactly one statement is accepted. On PostgreSQL and MySQL the prepared
//! statement protocol enforces this, so `COMMIT; DELETE ...` cannot break out.
//! SQLite compiles a string statement by statement; the fetch there rejects
//! the call as soon as a second statement produces output, and `query_only`
//! keeps whatever it reached read-only.
//!
//! # Architecture
//!
//! Engine-specific begin/fetch/rollback live in the `mysql`, `postgres` and
//! `sqlite` submodules. The cycle around them is shared.

use crate::db::pool::{Connection, ConnectionPool, PooledConnection};
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult, Disposition, Operation};
use crate::models::{QueryResult, Row as JsonRow};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::debug;

/// Runs caller SQL against the shared pool with read-only isolation.
#[derive(Debug)]
pub struct ReadOnlyExecutor {
    pool: Arc<ConnectionPool>,
    query_timeout: Duration,
}

impl ReadOnlyExecutor {
    pub fn new(pool: Arc<ConnectionPool>, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Execute one statement and collect every row.
    ///
    /// The connection is released on every path. Rollback failures are logged
    /// and the connection is discarded; the query result still stands.
    pub async fn execute(&self, sql: &str) -> DbResult<QueryResult> {
        let start = Instant::now();
        debug!(sql = %sql, timeout_secs = self.query_timeout.as_secs(), "Executing read-only query");

        let mut lease = self.pool.acquire().await?;
        let outcome = run_cycle(&mut lease, sql, self.query_timeout).await;
        self.pool.release(lease);

        let rows = outcome?;
        debug!(
            rows = rows.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Read-only query finished"
        );
        Ok(QueryResult::new(rows))
    }
}

/// Discards the lease unless the begin/fetch/rollback cycle completed.
///
/// Covers timeouts, failed begins and futures dropped on cancellation, all of
/// which can leave the session inside a transaction.
struct CycleGuard<'a> {
    conn: &'a mut PooledConnection,
    clean: bool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if !self.clean {
            debug!("Discarding connection with unfinished read-only transaction");
            self.conn.discard();
        }
    }
}

async fn run_cycle(
    lease: &mut PooledConnection,
    sql: &str,
    query_timeout: Duration,
) -> DbResult<Vec<JsonRow>> {
    let mut guard = CycleGuard {
        conn: lease,
        clean: false,
    };

    begin_read_only(guard.conn).await?;

    let rows = match timeout(query_timeout, fetch_rows(guard.conn, sql)).await {
        Ok(rows) => rows,
        // Rolling back would wait for the running statement; closing the
        // connection aborts the transaction server-side instead.
        Err(_) => return Err(DbError::timeout("query execution", query_timeout.as_secs())),
    };

    match rollback(guard.conn).await {
        Ok(()) => guard.clean = true,
        Err(err) => Disposition::of(Operation::Rollback, &err).log(Operation::Rollback, &err),
    }

    rows
}

async fn begin_read_only(conn: &mut PooledConnection) -> DbResult<()> {
    let result = match conn.connection() {
        Connection::MySql(c) => mysql::begin(c).await,
        Connection::Postgres(c) => postgres::begin(c).await,
        Connection::SQLite(c) => sqlite::begin(c).await,
    };
    result.map_err(DbError::from)
}

async fn fetch_rows(conn: &mut PooledConnection, sql: &str) -> DbResult<Vec<JsonRow>> {
    match conn.connection() {
        Connection::MySql(c) => mysql::fetch_rows(c, sql).await.map_err(DbError::from),
        Connection::Postgres(c) => postgres::fetch_rows(c, sql).await.map_err(DbError::from),
        Connection::SQLite(c) => sqlite::fetch_rows(c, sql).await,
    }
}

async fn rollback(conn: &mut PooledConnection) -> DbResult<()> {
    let result = match conn.connection() {
        Connection::MySql(c) => mysql::rollback(c).await,
        Connection::Postgres(c) => postgres::rollback(c).await,
        Connection::SQLite(c) => sqlite::rollback(c).await,
    };
    result.map_err(DbError::from)
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Control statements go through the text protocol (`Executor::execute` on a
// plain `&str`); not every engine accepts them as prepared statements.

mod mysql {
    use super::*;
    use sqlx::{Executor, MySqlConnection};

    pub async fn begin(conn: &mut MySqlConnection) -> Result<(), sqlx::Error> {
        (&mut *conn).execute("SET SESSION TRANSACTION READ ONLY").await?;
        (&mut *conn).execute("START TRANSACTION READ ONLY").await?;
        Ok(())
    }

    pub async fn fetch_rows(
        conn: &mut MySqlConnection,
        sql: &str,
    ) -> Result<Vec<JsonRow>, sqlx::Error> {
        let rows = sqlx::query(sql)
            .persistent(false)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(RowToJson::to_json_row).collect())
    }

    pub async fn rollback(conn: &mut MySqlConnection) -> Result<(), sqlx::Error> {
        (&mut *conn).execute("ROLLBACK").await?;
        Ok(())
    }
}

mod postgres {
    use super::*;
    use sqlx::{Executor, PgConnection};

    pub async fn begin(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        (&mut *conn).execute("BEGIN TRANSACTION READ ONLY").await?;
        Ok(())
    }

    pub async fn fetch_rows(
        conn: &mut PgConnection,
        sql: &str,
    ) -> Result<Vec<JsonRow>, sqlx::Error> {
        let rows = sqlx::query(sql)
            .persistent(false)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.iter().map(RowToJson::to_json_row).collect())
    }

    pub async fn rollback(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        (&mut *conn).execute("ROLLBACK").await?;
        Ok(())
    }
}

mod sqlite {
    use super::*;
    use futures_util::TryStreamExt;
    use sqlx::{Either, Executor, SqliteConnection};

    pub async fn begin(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        (&mut *conn).execute("PRAGMA query_only = ON").await?;
        (&mut *conn).execute("BEGIN").await?;
        Ok(())
    }

    /// Each statement ends with a `Left` summary. Anything after the first
    /// one belongs to a second statement.
    pub async fn fetch_rows(conn: &mut SqliteConnection, sql: &str) -> DbResult<Vec<JsonRow>> {
        let mut stream = (&mut *conn).fetch_many(sqlx::query(sql).persistent(false));
        let mut rows = Vec::new();
        let mut statement_done = false;

        while let Some(item) = stream.try_next().await? {
            if statement_done {
                return Err(DbError::query("Only a single statement is accepted", None));
            }
            match item {
                Either::Left(_) => statement_done = true,
                Either::Right(row) => rows.push(row.to_json_row()),
            }
        }
        Ok(rows)
    }

    pub async fn rollback(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        (&mut *conn).execute("ROLLBACK").await?;
        (&mut *conn).execute("PRAGMA query_only = OFF").await?;
        Ok(())
    }
}
