//! Connection pool management.
//!
//! This module wraps a database-specific sqlx pool (MySqlPool, PgPool, SqlitePool)
//! and hands out [`PooledConnection`] leases. Every successful `acquire` is matched
//! by exactly one release, either explicit via [`ConnectionPool::release`] or when
//! the lease is dropped on an error or cancellation path.

use crate::config::DatabaseSettings;
use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use sqlx::pool::PoolConnection;
use sqlx::{
    MySql, MySqlPool, PgPool, Postgres, Sqlite, SqlitePool,
    mysql::{MySqlConnectOptions, MySqlPoolOptions},
    postgres::{PgConnectOptions, PgPoolOptions},
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
        }
    }

    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::MySql(_) => DatabaseType::MySQL,
            DbPool::Postgres(_) => DatabaseType::PostgreSQL,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }

    fn size(&self) -> u32 {
        match self {
            DbPool::MySql(pool) => pool.size(),
            DbPool::Postgres(pool) => pool.size(),
            DbPool::SQLite(pool) => pool.size(),
        }
    }

    fn num_idle(&self) -> usize {
        match self {
            DbPool::MySql(pool) => pool.num_idle(),
            DbPool::Postgres(pool) => pool.num_idle(),
            DbPool::SQLite(pool) => pool.num_idle(),
        }
    }
}

/// A live connection borrowed from the pool.
#[derive(Debug)]
pub enum Connection {
    MySql(PoolConnection<MySql>),
    Postgres(PoolConnection<Postgres>),
    SQLite(PoolConnection<Sqlite>),
}

impl Connection {
    pub fn db_type(&self) -> DatabaseType {
        match self {
            Connection::MySql(_) => DatabaseType::MySQL,
            Connection::Postgres(_) => DatabaseType::PostgreSQL,
            Connection::SQLite(_) => DatabaseType::SQLite,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    acquired: AtomicU64,
    released: AtomicU64,
}

/// Snapshot of pool accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Leases handed out since startup
    pub acquired: u64,
    /// Leases returned since startup
    pub released: u64,
    /// Connections currently open (idle or in use)
    pub size: u32,
    /// Connections currently idle
    pub idle: usize,
}

impl PoolStats {
    /// Leases currently held by callers.
    pub fn checked_out(&self) -> u64 {
        self.acquired - self.released
    }
}

/// Exclusive lease on one pooled connection.
///
/// Dropping the lease returns the connection to the pool and records the release.
#[derive(Debug)]
pub struct PooledConnection {
    conn: Connection,
    counters: Arc<Counters>,
}

impl PooledConnection {
    /// Mutable access to the underlying connection.
    pub fn connection(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn db_type(&self) -> DatabaseType {
        self.conn.db_type()
    }

    /// Close the connection instead of returning it to the pool.
    ///
    /// Used when its session state can no longer be trusted, e.g. after a failed rollback.
    pub fn discard(&mut self) {
        match &mut self.conn {
            Connection::MySql(c) => c.close_on_drop(),
            Connection::Postgres(c) => c.close_on_drop(),
            Connection::SQLite(c) => c.close_on_drop(),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Process-wide connection pool.
///
/// Built once at startup and shared as `Arc<ConnectionPool>`. When no usable
/// connection string is configured the pool is unconfigured and every acquire
/// fails with a connection error.
#[derive(Debug)]
pub struct ConnectionPool {
    pool: Option<DbPool>,
    /// Why the pool is unconfigured, when it is.
    unavailable: Option<String>,
    counters: Arc<Counters>,
}

impl ConnectionPool {
    /// Wrap an existing pool.
    pub fn from_pool(pool: DbPool) -> Self {
        Self {
            pool: Some(pool),
            unavailable: None,
            counters: Arc::new(Counters::default()),
        }
    }

    /// A pool with no database behind it.
    pub fn unconfigured(reason: impl Into<String>) -> Self {
        Self {
            pool: None,
            unavailable: Some(reason.into()),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Build the pool lazily from settings. No connection is opened here.
    pub fn from_settings(settings: &DatabaseSettings) -> Self {
        let Some(connection_string) = settings.connection_string.as_deref() else {
            warn!("DATABASE_URL is not set; database operations will fail until it is");
            return Self::unconfigured("No database connection string configured");
        };

        match create_lazy_pool(connection_string, settings) {
            Ok(pool) => {
                info!(
                    db_type = %pool.db_type(),
                    url = settings.masked_connection_string().as_deref().unwrap_or_default(),
                    "Database pool created"
                );
                Self::from_pool(pool)
            }
            Err(reason) => {
                warn!(error = %reason, "Database pool could not be created");
                Self::unconfigured(reason)
            }
        }
    }

    /// Database type of the configured pool.
    pub fn db_type(&self) -> Option<DatabaseType> {
        self.pool.as_ref().map(DbPool::db_type)
    }

    pub fn is_configured(&self) -> bool {
        self.pool.is_some()
    }

    /// Lease a connection, waiting up to the acquire timeout.
    pub async fn acquire(&self) -> DbResult<PooledConnection> {
        let Some(pool) = &self.pool else {
            return Err(DbError::connect_failed(
                self.unavailable
                    .clone()
                    .unwrap_or_else(|| "Database is not configured".to_string()),
                "Set DATABASE_URL to a postgres://, mysql:// or sqlite: connection string",
            ));
        };

        let conn = match pool {
            DbPool::MySql(p) => Connection::MySql(p.acquire().await.map_err(acquire_error)?),
            DbPool::Postgres(p) => {
                Connection::Postgres(p.acquire().await.map_err(acquire_error)?)
            }
            DbPool::SQLite(p) => Connection::SQLite(p.acquire().await.map_err(acquire_error)?),
        };

        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        debug!(checked_out = self.checked_out(), "Connection acquired");

        Ok(PooledConnection {
            conn,
            counters: Arc::clone(&self.counters),
        })
    }

    /// Return a leased connection to the pool.
    pub fn release(&self, conn: PooledConnection) {
        drop(conn);
        debug!(checked_out = self.checked_out(), "Connection released");
    }

    /// Leases currently outstanding.
    pub fn checked_out(&self) -> u64 {
        self.stats().checked_out()
    }

    pub fn stats(&self) -> PoolStats {
        // Read released first so a concurrent release never makes checked_out underflow.
        let released = self.counters.released.load(Ordering::SeqCst);
        let acquired = self.counters.acquired.load(Ordering::SeqCst);
        PoolStats {
            acquired,
            released,
            size: self.pool.as_ref().map(DbPool::size).unwrap_or(0),
            idle: self.pool.as_ref().map(DbPool::num_idle).unwrap_or(0),
        }
    }

    /// Close all connections.
    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
            info!("Database pool closed");
        }
    }
}

/// Classify a failed acquire. Anything but a timeout is a connectivity failure.
fn acquire_error(err: sqlx::Error) -> DbError {
    match err {
        sqlx::Error::PoolTimedOut => {
            DbError::pool_exhausted("Timed out waiting for a free connection")
        }
        sqlx::Error::PoolClosed => {
            DbError::connect_failed("Connection pool is closed", "Restart the server")
        }
        // Auth and network errors carry user names and hosts; keep them in the log
        other => {
            warn!(error = %other, "Failed to connect to the database");
            DbError::connect_failed(
                "Failed to connect to the database",
                "Check that the database server is running and DATABASE_URL is correct",
            )
        }
    }
}

fn invalid_url(engine: &str, err: sqlx::Error) -> String {
    warn!(error = %err, engine, "Invalid connection string");
    format!("Invalid {} connection string", engine)
}

fn create_lazy_pool(connection_string: &str, settings: &DatabaseSettings) -> Result<DbPool, String> {
    let db_type = DatabaseType::from_connection_string(connection_string)
        .ok_or_else(|| "Unsupported database scheme in DATABASE_URL".to_string())?;
    let opts = &settings.pool_options;
    let is_sqlite = db_type == DatabaseType::SQLite;
    let max_connections = opts.max_connections_or_default(is_sqlite);
    let min_connections = opts.min_connections_or_default().min(max_connections);
    let idle_timeout = Some(opts.idle_timeout_or_default());

    match db_type {
        DatabaseType::PostgreSQL => {
            let options = PgConnectOptions::from_str(connection_string)
                .map_err(|e| invalid_url("PostgreSQL", e))?;
            let pool = PgPoolOptions::new()
                .min_connections(min_connections)
                .max_connections(max_connections)
                .acquire_timeout(opts.acquire_timeout_or_default())
                .idle_timeout(idle_timeout)
                .test_before_acquire(opts.test_before_acquire_or_default())
                .connect_lazy_with(options);
            Ok(DbPool::Postgres(pool))
        }
        DatabaseType::MySQL => {
            let options = MySqlConnectOptions::from_str(connection_string)
                .map_err(|e| invalid_url("MySQL", e))?
                .charset("utf8mb4");
            let pool = MySqlPoolOptions::new()
                .min_connections(min_connections)
                .max_connections(max_connections)
                .acquire_timeout(opts.acquire_timeout_or_default())
                .idle_timeout(idle_timeout)
                .test_before_acquire(opts.test_before_acquire_or_default())
                .connect_lazy_with(options);
            Ok(DbPool::MySql(pool))
        }
        DatabaseType::SQLite => {
            // The server never writes, so the file is opened read-only at the engine level too.
            let options = SqliteConnectOptions::from_str(connection_string)
                .map_err(|e| invalid_url("SQLite", e))?
                .read_only(true);
            let pool = SqlitePoolOptions::new()
                .min_connections(min_connections)
                .max_connections(max_connections)
                .acquire_timeout(opts.acquire_timeout_or_default())
                .idle_timeout(idle_timeout)
                .test_before_acquire(opts.test_before_acquire_or_default())
                .connect_lazy_with(options);
            Ok(DbPool::SQLite(pool))
        }
    }
}
