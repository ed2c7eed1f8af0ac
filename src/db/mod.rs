//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection pool management with acquire/release accounting
//! - Read-only query execution
//! - Catalog introspection
//! - Type mappings

pub mod executor;
pub mod pool;
pub mod schema;
pub mod types;

pub use executor::ReadOnlyExecutor;
pub use pool::{ConnectionPool, DbPool, PoolStats, PooledConnection};
pub use schema::SchemaInspector;
