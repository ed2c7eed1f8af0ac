//! Database Schema MCP Server Library
//!
//! Exposes a SQL database (PostgreSQL, MySQL, SQLite) over MCP: each table's
//! column schema is a `table://<table>/schema` resource, and one tool runs
//! caller SQL inside a read-only transaction that is always rolled back.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod resources;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::DbError;
pub use mcp::{SchemaService, SessionFactory};
