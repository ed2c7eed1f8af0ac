//! Data models for the schema MCP server.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::DatabaseType;
pub use query::{QueryResult, Row};
pub use schema::{
    ColumnDescriptor, RESOURCE_MIME_TYPE, RESOURCE_SCHEME, ResourceAddress, SCHEMA_SEGMENT,
    TableResource,
};
