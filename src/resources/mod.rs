//! MCP resource providers.
//!
//! - `table_schema`: per-table column schemas addressed as `table://<table>/schema`

pub mod table_schema;

pub use table_schema::TableSchemaResources;
