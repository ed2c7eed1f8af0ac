//! MCP tool implementations.
//!
//! - `query`: run one read-only statement (`execute-read-queries`)

pub mod query;

pub use query::{QueryInput, QueryToolHandler};
