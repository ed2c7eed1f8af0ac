//! MCP server integration module.
//!
//! This module provides the integration between the MCP protocol and the
//! catalog resources and query tool, using the rmcp framework.

pub mod service;
pub mod session;

pub use service::SchemaService;
pub use session::{SessionFactory, SessionLifecycle, SessionScope, SessionState};
