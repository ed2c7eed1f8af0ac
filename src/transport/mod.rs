//! Transport layer for the MCP server.
//!
//! Sessions are bound to a single inbound HTTP request, so HTTP is the only
//! transport: every POST to the MCP endpoint gets its own protocol session.

pub mod http;

pub use http::HttpTransport;

use crate::error::DbResult;
use std::future::Future;

/// A listener that feeds inbound calls to protocol sessions.
pub trait Transport: Send + Sync {
    /// Serve until shutdown is requested; resolves once the pool is closed.
    fn run(&self) -> impl Future<Output = DbResult<()>> + Send;
}
