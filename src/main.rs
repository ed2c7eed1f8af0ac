//! Database Schema MCP Server - Main entry point.
//!
//! Serves table schemas and a read-only query tool over MCP on HTTP, one JSON-RPC
//! message per POST.

use clap::Parser;
use pg_schema_mcp::config::Config;
use pg_schema_mcp::db::ConnectionPool;
use pg_schema_mcp::mcp::SessionFactory;
use pg_schema_mcp::transport::{HttpTransport, Transport};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    init_tracing(&config);

    info!("Starting pg-schema-mcp v{}", env!("CARGO_PKG_VERSION"));

    let settings = config.database_settings()?;

    // Lazy: no connection is opened until the first request needs one
    let pool = Arc::new(ConnectionPool::from_settings(&settings));
    let sessions = SessionFactory::new(pool, config.query_timeout_duration());

    info!(
        host = %config.http_host,
        port = config.http_port,
        endpoint = %config.mcp_endpoint,
        query_timeout_secs = config.query_timeout,
        "Using HTTP transport"
    );
    let transport = HttpTransport::new(
        sessions,
        &config.http_host,
        config.http_port,
        &config.mcp_endpoint,
    );

    if let Err(e) = transport.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
