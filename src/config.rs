//! Configuration handling for the schema MCP server.
//!
//! This module provides configuration management via CLI arguments and environment variables.
//! The database connection string is optional at startup: when it is missing the pool is
//! created unconfigured and the first database operation fails with a connection error.

use crate::models::DatabaseType;
use clap::Parser;
use std::time::Duration;
use url::Url;

pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MCP_ENDPOINT: &str = "/mcp";
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Connection pool configuration options.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 10, or 1 for SQLite)
    pub max_connections: Option<u32>,
    /// Minimum idle connections kept open (default: 0)
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds (default: 600)
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Whether to test connections before use (default: true)
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    /// Get max_connections with default value based on database type.
    pub fn max_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.max_connections.unwrap_or(if is_sqlite {
            DEFAULT_MAX_CONNECTIONS_SQLITE
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    pub fn idle_timeout_or_default(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS))
    }

    pub fn acquire_timeout_or_default(&self) -> Duration {
        Duration::from_secs(
            self.acquire_timeout_secs
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        )
    }

    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err("max_connections must be greater than 0".to_string());
            }
            if let Some(min) = self.min_connections {
                if min > max {
                    return Err(format!(
                        "min_connections ({}) cannot exceed max_connections ({})",
                        min, max
                    ));
                }
            }
        }
        if let Some(0) = self.acquire_timeout_secs {
            return Err("acquire_timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Database settings handed to the connection pool.
#[derive(Debug, Clone, Default)]
pub struct DatabaseSettings {
    /// Full connection URL (sensitive - not logged). None when not configured.
    pub connection_string: Option<String>,
    pub pool_options: PoolOptions,
}

impl DatabaseSettings {
    /// Settings for a connection string with default pool options.
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: Some(connection_string.into()),
            pool_options: PoolOptions::default(),
        }
    }

    /// Set the pool options.
    pub fn with_pool_options(mut self, pool_options: PoolOptions) -> Self {
        self.pool_options = pool_options;
        self
    }

    /// Database type detected from the connection string scheme.
    pub fn db_type(&self) -> Option<DatabaseType> {
        self.connection_string
            .as_deref()
            .and_then(DatabaseType::from_connection_string)
    }

    /// Display-safe version of the connection string (password masked).
    pub fn masked_connection_string(&self) -> Option<String> {
        let raw = self.connection_string.as_deref()?;
        match Url::parse(raw) {
            Ok(mut url) if url.password().is_some() => {
                let _ = url.set_password(Some("****"));
                Some(url.to_string())
            }
            Ok(url) => Some(url.to_string()),
            Err(_) => Some("<unparsable connection string>".to_string()),
        }
    }
}

/// Configuration for the schema MCP server.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pg-schema-mcp",
    about = "MCP server exposing table schemas as resources and a read-only SQL query tool",
    version,
    author
)]
pub struct Config {
    /// Database connection string (postgres://, mysql://, or sqlite:)
    #[arg(long, value_name = "URL", env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// HTTP host to bind to
    #[arg(long = "host", default_value = DEFAULT_HTTP_HOST, env = "MCP_HTTP_HOST")]
    pub http_host: String,

    /// HTTP port to bind to
    #[arg(long = "port", default_value_t = DEFAULT_HTTP_PORT, env = "PORT")]
    pub http_port: u16,

    /// MCP endpoint path
    #[arg(long = "endpoint", default_value = DEFAULT_MCP_ENDPOINT, env = "MCP_ENDPOINT")]
    pub mcp_endpoint: String,

    /// Query timeout in seconds, at least 1
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "MCP_QUERY_TIMEOUT",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub query_timeout: u64,

    /// Maximum connections in the pool (default: 10, or 1 for SQLite)
    #[arg(long, env = "MCP_MAX_CONNECTIONS")]
    pub max_connections: Option<u32>,

    /// Minimum idle connections kept open
    #[arg(long, env = "MCP_MIN_CONNECTIONS")]
    pub min_connections: Option<u32>,

    /// Seconds to wait for a free connection
    #[arg(long, env = "MCP_ACQUIRE_TIMEOUT")]
    pub acquire_timeout: Option<u64>,

    /// Seconds before an idle connection is closed
    #[arg(long, env = "MCP_IDLE_TIMEOUT")]
    pub idle_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            database_url: None,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            max_connections: None,
            min_connections: None,
            acquire_timeout: None,
            idle_timeout: None,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Collect pool options from the individual flags.
    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            idle_timeout_secs: self.idle_timeout,
            acquire_timeout_secs: self.acquire_timeout,
            test_before_acquire: None,
        }
    }

    /// Build and validate the database settings.
    ///
    /// An empty `DATABASE_URL` is treated as unset.
    pub fn database_settings(&self) -> Result<DatabaseSettings, String> {
        let pool_options = self.pool_options();
        pool_options.validate()?;
        Ok(DatabaseSettings {
            connection_string: self
                .database_url
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
            pool_options,
        })
    }

    /// Get the query timeout as a Duration.
    pub fn query_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
