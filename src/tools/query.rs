//! Read-only query tool.
//!
//! Implements `execute-read-queries`. The SQL runs verbatim inside a read-only
//! transaction; writes are rejected by the database engine, not by parsing.

use crate::db::ReadOnlyExecutor;
use crate::error::{DbError, DbResult, Disposition, Operation};
use crate::models::QueryResult;
use rmcp::model::{CallToolResult, Content};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub const TOOL_NAME: &str = "execute-read-queries";

/// Input for the query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryInput {
    /// Read-only query
    pub sql: String,
}

/// Handler for the query tool.
#[derive(Debug, Clone)]
pub struct QueryToolHandler {
    executor: Arc<ReadOnlyExecutor>,
}

impl QueryToolHandler {
    pub fn new(executor: Arc<ReadOnlyExecutor>) -> Self {
        Self { executor }
    }

    /// Run the statement and return its rows.
    pub async fn query(&self, input: QueryInput) -> DbResult<QueryResult> {
        let result = self.executor.execute(&input.sql).await?;
        info!(rows = result.row_count(), "Query completed");
        Ok(result)
    }

    /// Run the statement and shape the outcome as a tool result.
    ///
    /// Failures become an error result; they never surface as protocol errors.
    pub async fn call(&self, input: QueryInput) -> CallToolResult {
        match self.query(input).await {
            Ok(result) => success_result(&result),
            Err(err) => error_result(&err),
        }
    }
}

/// Text content mirrors the structured payload.
pub fn success_result(result: &QueryResult) -> CallToolResult {
    let mut tool_result = CallToolResult::success(vec![Content::text(result.to_text())]);
    tool_result.structured_content = Some(result.to_value());
    tool_result
}

pub fn error_result(err: &DbError) -> CallToolResult {
    Disposition::of(Operation::ExecuteQuery, err).log(Operation::ExecuteQuery, err);
    let message = match err.suggestion() {
        Some(suggestion) => format!("{}\nSuggestion: {}", err, suggestion),
        None => err.to_string(),
    };
    CallToolResult::error(vec![Content::text(message)])
}
