//! MCP service implementation using rmcp.
//!
//! `SchemaService` is the protocol session for exactly one inbound request.
//! It publishes the table schema resources and the read-only query tool.
//! Every operation races the request's cancellation token; a closed
//! transport abandons the work and drops any leased connection.

use crate::db::{ConnectionPool, ReadOnlyExecutor};
use crate::error::{DbError, Disposition, Operation};
use crate::mcp::session::SessionLifecycle;
use crate::models::QueryResult;
use crate::resources::TableSchemaResources;
use crate::resources::table_schema::{resource_template, to_resource};
use crate::tools::query::{QueryInput, QueryToolHandler};
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    handler::server::tool::{ToolRouter, schema_for_type},
    handler::server::wrapper::Parameters,
    model::{
        CallToolResult, Implementation, ListResourceTemplatesResult, ListResourcesResult,
        PaginatedRequestParam, ProtocolVersion, ReadResourceRequestParam, ReadResourceResult,
        ServerCapabilities, ServerInfo,
    },
    service::RequestContext,
    tool, tool_handler, tool_router,
};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct SchemaService {
    resources: TableSchemaResources,
    query: QueryToolHandler,
    lifecycle: Arc<SessionLifecycle>,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl SchemaService {
    pub fn new(
        pool: Arc<ConnectionPool>,
        executor: Arc<ReadOnlyExecutor>,
        lifecycle: Arc<SessionLifecycle>,
    ) -> Self {
        Self {
            resources: TableSchemaResources::new(pool),
            query: QueryToolHandler::new(executor),
            lifecycle,
            tool_router: Self::tool_router(),
        }
    }

    pub fn lifecycle(&self) -> &Arc<SessionLifecycle> {
        &self.lifecycle
    }

    /// Run `work` as one session operation, abandoning it on cancellation.
    async fn run<T>(
        &self,
        op: Operation,
        ct: &CancellationToken,
        work: impl Future<Output = T>,
    ) -> Result<T, DbError> {
        let _active = self.lifecycle.enter();
        tokio::select! {
            biased;
            _ = ct.cancelled() => {
                let err = DbError::TransportClosed;
                Disposition::of(op, &err).log(op, &err);
                Err(err)
            }
            output = work => Ok(output),
        }
    }
}

#[tool_router]
impl SchemaService {
    #[tool(
        name = "execute-read-queries",
        title = "Query Runner",
        description = "Runs a read-only query in postgres.\nThe statement executes inside a read-only transaction that is always rolled back; writes are rejected by the database.\nReturns { result: [ {column: value, ...} ] }.",
        output_schema = schema_for_type::<QueryResult>()
    )]
    async fn execute_read_queries(
        &self,
        Parameters(input): Parameters<QueryInput>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        self.run(Operation::ExecuteQuery, &context.ct, self.query.call(input))
            .await
            .map_err(McpError::from)
    }
}

#[tool_handler]
impl ServerHandler for SchemaService {
    fn get_info(&self) -> ServerInfo {
        self.lifecycle.bind();
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_owned(),
                title: Some("Database Schema MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Read-only access to a SQL database.\n\
                \n\
                ## Resources\n\
                - `resources/list` returns one `table://<table>/schema` entry per table\n\
                - Reading an entry returns its columns as JSON `[{column_name, data_type}]`\n\
                \n\
                ## Tools\n\
                - `execute-read-queries`: run one SQL statement in a read-only transaction.\n\
                  Any write fails and nothing is ever committed."
                    .to_string(),
            ),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let tables = self
            .run(Operation::ListResources, &context.ct, self.resources.list())
            .await?;
        Ok(ListResourcesResult::with_all_items(
            tables.iter().map(to_resource).collect(),
        ))
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        self.lifecycle.bind();
        Ok(ListResourceTemplatesResult::with_all_items(vec![
            resource_template(),
        ]))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let result = self
            .run(
                Operation::ReadResource,
                &context.ct,
                self.resources.read_contents(&request.uri),
            )
            .await?;
        result.map_err(|err| {
            Disposition::of(Operation::ReadResource, &err).log(Operation::ReadResource, &err);
            McpError::from(err)
        })
    }
}
