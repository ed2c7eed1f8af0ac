//! HTTP transport for the MCP server.
//!
//! Every POST to the endpoint carries one JSON-RPC message. A request gets a
//! fresh protocol session from the [`SessionFactory`], served over a one-shot
//! rmcp transport, and its response is written back as `application/json`.
//! The handler owns the running service: when the client disconnects, hyper
//! drops the handler, which cancels the serve loop and every in-flight tool
//! call of that session. `GET /` answers `hello`.

use crate::error::{DbError, DbResult};
use crate::mcp::SessionFactory;
use crate::transport::Transport;
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use rmcp::RoleServer;
use rmcp::model::{ClientJsonRpcMessage, ErrorCode, JsonRpcMessage};
use rmcp::service::serve_directly;
use rmcp::transport::OneshotTransport;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, error, info, warn};

/// Liveness response body of `GET /`.
pub const LIVENESS_BODY: &str = "hello";

/// HTTP transport implementation.
pub struct HttpTransport {
    sessions: SessionFactory,
    /// Host to bind to
    host: String,
    /// Port to bind to
    port: u16,
    /// MCP endpoint path
    endpoint: String,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    ///
    /// # Arguments
    ///
    /// * `sessions` - Factory building one protocol session per request
    /// * `host` - Host address to bind to
    /// * `port` - Port to bind to
    /// * `endpoint` - MCP endpoint path (e.g., "/mcp")
    pub fn new(
        sessions: SessionFactory,
        host: impl Into<String>,
        port: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            host: host.into(),
            port,
            endpoint: endpoint.into(),
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the MCP endpoint path.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the axum router: liveness at `/`, MCP at the endpoint.
    pub fn router(&self) -> Router {
        build_router(self.sessions.clone(), &self.endpoint)
    }
}

/// Router serving the MCP endpoint next to the liveness route.
pub fn build_router(sessions: SessionFactory, endpoint: &str) -> Router {
    let router = if endpoint == "/" {
        Router::new().route("/", get(liveness).post(handle_message))
    } else {
        Router::new()
            .route("/", get(liveness))
            .route(endpoint, post(handle_message))
    };
    router.with_state(sessions)
}

async fn liveness() -> &'static str {
    LIVENESS_BODY
}

/// Serve one JSON-RPC message with a session scoped to this HTTP request.
async fn handle_message(
    State(sessions): State<SessionFactory>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !is_json(&headers) {
        return (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Content-Type must be application/json",
        )
            .into_response();
    }

    let message = match serde_json::from_slice::<ClientJsonRpcMessage>(&body) {
        Ok(message) => message,
        Err(e) => {
            debug!(error = %e, "Rejecting malformed JSON-RPC message");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": { "code": ErrorCode::PARSE_ERROR.0, "message": "Parse error" },
                })),
            )
                .into_response();
        }
    };

    let request = match message {
        JsonRpcMessage::Request(request) => request,
        // Notifications and client responses need no session
        _ => return StatusCode::ACCEPTED.into_response(),
    };

    let service = sessions.create();
    let _scope = service.lifecycle().scope();
    let (transport, mut replies) =
        OneshotTransport::<RoleServer>::new(ClientJsonRpcMessage::Request(request));
    // Dropping the running service cancels its loop and the request tokens
    let running = serve_directly(service, transport, None);

    let reply = loop {
        match replies.recv().await {
            Some(message @ (JsonRpcMessage::Response(_) | JsonRpcMessage::Error(_))) => {
                break Some(message);
            }
            Some(_) => continue,
            None => break None,
        }
    };

    if let Err(e) = running.cancel().await {
        warn!(error = %e, "Session task ended abnormally");
    }

    match reply {
        Some(message) => Json(message).into_response(),
        None => {
            error!("Session closed without answering the request");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}

impl Transport for HttpTransport {
    async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        info!("Starting MCP server with HTTP transport on {}", bind_addr);

        let app = self.router();

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            DbError::internal(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;

        info!(
            "MCP server running on http://{}{}",
            bind_addr, self.endpoint
        );

        // Slow queries can keep connections open, so shutdown is forced after a
        // timeout once a signal arrives
        const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();

        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        return Err(DbError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    live_sessions = self.sessions.live_sessions(),
                    "Waiting for in-flight requests (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {}
        }

        info!("Closing database connections");
        self.sessions.pool().close().await;

        Ok(())
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
