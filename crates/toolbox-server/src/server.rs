//! Router composition and the listener lifecycle.

use crate::error::{ServerError, ServerResult};
use crate::routes::create_api_router;
use crate::state::AppState;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use toolbox_core::Registry;
use toolbox_mcp::{create_mcp_router, Dispatcher, McpHttpState};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, Span};

/// Build the complete router: the `/api` surface plus the MCP endpoints.
///
/// Streaming sessions are children of `shutdown`, so cancelling it ends
/// every open event stream.
pub fn create_router(registry: Arc<Registry>, shutdown: CancellationToken) -> Router {
    let mcp = McpHttpState::new(Dispatcher::new(registry.clone()), shutdown);
    router_with(registry, mcp)
}

fn router_with(registry: Arc<Registry>, mcp: McpHttpState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    create_api_router(AppState::new(registry))
        .merge(create_mcp_router(mcp))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_request(|request: &axum::http::Request<_>, _span: &Span| {
                    info!(
                        method = %request.method(),
                        path = %request.uri().path(),
                        "request"
                    );
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, _span: &Span| {
                        info!(
                            status = %response.status(),
                            latency = ?latency,
                            "response"
                        );
                    },
                ),
        )
}

/// The HTTP server.
pub struct Server {
    registry: Arc<Registry>,
    listener: TcpListener,
}

impl Server {
    /// Bind to `address:port`. Port 0 picks a free port.
    pub async fn bind(registry: Arc<Registry>, address: &str, port: u16) -> ServerResult<Self> {
        let target = format!("{address}:{port}");
        match TcpListener::bind(target.as_str()).await {
            Ok(listener) => Ok(Self { registry, listener }),
            Err(source) => Err(ServerError::Bind {
                address: target,
                source,
            }),
        }
    }

    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        self.listener.local_addr().map_err(ServerError::Serve)
    }

    /// Serve until `shutdown` is cancelled.
    ///
    /// Open sessions are closed and in-flight requests drain before the
    /// registry's sources are released.
    pub async fn run(self, shutdown: CancellationToken) -> ServerResult<()> {
        let mcp = McpHttpState::new(Dispatcher::new(self.registry.clone()), shutdown.clone());
        let sessions = mcp.sessions().clone();
        let router = router_with(self.registry.clone(), mcp);

        if let Ok(addr) = self.listener.local_addr() {
            info!(address = %addr, "Server ready to serve");
        }

        let result = axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(ServerError::Serve);

        sessions.close_all().await;
        self.registry.close().await;
        info!("Server stopped");
        result
    }
}
