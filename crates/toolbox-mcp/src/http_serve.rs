//! HTTP transports for MCP.
//!
//! # Protocol
//!
//! ```text
//! Client                                Server
//!   │                                     │
//!   │── POST /mcp ───────────────────────►│ (single-shot, stateless)
//!   │◄── JSON-RPC response ───────────────│
//!   │                                     │
//!   │── GET /mcp/sse ────────────────────►│ (establish SSE connection)
//!   │◄── SSE: endpoint event ─────────────│ (/mcp?sessionId=<id>)
//!   │── POST /mcp?sessionId=<id> ────────►│ (202 Accepted)
//!   │◄── SSE: message event ──────────────│ (JSON-RPC response)
//! ```
//!
//! `/mcp/{toolset}` and `/mcp/{toolset}/sse` behave the same but list only
//! the tools of that toolset.

use crate::dispatcher::{Connection, Dispatcher};
use crate::protocol::Outbound;
use crate::session::{SessionGuard, SessionManager};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use toolbox_auth::Credentials;
use toolbox_tools::DEFAULT_TOOLSET;
use tracing::{debug, info, warn};

/// Interval between SSE keep-alive comments.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// State for the MCP HTTP routes.
#[derive(Clone)]
pub struct McpHttpState {
    dispatcher: Dispatcher,
    sessions: Arc<SessionManager>,
    /// Cancelled at server shutdown; ends every SSE stream.
    shutdown: CancellationToken,
}

impl McpHttpState {
    pub fn new(dispatcher: Dispatcher, shutdown: CancellationToken) -> Self {
        Self {
            dispatcher,
            sessions: Arc::new(SessionManager::new()),
            shutdown,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    fn has_toolset(&self, toolset: &str) -> bool {
        self.dispatcher.registry().toolset(toolset).is_some()
    }

    async fn handle_post(
        &self,
        toolset: &str,
        session_id: Option<String>,
        headers: &HeaderMap,
        body: &str,
    ) -> Response {
        let credentials = credentials_from_headers(headers);

        let Some(session_id) = session_id else {
            if !self.has_toolset(toolset) {
                return toolset_not_found(toolset);
            }
            let mut conn = Connection::ready(toolset);
            // fires when the client goes away and this future is dropped
            let cancel = CancellationToken::new();
            let _guard = cancel.clone().drop_guard();
            return match self
                .dispatcher
                .handle_text(&mut conn, body, &credentials, &cancel)
                .await
            {
                Some(response) => Json(response).into_response(),
                None => StatusCode::NO_CONTENT.into_response(),
            };
        };

        let Some(session) = self.sessions.get(&session_id).await else {
            warn!(session_id = %session_id, "Message for unknown session");
            return session_not_found();
        };
        debug!(session_id = %session_id, "Received MCP message");

        let mut conn = session.connection().lock().await;
        let response = self
            .dispatcher
            .handle_text(&mut conn, body, &credentials, session.cancel_token())
            .await;
        drop(conn);

        if let Some(response) = response {
            if session.send(Outbound::Response(response)).is_err() {
                warn!(session_id = %session_id, "Failed to send response - session closed");
                return session_not_found();
            }
        }
        (StatusCode::ACCEPTED, Json(json!({ "status": "ok" }))).into_response()
    }

    async fn open_stream(&self, toolset: &str) -> Response {
        if !self.has_toolset(toolset) {
            return toolset_not_found(toolset);
        }

        let (session, mut rx) = self.sessions.open(toolset, &self.shutdown).await;
        let message_url = if toolset.is_empty() {
            format!("/mcp?sessionId={}", session.id())
        } else {
            format!("/mcp/{}?sessionId={}", toolset, session.id())
        };
        info!(session_id = %session.id(), message_url = %message_url, "MCP SSE connection established");

        let guard = SessionGuard::new(self.sessions.clone(), session.clone());
        let cancel = session.cancel_token().clone();

        let stream = async_stream::stream! {
            let _guard = guard;
            yield Ok::<_, Infallible>(Event::default().event("endpoint").data(message_url));

            loop {
                tokio::select! {
                    message = rx.recv() => {
                        let Some(message) = message else { break };
                        match serde_json::to_string(&message) {
                            Ok(data) => yield Ok(Event::default().event("message").data(data)),
                            Err(e) => warn!(error = %e, "Failed to encode MCP message"),
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        };

        Sse::new(stream)
            .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text("ping"))
            .into_response()
    }
}

/// Collect `<service>_token` headers.
pub fn credentials_from_headers(headers: &HeaderMap) -> Credentials {
    Credentials::from_headers(
        headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
    )
}

fn session_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Session not found" })),
    )
        .into_response()
}

fn toolset_not_found(toolset: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("toolset {toolset:?} does not exist") })),
    )
        .into_response()
}

/// Query parameters for message endpoints.
#[derive(Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Create the MCP HTTP router.
pub fn create_mcp_router(state: McpHttpState) -> Router {
    Router::new()
        .route("/mcp", post(mcp_message))
        .route("/mcp/sse", get(mcp_sse))
        .route("/mcp/{toolset}", post(mcp_toolset_message))
        .route("/mcp/{toolset}/sse", get(mcp_toolset_sse))
        .with_state(state)
}

async fn mcp_message(
    State(state): State<McpHttpState>,
    Query(query): Query<MessageQuery>,
    headers: HeaderMap,
    body: String,
) -> Response {
    state
        .handle_post(DEFAULT_TOOLSET, query.session_id, &headers, &body)
        .await
}

async fn mcp_toolset_message(
    State(state): State<McpHttpState>,
    Path(toolset): Path<String>,
    Query(query): Query<MessageQuery>,
    headers: HeaderMap,
    body: String,
) -> Response {
    state
        .handle_post(&toolset, query.session_id, &headers, &body)
        .await
}

async fn mcp_sse(State(state): State<McpHttpState>) -> Response {
    state.open_stream(DEFAULT_TOOLSET).await
}

async fn mcp_toolset_sse(
    State(state): State<McpHttpState>,
    Path(toolset): Path<String>,
) -> Response {
    state.open_stream(&toolset).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::tests::dispatcher;
    use crate::protocol::{JsonRpcResponse, RequestId};
    use axum::http::{HeaderName, HeaderValue};
    use axum_test::TestServer;
    use serde_json::Value;

    async fn state() -> McpHttpState {
        McpHttpState::new(dispatcher().await, CancellationToken::new())
    }

    async fn server() -> TestServer {
        TestServer::new(create_mcp_router(state().await)).unwrap()
    }

    #[test]
    fn test_credentials_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("my-jwt_token", "abc".parse().unwrap());
        headers.insert("content-type", "application/json".parse().unwrap());
        let credentials = credentials_from_headers(&headers);
        assert_eq!(credentials.token("my-jwt"), Some("abc"));
        assert_eq!(credentials.token("content-type"), None);
    }

    #[tokio::test]
    async fn test_single_shot_call() {
        let server = server().await;
        let response = server
            .post("/mcp")
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/call",
                "params": {"name": "get-n", "arguments": {"id": 3}}
            }))
            .await;
        response.assert_status_ok();
        let body: JsonRpcResponse = response.json();
        assert_eq!(body.id, Some(RequestId::from(1)));
        assert_eq!(
            body.result.unwrap()["content"][0]["text"],
            Value::from("[{\"n\":3}]")
        );
    }

    fn exec_request(sql: &str) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": "exec", "arguments": {"sql": sql}}
        })
    }

    #[tokio::test]
    async fn test_dropped_single_shot_request_cancels_statement() {
        let state = state().await;
        let server = TestServer::new(create_mcp_router(state.clone())).unwrap();
        server
            .post("/mcp")
            .json(&exec_request("CREATE TABLE t (x INTEGER)"))
            .await
            .assert_status_ok();

        let slow = exec_request(
            "WITH RECURSIVE c(x) AS \
             (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 2000000) \
             INSERT INTO t SELECT x FROM c",
        )
        .to_string();
        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            state.handle_post(DEFAULT_TOOLSET, None, &HeaderMap::new(), &slow),
        )
        .await;
        assert!(abandoned.is_err());

        // queued behind the abandoned insert, which rolls back
        let body: Value = server
            .post("/mcp")
            .json(&exec_request("SELECT count(*) AS n FROM t"))
            .await
            .json();
        assert_eq!(
            body["result"]["content"][0]["text"],
            Value::from("[{\"n\":0}]")
        );
    }

    #[tokio::test]
    async fn test_single_shot_notification_is_no_content() {
        let server = server().await;
        let response = server
            .post("/mcp")
            .json(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await;
        response.assert_status(StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_single_shot_malformed_body() {
        let server = server().await;
        let response = server.post("/mcp").text("{oops").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["id"], Value::Null);
        assert_eq!(body["error"]["code"], Value::from(-32600));
    }

    #[tokio::test]
    async fn test_single_shot_auth_header() {
        use jsonwebtoken::{encode, get_current_timestamp, EncodingKey, Header};

        let token = encode(
            &Header::default(),
            &json!({"sub": "x", "exp": get_current_timestamp() + 600}),
            &EncodingKey::from_secret(b"s3cret"),
        )
        .unwrap();
        let request = json!({
            "jsonrpc": "2.0",
            "id": "auth",
            "method": "tools/call",
            "params": {"name": "secret", "arguments": {}}
        });

        let server = server().await;
        let denied: Value = server.post("/mcp").json(&request).await.json();
        assert_eq!(denied["error"]["code"], Value::from(-32600));

        let allowed: Value = server
            .post("/mcp")
            .add_header(
                HeaderName::from_static("my-jwt_token"),
                HeaderValue::from_str(&token).unwrap(),
            )
            .json(&request)
            .await
            .json();
        assert_eq!(allowed["result"]["content"][0]["text"], Value::from("[{\"ok\":1}]"));
    }

    #[tokio::test]
    async fn test_scoped_single_shot_list() {
        let server = server().await;
        let body: Value = server
            .post("/mcp/numbers")
            .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
            .await
            .json();
        assert_eq!(body["result"]["tools"].as_array().unwrap().len(), 1);

        server
            .post("/mcp/ghost")
            .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let server = server().await;
        server
            .post("/mcp")
            .add_query_param("sessionId", "does-not-exist")
            .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
            .await
            .assert_status_not_found();
    }

    #[tokio::test]
    async fn test_session_message_routed_to_queue() {
        let state = state().await;
        let (session, mut rx) = state.sessions().open("", &CancellationToken::new()).await;
        let server = TestServer::new(create_mcp_router(state.clone())).unwrap();

        let response = server
            .post("/mcp")
            .add_query_param("sessionId", session.id())
            .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
            .await;
        response.assert_status(StatusCode::ACCEPTED);

        // handshake not yet done on this session
        let Some(Outbound::Response(first)) = rx.recv().await else {
            panic!("expected response");
        };
        assert_eq!(first.error.unwrap().code, -32600);

        server
            .post("/mcp")
            .add_query_param("sessionId", session.id())
            .json(&json!({"jsonrpc": "2.0", "id": 2, "method": "initialize", "params": {}}))
            .await
            .assert_status(StatusCode::ACCEPTED);
        let Some(Outbound::Response(second)) = rx.recv().await else {
            panic!("expected response");
        };
        assert_eq!(second.id, Some(RequestId::from(2)));
        assert!(second.result.is_some());
    }

    #[tokio::test]
    async fn test_sse_unknown_toolset() {
        let server = server().await;
        server.get("/mcp/ghost/sse").await.assert_status_not_found();
    }
}
