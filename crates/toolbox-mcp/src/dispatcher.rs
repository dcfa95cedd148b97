//! MCP method dispatch.
//!
//! Every transport feeds requests through a [`Dispatcher`] together with the
//! [`Connection`] they arrived on. A connection starts uninitialized; until
//! `initialize` succeeds every other request is rejected.

use crate::protocol::{
    CallToolParams, InitializeResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    RequestId, ServerCapabilities, ServerInfo, ToolCallResult, ToolContent, ToolsCapability,
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PROTOCOL_VERSION,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toolbox_auth::Credentials;
use toolbox_core::{CallError, Registry};
use tracing::{debug, info, warn};

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "toolbox";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Ready,
    Closed,
}

/// Per-connection protocol state.
#[derive(Debug, Clone)]
pub struct Connection {
    state: ConnectionState,
    toolset: String,
}

impl Connection {
    /// A fresh connection listing the tools of `toolset`.
    pub fn new(toolset: impl Into<String>) -> Self {
        Self {
            state: ConnectionState::Uninitialized,
            toolset: toolset.into(),
        }
    }

    /// A connection that skips the handshake, for stateless requests.
    pub fn ready(toolset: impl Into<String>) -> Self {
        Self {
            state: ConnectionState::Ready,
            toolset: toolset.into(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn toolset(&self) -> &str {
        &self.toolset
    }

    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }
}

/// Routes JSON-RPC requests to their handlers.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Parse and handle one raw message. Returns `None` for notifications.
    pub async fn handle_text(
        &self,
        conn: &mut Connection,
        text: &str,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Option<JsonRpcResponse> {
        match JsonRpcRequest::parse(text) {
            Ok(request) => self.handle_request(conn, request, credentials, cancel).await,
            Err(response) => {
                debug!("Rejected malformed MCP message");
                Some(*response)
            }
        }
    }

    /// Handle a parsed request. Returns `None` for notifications.
    pub async fn handle_request(
        &self,
        conn: &mut Connection,
        request: JsonRpcRequest,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, id = ?request.id, state = ?conn.state, "Handling MCP request");

        // Notifications (no id) don't expect a response
        let Some(id) = request.id else {
            match request.method.as_str() {
                "notifications/initialized" => debug!("Received initialized notification"),
                _ => debug!(method = %request.method, "Ignoring notification"),
            }
            return None;
        };
        let id = Some(id);

        let response = match (conn.state, request.method.as_str()) {
            (ConnectionState::Closed, _) => {
                JsonRpcResponse::error(id, INVALID_REQUEST, "invalid request: connection is closed")
            }
            (_, "initialize") => {
                conn.state = ConnectionState::Ready;
                self.handle_initialize(id)
            }
            (ConnectionState::Uninitialized, method) => JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                format!("invalid request: {method:?} received before \"initialize\""),
            ),
            (_, "ping") => JsonRpcResponse::success(id, json!({})),
            (_, "tools/list") => self.handle_list_tools(id, conn.toolset()),
            (_, "tools/call") => {
                self.handle_call_tool(id, request.params, credentials, cancel)
                    .await
            }
            (_, method) => JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("method not found: {method}"),
            ),
        };
        Some(response)
    }

    fn handle_initialize(&self, id: Option<RequestId>) -> JsonRpcResponse {
        info!(version = %self.registry.version(), "Initializing MCP connection");

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: self.registry.version().to_string(),
            },
        };
        encode_result(id, &result)
    }

    fn handle_list_tools(&self, id: Option<RequestId>, toolset: &str) -> JsonRpcResponse {
        let Some(toolset) = self.registry.toolset(toolset) else {
            return JsonRpcResponse::error(
                id,
                INVALID_PARAMS,
                format!("toolset {toolset:?} does not exist"),
            );
        };
        debug!(toolset = %toolset.name, count = toolset.tools.len(), "Listing MCP tools");

        let result = ListToolsResult {
            tools: toolset.tools.iter().map(|t| t.mcp_manifest()).collect(),
        };
        encode_result(id, &result)
    }

    async fn handle_call_tool(
        &self,
        id: Option<RequestId>,
        params: Option<Value>,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> JsonRpcResponse {
        let params: CallToolParams = match params.map(serde_json::from_value::<CallToolParams>) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, format!("invalid params: {e}"))
            }
            None => return JsonRpcResponse::error(id, INVALID_PARAMS, "missing params"),
        };

        debug!(tool = %params.name, "Calling MCP tool");
        let arguments = params.arguments.unwrap_or_default();
        match self
            .registry
            .call_tool(&params.name, arguments, credentials, cancel)
            .await
        {
            Ok(text) => {
                debug!(tool = %params.name, output_len = text.len(), "Tool completed successfully");
                let result = ToolCallResult {
                    content: vec![ToolContent::Text { text }],
                    is_error: false,
                };
                encode_result(id, &result)
            }
            Err(e) => {
                warn!(tool = %params.name, error = %e, "Tool call failed");
                JsonRpcResponse::error(id, error_code(&e), e.to_string())
            }
        }
    }
}

/// JSON-RPC code for a failed tool call.
pub fn error_code(err: &CallError) -> i64 {
    if err.is_auth_failure() {
        INVALID_REQUEST
    } else if matches!(err, CallError::ToolNotFound(_)) || err.is_validation_failure() {
        INVALID_PARAMS
    } else {
        INTERNAL_ERROR
    }
}

fn encode_result<T: serde::Serialize>(id: Option<RequestId>, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, format!("unable to encode result: {e}")),
    }
}
