//! The `/api` HTTP routes.

use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use toolbox_core::CallError;
use toolbox_mcp::credentials_from_headers;
use toolbox_tools::{manifests, ToolsetManifest, DEFAULT_TOOLSET};
use tracing::warn;

/// Create the API router.
pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/toolset", get(default_toolset))
        .route("/api/toolset/", get(default_toolset))
        .route("/api/toolset/{name}", get(toolset_get))
        .route("/api/toolset/{name}/", get(toolset_get))
        .route("/api/tool/{name}", get(tool_get))
        .route("/api/tool/{name}/", get(tool_get))
        .route("/api/tool/{name}/invoke", post(tool_invoke))
        .with_state(state)
}

/// API error response.
#[derive(Debug, Serialize)]
pub struct ApiError {
    error: String,
    code: String,
}

impl ApiError {
    fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }

    fn not_found(msg: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::NOT_FOUND, Json(Self::new(msg, "NOT_FOUND")))
    }

    fn bad_request(msg: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::BAD_REQUEST, Json(Self::new(msg, "BAD_REQUEST")))
    }

    fn unauthorized(msg: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::UNAUTHORIZED, Json(Self::new(msg, "UNAUTHORIZED")))
    }

    fn internal(msg: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Self::new(msg, "INTERNAL_ERROR")),
        )
    }

    fn from_call(err: &CallError) -> (StatusCode, Json<Self>) {
        let message = err.to_string();
        if matches!(err, CallError::ToolNotFound(_)) {
            Self::not_found(message)
        } else if err.is_auth_failure() {
            Self::unauthorized(message)
        } else if err.is_validation_failure() {
            Self::bad_request(message)
        } else {
            Self::internal(message)
        }
    }
}

async fn root() -> &'static str {
    "🧰 Hello, World! 🧰"
}

async fn default_toolset(
    State(state): State<AppState>,
) -> Result<Json<ToolsetManifest>, (StatusCode, Json<ApiError>)> {
    toolset_manifest(&state, DEFAULT_TOOLSET)
}

async fn toolset_get(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ToolsetManifest>, (StatusCode, Json<ApiError>)> {
    toolset_manifest(&state, &name)
}

fn toolset_manifest(
    state: &AppState,
    name: &str,
) -> Result<Json<ToolsetManifest>, (StatusCode, Json<ApiError>)> {
    match state.registry.toolset(name) {
        Some(toolset) => Ok(Json(toolset.manifest.clone())),
        None => Err(ApiError::not_found(format!("toolset {name:?} does not exist"))),
    }
}

async fn tool_get(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ToolsetManifest>, (StatusCode, Json<ApiError>)> {
    let Some(tool) = state.registry.tool(&name) else {
        return Err(ApiError::not_found(format!("tool {name:?} does not exist")));
    };
    Ok(Json(ToolsetManifest {
        server_version: state.registry.version().to_string(),
        tools: manifests([tool]),
    }))
}

async fn tool_invoke(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<impl IntoResponse, (StatusCode, Json<ApiError>)> {
    if state.registry.tool(&name).is_none() {
        return Err(ApiError::not_found(format!("tool {name:?} does not exist")));
    }
    let Json(body) = body.map_err(|e| ApiError::bad_request(format!("invalid request body: {e}")))?;

    let credentials = credentials_from_headers(&headers);
    let cancel = CancellationToken::new();
    // cancels the running statement if the client goes away
    let _guard = cancel.clone().drop_guard();

    match state
        .registry
        .call_tool(&name, body, &credentials, &cancel)
        .await
    {
        Ok(result) => Ok(Json(json!({ "result": result }))),
        Err(e) => {
            warn!(tool = %name, error = %e, "Tool invocation failed");
            Err(ApiError::from_call(&e))
        }
    }
}
