//! HTTP server for toolbox.
//!
//! Serves the `/api` routes for listing and invoking tools, and mounts the
//! MCP endpoints from `toolbox-mcp` on the same listener.

pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ServerError, ServerResult};
pub use routes::{create_api_router, ApiError};
pub use server::{create_router, Server};
pub use state::AppState;
