//! MCP for toolbox.
//!
//! JSON-RPC 2.0 message model, the MCP method dispatcher, streaming session
//! management, and the three transports: single-shot HTTP, HTTP with
//! Server-Sent Events, and stdio.

pub mod dispatcher;
pub mod error;
pub mod http_serve;
pub mod protocol;
pub mod session;
pub mod stdio;

pub use dispatcher::{error_code, Connection, ConnectionState, Dispatcher, SERVER_NAME};
pub use error::{McpError, McpResult};
pub use http_serve::{create_mcp_router, credentials_from_headers, McpHttpState};
pub use protocol::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, Outbound, RequestId,
    PROTOCOL_VERSION,
};
pub use session::{Session, SessionGuard, SessionManager};
pub use stdio::{serve_stdio, serve as serve_io};
