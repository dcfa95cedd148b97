//! Tools for toolbox.
//!
//! A tool is a named operation bound to one source, with typed parameters,
//! optional template parameters and an auth requirement. This crate holds
//! the tool capability, the parameter model, toolsets, the concrete tool
//! kinds and the invocation pipeline that every transport goes through.

pub mod error;
pub mod invoke;
pub mod params;
pub mod sqlite_execute_sql;
pub mod sqlite_sql;
pub mod template;
pub mod tool;
pub mod toolset;

pub use error::{InvokeError, InvokeResult, ParameterError, ToolError, ToolResult};
pub use invoke::{invoke, split_arguments};
pub use params::{
    parse_params, ParamAuthService, ParamValues, Parameter, ParameterManifest, ParameterType,
};
pub use sqlite_execute_sql::{SqliteExecuteSqlConfig, SQLITE_EXECUTE_SQL_KIND};
pub use sqlite_sql::{SqliteSqlConfig, SQLITE_SQL_KIND};
pub use tool::{
    manifests, resolve_source, BoxedTool, BoxedToolConfig, McpInputSchema, McpManifest, Tool,
    ToolConfig, ToolDefinition, ToolManifest, ToolMap,
};
pub use toolset::{Toolset, ToolsetConfig, ToolsetManifest, ToolsetMap, DEFAULT_TOOLSET};
