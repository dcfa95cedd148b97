//! Named groups of tools.

use crate::error::{ToolError, ToolResult};
use crate::tool::{manifests, BoxedTool, ToolManifest, ToolMap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the toolset that always holds every configured tool.
pub const DEFAULT_TOOLSET: &str = "";

/// A toolset as written in the tools file: an ordered list of tool names.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ToolsetConfig {
    pub tool_names: Vec<String>,
}

impl ToolsetConfig {
    pub fn new(tool_names: Vec<String>) -> Self {
        Self { tool_names }
    }

    /// Resolve every tool name, failing on the first unknown one.
    pub fn initialize(
        &self,
        name: &str,
        server_version: &str,
        tools: &ToolMap,
    ) -> ToolResult<Toolset> {
        let resolved = self
            .tool_names
            .iter()
            .map(|tool| {
                tools
                    .get(tool)
                    .cloned()
                    .ok_or_else(|| ToolError::ToolNotFound(tool.clone()))
            })
            .collect::<ToolResult<Vec<_>>>()?;

        let manifest = ToolsetManifest {
            server_version: server_version.to_string(),
            tools: manifests(&resolved),
        };

        Ok(Toolset {
            name: name.to_string(),
            tools: resolved,
            manifest,
        })
    }
}

/// Toolset as advertised by the HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsetManifest {
    pub server_version: String,
    pub tools: BTreeMap<String, ToolManifest>,
}

#[derive(Clone)]
pub struct Toolset {
    pub name: String,
    pub tools: Vec<BoxedTool>,
    pub manifest: ToolsetManifest,
}

impl Toolset {
    pub fn contains(&self, tool: &str) -> bool {
        self.tools.iter().any(|t| t.name() == tool)
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }
}

impl std::fmt::Debug for Toolset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolset")
            .field("name", &self.name)
            .field("tools", &self.tool_names())
            .finish()
    }
}

/// Toolsets keyed by name.
pub type ToolsetMap = std::collections::HashMap<String, Toolset>;
