//! The tool capability and its advertised manifests.

use crate::error::{ParameterError, ToolError, ToolResult};
use crate::params::{ParamValues, Parameter, ParameterManifest};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toolbox_sources::{BoxedSource, SourceMap};

/// Tool as advertised by the HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolManifest {
    pub description: String,
    pub parameters: Vec<ParameterManifest>,
    pub auth_required: Vec<String>,
}

/// Tool as advertised by MCP `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McpManifest {
    pub name: String,
    pub description: String,
    pub input_schema: McpInputSchema,
    pub auth_required: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct McpInputSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: Map<String, Value>,
    pub required: Vec<String>,
}

/// Everything a tool declares, fixed at construction.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub kind: String,
    pub description: String,
    pub parameters: Vec<Parameter>,
    pub template_parameters: Vec<Parameter>,
    pub auth_required: Vec<String>,
    parameter_auth_services: Vec<String>,
    manifest: ToolManifest,
    mcp_manifest: McpManifest,
}

impl ToolDefinition {
    /// Validate the declared parameters and build both manifests.
    ///
    /// Template parameters share the argument namespace with ordinary
    /// parameters, so a name may be declared only once across both lists.
    pub fn new(
        name: &str,
        kind: &str,
        description: &str,
        parameters: Vec<Parameter>,
        template_parameters: Vec<Parameter>,
        auth_required: Vec<String>,
    ) -> ToolResult<Self> {
        let mut seen = HashSet::new();
        for param in parameters.iter().chain(&template_parameters) {
            param.validate()?;
            if !seen.insert(param.name.as_str()) {
                return Err(ParameterError::invalid_definition(
                    &param.name,
                    "declared more than once across parameters and templateParameters",
                )
                .into());
            }
        }

        let all: Vec<&Parameter> = parameters.iter().chain(&template_parameters).collect();

        let mut parameter_auth_services = Vec::new();
        for svc in all.iter().flat_map(|p| &p.auth_services) {
            if !parameter_auth_services.contains(&svc.name) {
                parameter_auth_services.push(svc.name.clone());
            }
        }

        let manifest = ToolManifest {
            description: description.to_string(),
            parameters: all.iter().map(|p| p.manifest()).collect(),
            auth_required: auth_required.clone(),
        };

        // authenticated parameters are filled server-side, never by the caller
        let exposed = all.iter().filter(|p| p.auth_services.is_empty());
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in exposed {
            properties.insert(param.name.clone(), param.mcp_schema());
            if param.is_required() {
                required.push(param.name.clone());
            }
        }
        let mcp_manifest = McpManifest {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: McpInputSchema {
                kind: "object".to_string(),
                properties,
                required,
            },
            auth_required: auth_required.clone(),
        };

        Ok(Self {
            name: name.to_string(),
            kind: kind.to_string(),
            description: description.to_string(),
            parameters,
            template_parameters,
            auth_required,
            parameter_auth_services,
            manifest,
            mcp_manifest,
        })
    }
}

/// A named, invocable operation bound to one source.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> &ToolDefinition;

    fn name(&self) -> &str {
        &self.definition().name
    }

    fn kind(&self) -> &str {
        &self.definition().kind
    }

    fn description(&self) -> &str {
        &self.definition().description
    }

    fn parameters(&self) -> &[Parameter] {
        &self.definition().parameters
    }

    fn template_parameters(&self) -> &[Parameter] {
        &self.definition().template_parameters
    }

    /// Auth services, any one of which authorizes a call. Empty means open.
    fn auth_required(&self) -> &[String] {
        &self.definition().auth_required
    }

    /// Auth services referenced by authenticated parameters.
    fn parameter_auth_services(&self) -> &[String] {
        &self.definition().parameter_auth_services
    }

    fn manifest(&self) -> &ToolManifest {
        &self.definition().manifest
    }

    fn mcp_manifest(&self) -> &McpManifest {
        &self.definition().mcp_manifest
    }

    /// Execute with already validated values.
    async fn invoke(
        &self,
        params: ParamValues,
        template_params: ParamValues,
        cancel: &CancellationToken,
    ) -> ToolResult<Value>;
}

/// A shared tool handle.
pub type BoxedTool = Arc<dyn Tool>;

/// Tools keyed by name.
pub type ToolMap = HashMap<String, BoxedTool>;

/// Configuration for one tool kind.
pub trait ToolConfig: Send + Sync + Debug {
    fn kind(&self) -> &str;

    /// Build the tool, resolving its source from the full source map.
    fn initialize(&self, name: &str, sources: &SourceMap) -> ToolResult<BoxedTool>;
}

/// A boxed tool configuration.
pub type BoxedToolConfig = Box<dyn ToolConfig>;

/// Look up `source` and check its kind is one the tool can drive.
pub fn resolve_source(
    tool_kind: &str,
    source: &str,
    sources: &SourceMap,
    compatible: &[&str],
) -> ToolResult<BoxedSource> {
    let handle = sources
        .get(source)
        .ok_or_else(|| ToolError::SourceNotFound(source.to_string()))?;
    if !compatible.contains(&handle.kind()) {
        return Err(ToolError::IncompatibleSource {
            kind: tool_kind.to_string(),
            compatible: compatible.iter().map(|k| k.to_string()).collect(),
        });
    }
    Ok(handle.clone())
}

/// Manifests of `tools` keyed by name.
pub fn manifests<'a>(
    tools: impl IntoIterator<Item = &'a BoxedTool>,
) -> BTreeMap<String, ToolManifest> {
    tools
        .into_iter()
        .map(|t| (t.name().to_string(), t.manifest().clone()))
        .collect()
}
