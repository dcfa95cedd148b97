//! The live component graph built from a tools file.

use crate::config::ToolsFile;
use crate::error::{CallError, RegistryError, RegistryResult};
use futures::future::join_all;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use toolbox_auth::{AuthGate, AuthServiceMap, Credentials};
use toolbox_sources::SourceMap;
use toolbox_tools::{
    split_arguments, BoxedTool, ToolMap, Toolset, ToolsetConfig, ToolsetMap, DEFAULT_TOOLSET,
};
use tracing::{debug, info, warn};

/// Sources, auth services, tools and toolsets, read-only once built.
pub struct Registry {
    version: String,
    sources: SourceMap,
    auth_services: AuthServiceMap,
    tools: ToolMap,
    toolsets: ToolsetMap,
}

impl Registry {
    /// Build every component in dependency order.
    ///
    /// Sources come first, then auth services, tools and finally toolsets.
    /// The `""` toolset is always rebuilt from every tool name. Any failure
    /// aborts the build and closes the sources opened so far.
    pub async fn build(file: &ToolsFile, version: &str) -> RegistryResult<Self> {
        let mut sources = SourceMap::new();
        for (name, config) in &file.sources {
            match config.initialize(name).await {
                Ok(source) => {
                    debug!(source = %name, kind = %config.kind(), "Initialized source");
                    sources.insert(name.clone(), source);
                }
                Err(source) => {
                    close_sources(&sources).await;
                    return Err(RegistryError::Source {
                        name: name.clone(),
                        source,
                    });
                }
            }
        }

        match Self::assemble(file, version, sources.clone()).await {
            Ok(registry) => {
                info!(
                    sources = registry.sources.len(),
                    auth_services = registry.auth_services.len(),
                    tools = registry.tools.len(),
                    toolsets = registry.toolsets.len(),
                    "Registry initialized"
                );
                Ok(registry)
            }
            Err(e) => {
                close_sources(&sources).await;
                Err(e)
            }
        }
    }

    async fn assemble(
        file: &ToolsFile,
        version: &str,
        sources: SourceMap,
    ) -> RegistryResult<Self> {
        check_auth_service_names(file.auth_services.keys())?;

        let mut auth_services = AuthServiceMap::new();
        for (name, config) in &file.auth_services {
            let service = config
                .initialize(name)
                .await
                .map_err(|source| RegistryError::AuthService {
                    name: name.clone(),
                    source,
                })?;
            debug!(auth_service = %name, kind = %config.kind(), "Initialized auth service");
            auth_services.insert(name.clone(), service);
        }

        let mut tools = ToolMap::new();
        for (name, config) in &file.tools {
            let tool = config
                .initialize(name, &sources)
                .map_err(|source| RegistryError::Tool {
                    name: name.clone(),
                    source,
                })?;
            let referenced = tool
                .auth_required()
                .iter()
                .chain(tool.parameter_auth_services());
            for service in referenced {
                if !auth_services.contains_key(service) {
                    return Err(RegistryError::UnknownAuthService {
                        name: name.clone(),
                        service: service.clone(),
                    });
                }
            }
            debug!(tool = %name, kind = %config.kind(), "Initialized tool");
            tools.insert(name.clone(), tool);
        }

        let mut toolset_configs = file.toolsets.clone();
        let mut all_names: Vec<String> = tools.keys().cloned().collect();
        all_names.sort();
        if toolset_configs
            .insert(DEFAULT_TOOLSET.to_string(), ToolsetConfig::new(all_names))
            .is_some()
        {
            warn!("Ignoring configured default toolset; it always holds every tool");
        }

        let mut toolsets = ToolsetMap::new();
        for (name, config) in &toolset_configs {
            let toolset = config
                .initialize(name, version, &tools)
                .map_err(|source| RegistryError::Toolset {
                    name: name.clone(),
                    source,
                })?;
            debug!(toolset = %name, tools = toolset.tools.len(), "Initialized toolset");
            toolsets.insert(name.clone(), toolset);
        }

        Ok(Self {
            version: version.to_string(),
            sources,
            auth_services,
            tools,
            toolsets,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn sources(&self) -> &SourceMap {
        &self.sources
    }

    pub fn auth_services(&self) -> &AuthServiceMap {
        &self.auth_services
    }

    pub fn tools(&self) -> &ToolMap {
        &self.tools
    }

    pub fn tool(&self, name: &str) -> Option<&BoxedTool> {
        self.tools.get(name)
    }

    pub fn toolsets(&self) -> &ToolsetMap {
        &self.toolsets
    }

    pub fn toolset(&self, name: &str) -> Option<&Toolset> {
        self.toolsets.get(name)
    }

    /// Resolve, authorize and invoke a tool.
    ///
    /// `body` carries both ordinary and template arguments. Every transport
    /// calls through here so that classification is the same everywhere.
    pub async fn call_tool(
        &self,
        name: &str,
        body: Map<String, Value>,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<String, CallError> {
        let tool = self
            .tool(name)
            .ok_or_else(|| CallError::ToolNotFound(name.to_string()))?;

        let claims = AuthGate::new(&self.auth_services)
            .authorize(
                name,
                tool.auth_required(),
                tool.parameter_auth_services(),
                credentials,
            )
            .await
            .map_err(CallError::Unauthorized)?;

        let (args, template_args) = split_arguments(tool.as_ref(), body);
        toolbox_tools::invoke(tool.as_ref(), &args, &template_args, &claims, cancel)
            .await
            .map_err(CallError::Invoke)
    }

    /// Close every source. Safe to call more than once.
    pub async fn close(&self) {
        close_sources(&self.sources).await;
    }
}

fn check_auth_service_names<'a>(names: impl IntoIterator<Item = &'a String>) -> RegistryResult<()> {
    let mut seen: HashMap<String, &String> = HashMap::new();
    for name in names {
        if let Some(first) = seen.insert(name.to_ascii_lowercase(), name) {
            return Err(RegistryError::AuthServiceCollision {
                first: first.clone(),
                second: name.clone(),
            });
        }
    }
    Ok(())
}

async fn close_sources(sources: &SourceMap) {
    let results = join_all(sources.values().map(|source| async move {
        (source.name().to_string(), source.close().await)
    }))
    .await;
    for (name, result) in results {
        if let Err(e) = result {
            warn!(source = %name, error = %e, "Failed to close source");
        }
    }
}
