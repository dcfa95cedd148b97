//! `sqlite-sql`: a fixed statement with bound parameters.

use crate::error::ToolResult;
use crate::params::{ParamValues, Parameter};
use crate::template::StatementTemplate;
use crate::tool::{resolve_source, BoxedTool, Tool, ToolConfig, ToolDefinition};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toolbox_sources::{BoxedSource, SourceMap, SQLITE_SOURCE_KIND};
use tracing::debug;

pub const SQLITE_SQL_KIND: &str = "sqlite-sql";

const COMPATIBLE_SOURCES: [&str; 1] = [SQLITE_SOURCE_KIND];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqliteSqlConfig {
    pub source: String,
    #[serde(default)]
    pub description: String,
    pub statement: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub template_parameters: Vec<Parameter>,
    #[serde(default)]
    pub auth_required: Vec<String>,
}

impl ToolConfig for SqliteSqlConfig {
    fn kind(&self) -> &str {
        SQLITE_SQL_KIND
    }

    fn initialize(&self, name: &str, sources: &SourceMap) -> ToolResult<BoxedTool> {
        let source = resolve_source(SQLITE_SQL_KIND, &self.source, sources, &COMPATIBLE_SOURCES)?;
        let definition = ToolDefinition::new(
            name,
            SQLITE_SQL_KIND,
            &self.description,
            self.parameters.clone(),
            self.template_parameters.clone(),
            self.auth_required.clone(),
        )?;

        let template = StatementTemplate::new();
        if !self.template_parameters.is_empty() {
            template.check(&self.statement)?;
        }

        Ok(Arc::new(SqliteSqlTool {
            definition,
            source,
            statement: self.statement.clone(),
            template,
        }))
    }
}

pub struct SqliteSqlTool {
    definition: ToolDefinition,
    source: BoxedSource,
    statement: String,
    template: StatementTemplate,
}

#[async_trait]
impl Tool for SqliteSqlTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn invoke(
        &self,
        params: ParamValues,
        template_params: ParamValues,
        cancel: &CancellationToken,
    ) -> ToolResult<Value> {
        let rendered;
        let statement = if self.definition.template_parameters.is_empty() {
            self.statement.as_str()
        } else {
            rendered = self.template.render(&self.statement, &template_params)?;
            rendered.as_str()
        };

        debug!(tool = %self.definition.name, source = %self.source.name(), "Executing statement");
        Ok(self.source.execute(statement, &params.values(), cancel).await?)
    }
}
