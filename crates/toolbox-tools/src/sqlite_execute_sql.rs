//! `sqlite-execute-sql`: runs caller supplied SQL verbatim.

use crate::error::{ParameterError, ToolResult};
use crate::params::{ParamValues, Parameter, ParameterType};
use crate::tool::{resolve_source, BoxedTool, Tool, ToolConfig, ToolDefinition};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toolbox_sources::{BoxedSource, SourceMap, SQLITE_SOURCE_KIND};
use tracing::debug;

pub const SQLITE_EXECUTE_SQL_KIND: &str = "sqlite-execute-sql";

const COMPATIBLE_SOURCES: [&str; 1] = [SQLITE_SOURCE_KIND];

const SQL_PARAMETER: &str = "sql";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqliteExecuteSqlConfig {
    pub source: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub auth_required: Vec<String>,
}

impl ToolConfig for SqliteExecuteSqlConfig {
    fn kind(&self) -> &str {
        SQLITE_EXECUTE_SQL_KIND
    }

    fn initialize(&self, name: &str, sources: &SourceMap) -> ToolResult<BoxedTool> {
        let source = resolve_source(
            SQLITE_EXECUTE_SQL_KIND,
            &self.source,
            sources,
            &COMPATIBLE_SOURCES,
        )?;
        let definition = ToolDefinition::new(
            name,
            SQLITE_EXECUTE_SQL_KIND,
            &self.description,
            vec![Parameter::new(
                SQL_PARAMETER,
                ParameterType::String,
                "The sql to execute.",
            )],
            Vec::new(),
            self.auth_required.clone(),
        )?;
        Ok(Arc::new(SqliteExecuteSqlTool { definition, source }))
    }
}

pub struct SqliteExecuteSqlTool {
    definition: ToolDefinition,
    source: BoxedSource,
}

#[async_trait]
impl Tool for SqliteExecuteSqlTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn invoke(
        &self,
        params: ParamValues,
        _template_params: ParamValues,
        cancel: &CancellationToken,
    ) -> ToolResult<Value> {
        let sql = params
            .get(SQL_PARAMETER)
            .and_then(Value::as_str)
            .ok_or_else(|| ParameterError::Required(SQL_PARAMETER.to_string()))?;
        debug!(tool = %self.definition.name, "Executing caller supplied sql");
        Ok(self.source.execute(sql, &[], cancel).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use serde_json::json;
    use toolbox_sources::{SourceConfig, SqliteConfig};

    async fn tool() -> BoxedTool {
        let source = SqliteConfig::in_memory().initialize("my-db").await.unwrap();
        let mut sources = SourceMap::new();
        sources.insert("my-db".to_string(), source);
        SqliteExecuteSqlConfig {
            source: "my-db".to_string(),
            description: "Run any sql".to_string(),
            auth_required: Vec::new(),
        }
        .initialize("exec", &sources)
        .unwrap()
    }

    fn sql(statement: &str) -> ParamValues {
        let mut params = ParamValues::new();
        params.push("sql", json!(statement));
        params
    }

    #[tokio::test]
    async fn test_declares_sql_parameter() {
        let tool = tool().await;
        assert_eq!(tool.parameters().len(), 1);
        assert_eq!(tool.parameters()[0].name, "sql");
        assert!(tool.parameters()[0].is_required());
        assert_eq!(
            tool.mcp_manifest().input_schema.required,
            vec!["sql".to_string()]
        );
    }

    #[tokio::test]
    async fn test_executes_statements() {
        let tool = tool().await;
        let cancel = CancellationToken::new();

        let created = tool
            .invoke(sql("CREATE TABLE t (v TEXT)"), ParamValues::new(), &cancel)
            .await
            .unwrap();
        assert_eq!(created, Value::Null);

        tool.invoke(sql("INSERT INTO t VALUES ('x')"), ParamValues::new(), &cancel)
            .await
            .unwrap();
        let rows = tool
            .invoke(sql("SELECT v FROM t"), ParamValues::new(), &cancel)
            .await
            .unwrap();
        assert_eq!(rows, json!([{"v": "x"}]));
    }

    #[tokio::test]
    async fn test_incompatible_source_kind() {
        struct OtherSource;

        #[async_trait]
        impl toolbox_sources::Source for OtherSource {
            fn name(&self) -> &str {
                "other"
            }
            fn kind(&self) -> &str {
                "postgres"
            }
            async fn execute(
                &self,
                _statement: &str,
                _params: &[Value],
                _cancel: &CancellationToken,
            ) -> toolbox_sources::SourceResult<Value> {
                Ok(Value::Null)
            }
            async fn close(&self) -> toolbox_sources::SourceResult<()> {
                Ok(())
            }
        }

        let mut sources = SourceMap::new();
        sources.insert("other".to_string(), Arc::new(OtherSource) as BoxedSource);
        let err = SqliteExecuteSqlConfig {
            source: "other".to_string(),
            description: String::new(),
            auth_required: Vec::new(),
        }
        .initialize("exec", &sources)
        .err()
        .unwrap();
        assert!(matches!(err, ToolError::IncompatibleSource { .. }));
        assert_eq!(
            err.to_string(),
            "invalid source for \"sqlite-execute-sql\" tool: source kind must be one of [\"sqlite\"]"
        );
    }
}
