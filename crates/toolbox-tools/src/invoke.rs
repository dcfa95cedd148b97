//! The invocation pipeline shared by every transport.

use crate::error::{InvokeError, InvokeResult, ToolError};
use crate::params::parse_params;
use crate::tool::Tool;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use toolbox_auth::ClaimsMap;
use tracing::debug;

/// Split a request body into ordinary and template arguments.
///
/// Both travel in the same body; keys naming a template parameter are moved
/// to the second map.
pub fn split_arguments(
    tool: &dyn Tool,
    mut body: Map<String, Value>,
) -> (Map<String, Value>, Map<String, Value>) {
    let mut template = Map::new();
    for param in tool.template_parameters() {
        if let Some(value) = body.remove(&param.name) {
            template.insert(param.name.clone(), value);
        }
    }
    (body, template)
}

/// Validate arguments, run the tool and encode its result as a JSON string.
///
/// A tool producing no rows yields `"null"`.
pub async fn invoke(
    tool: &dyn Tool,
    args: &Map<String, Value>,
    template_args: &Map<String, Value>,
    claims: &ClaimsMap,
    cancel: &CancellationToken,
) -> InvokeResult<String> {
    let params = parse_params(tool.parameters(), args, claims)?;
    let template_params = parse_params(tool.template_parameters(), template_args, claims)?;

    debug!(tool = %tool.name(), params = params.len(), "Invoking tool");
    let value = tool
        .invoke(params, template_params, cancel)
        .await
        .map_err(InvokeError::Execution)?;

    serde_json::to_string(&value).map_err(|e| InvokeError::Execution(ToolError::Encode(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParameterError;
    use crate::params::{Parameter, ParameterType};
    use crate::sqlite_sql::SqliteSqlConfig;
    use crate::tool::{BoxedTool, ToolConfig};
    use serde_json::json;
    use toolbox_sources::{SourceConfig, SourceMap, SqliteConfig};

    async fn tool() -> BoxedTool {
        let source = SqliteConfig::in_memory().initialize("my-db").await.unwrap();
        source
            .execute(
                "CREATE TABLE t (id INTEGER, name TEXT)",
                &[],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        source
            .execute(
                "INSERT INTO t VALUES (1, 'one'), (2, 'two')",
                &[],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let mut sources = SourceMap::new();
        sources.insert("my-db".to_string(), source);

        SqliteSqlConfig {
            source: "my-db".to_string(),
            description: "Rows by id".to_string(),
            statement: "SELECT name FROM {{ tableName }} WHERE id = ?1".to_string(),
            parameters: vec![Parameter::new("id", ParameterType::Integer, "Row id")],
            template_parameters: vec![Parameter::new("tableName", ParameterType::String, "")],
            auth_required: Vec::new(),
        }
        .initialize("by-id", &sources)
        .unwrap()
    }

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_split_arguments() {
        let tool = tool().await;
        let (args, template) =
            split_arguments(tool.as_ref(), body(json!({"id": 1, "tableName": "t"})));
        assert_eq!(Value::Object(args), json!({"id": 1}));
        assert_eq!(Value::Object(template), json!({"tableName": "t"}));
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let tool = tool().await;
        let (args, template) =
            split_arguments(tool.as_ref(), body(json!({"id": 2, "tableName": "t"})));
        let result = invoke(
            tool.as_ref(),
            &args,
            &template,
            &ClaimsMap::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(result, r#"[{"name":"two"}]"#);
    }

    #[tokio::test]
    async fn test_no_rows_is_null_string() {
        let tool = tool().await;
        let (args, template) =
            split_arguments(tool.as_ref(), body(json!({"id": 99, "tableName": "t"})));
        let result = invoke(
            tool.as_ref(),
            &args,
            &template,
            &ClaimsMap::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(result, "null");
    }

    #[tokio::test]
    async fn test_missing_parameter_is_validation_error() {
        let tool = tool().await;
        let (args, template) = split_arguments(tool.as_ref(), body(json!({"tableName": "t"})));
        let err = invoke(
            tool.as_ref(),
            &args,
            &template,
            &ClaimsMap::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            &err,
            InvokeError::Validation(ParameterError::Required(name)) if name == "id"
        ));
        assert_eq!(
            err.to_string(),
            "provided parameters were invalid: parameter \"id\" is required"
        );
    }

    #[tokio::test]
    async fn test_template_values_not_accepted_as_parameters() {
        let tool = tool().await;
        // passing the template value only as an ordinary argument still leaves
        // the template parameter unbound
        let err = invoke(
            tool.as_ref(),
            &body(json!({"id": 1, "tableName": "t"})),
            &Map::new(),
            &ClaimsMap::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            InvokeError::Validation(ParameterError::Required(name)) if name == "tableName"
        ));
    }

    #[tokio::test]
    async fn test_execution_failure_classified() {
        let tool = tool().await;
        let (args, template) =
            split_arguments(tool.as_ref(), body(json!({"id": 1, "tableName": "missing"})));
        let err = invoke(
            tool.as_ref(),
            &args,
            &template,
            &ClaimsMap::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, InvokeError::Execution(_)));
        assert!(err.to_string().contains("no such table"));
    }
}
