//! Declared tool parameters and argument binding.

use crate::error::ParameterError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use toolbox_auth::ClaimsMap;

/// Semantic type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Integer,
    Float,
    Boolean,
    Array,
    Object,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Integer => "integer",
            ParameterType::Float => "float",
            ParameterType::Boolean => "boolean",
            ParameterType::Array => "array",
            ParameterType::Object => "object",
        }
    }

    /// JSON Schema type name used in MCP input schemas.
    pub fn schema_type(&self) -> &'static str {
        match self {
            ParameterType::Float => "number",
            other => other.as_str(),
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParameterType::String => value.is_string(),
            ParameterType::Integer => value.is_i64() || value.is_u64(),
            ParameterType::Float => value.is_number(),
            ParameterType::Boolean => value.is_boolean(),
            ParameterType::Array => value.is_array(),
            ParameterType::Object => value.is_object(),
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verified token claim that fills an authenticated parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamAuthService {
    /// Auth service name.
    pub name: String,
    /// Claim to read from the verified token.
    pub field: String,
}

/// A declared argument slot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub auth_services: Vec<ParamAuthService>,
    /// Item schema, required for arrays.
    #[serde(default)]
    pub items: Option<Box<Parameter>>,
    /// Value used when the argument is absent. Makes the parameter optional.
    #[serde(default)]
    pub default: Option<Value>,
}

impl Parameter {
    pub fn new(name: &str, kind: ParameterType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            auth_services: Vec::new(),
            items: None,
            default: None,
        }
    }

    pub fn with_items(mut self, items: Parameter) -> Self {
        self.items = Some(Box::new(items));
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_auth_service(mut self, name: &str, field: &str) -> Self {
        self.auth_services.push(ParamAuthService {
            name: name.to_string(),
            field: field.to_string(),
        });
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }

    /// Check the definition itself. Called once at tool construction.
    pub fn validate(&self) -> Result<(), ParameterError> {
        if self.name.is_empty() {
            return Err(ParameterError::invalid_definition(
                &self.name,
                "name must not be empty",
            ));
        }
        match (&self.kind, &self.items) {
            (ParameterType::Array, None) => {
                return Err(ParameterError::invalid_definition(
                    &self.name,
                    "array parameters must declare `items`",
                ))
            }
            (ParameterType::Array, Some(items)) => items.validate()?,
            (_, Some(_)) => {
                return Err(ParameterError::invalid_definition(
                    &self.name,
                    "only array parameters may declare `items`",
                ))
            }
            _ => {}
        }
        if let Some(default) = &self.default {
            self.parse(default).map_err(|e| {
                ParameterError::invalid_definition(&self.name, format!("bad default: {e}"))
            })?;
        }
        Ok(())
    }

    /// Type-check a value against this parameter.
    pub fn parse(&self, value: &Value) -> Result<Value, ParameterError> {
        if !self.kind.accepts(value) {
            return Err(ParameterError::parse(
                &self.name,
                format!("expected {}, got {}", self.kind, json_type(value)),
            ));
        }
        if let (Value::Array(values), Some(items)) = (value, &self.items) {
            for (i, item) in values.iter().enumerate() {
                if !items.kind.accepts(item) {
                    return Err(ParameterError::parse(
                        &self.name,
                        format!(
                            "item {i}: expected {}, got {}",
                            items.kind,
                            json_type(item)
                        ),
                    ));
                }
            }
        }
        Ok(value.clone())
    }

    pub fn manifest(&self) -> ParameterManifest {
        ParameterManifest {
            name: self.name.clone(),
            kind: self.kind.as_str().to_string(),
            description: self.description.clone(),
            auth_services: self.auth_services.iter().map(|a| a.name.clone()).collect(),
            items: self.items.as_ref().map(|i| Box::new(i.manifest())),
        }
    }

    /// JSON Schema fragment for MCP `inputSchema.properties`.
    pub fn mcp_schema(&self) -> Value {
        let mut schema = json!({
            "type": self.kind.schema_type(),
            "description": self.description,
        });
        if let Some(items) = &self.items {
            schema["items"] = items.mcp_schema();
        }
        if let Some(default) = &self.default {
            schema["default"] = default.clone();
        }
        schema
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parameter as advertised by the HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterManifest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub auth_services: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ParameterManifest>>,
}

/// Bound argument values in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamValues(Vec<(String, Value)>);

impl ParamValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.0.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Values only, for positional binding.
    pub fn values(&self) -> Vec<Value> {
        self.0.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn to_map(&self) -> Map<String, Value> {
        self.0.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Bind request arguments and verified claims to declared parameters.
///
/// Authenticated parameters ignore `args` and read from `claims`; the first
/// listed service holding the claim wins. Absent or null arguments fall back
/// to the parameter's default.
pub fn parse_params(
    params: &[Parameter],
    args: &Map<String, Value>,
    claims: &ClaimsMap,
) -> Result<ParamValues, ParameterError> {
    let mut values = ParamValues::new();
    for param in params {
        let raw = if param.auth_services.is_empty() {
            match args.get(&param.name).filter(|v| !v.is_null()) {
                Some(value) => value.clone(),
                None => param
                    .default
                    .clone()
                    .ok_or_else(|| ParameterError::Required(param.name.clone()))?,
            }
        } else {
            param
                .auth_services
                .iter()
                .find_map(|svc| claims.get(&svc.name).and_then(|c| c.get(&svc.field)))
                .cloned()
                .ok_or_else(|| ParameterError::MissingAuth(param.name.clone()))?
        };
        values.push(param.name.clone(), param.parse(&raw)?);
    }
    Ok(values)
}
