//! Tool error types.

use thiserror::Error;
use toolbox_sources::SourceError;

/// Result type for tool construction and execution.
pub type ToolResult<T> = Result<T, ToolError>;

/// Result type for the invocation pipeline.
pub type InvokeResult<T> = Result<T, InvokeError>;

/// Errors binding request values to declared parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("parameter {0:?} is required")]
    Required(String),

    #[error("unable to parse value for {name:?}: {reason}")]
    Parse { name: String, reason: String },

    /// An authenticated parameter found no verified claim to read from.
    #[error("missing or invalid authentication header")]
    MissingAuth(String),

    #[error("invalid definition for parameter {name:?}: {reason}")]
    InvalidDefinition { name: String, reason: String },
}

impl ParameterError {
    pub fn parse(name: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_definition(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors constructing or executing a tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid tool configuration: {0}")]
    InvalidConfig(String),

    #[error("no source named {0:?} configured")]
    SourceNotFound(String),

    #[error("invalid source for {kind:?} tool: source kind must be one of {compatible:?}")]
    IncompatibleSource {
        kind: String,
        compatible: Vec<String>,
    },

    #[error("no tool named {0:?} configured")]
    ToolNotFound(String),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error("unable to render statement: {0}")]
    Template(#[from] minijinja::Error),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("unable to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Classified outcome of a failed invocation.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The arguments did not satisfy the declared parameters.
    #[error("provided parameters were invalid: {0}")]
    Validation(ParameterError),

    /// An authenticated parameter could not be filled.
    #[error("{0}")]
    Unauthenticated(ParameterError),

    /// The bound source failed.
    #[error("error while invoking tool: {0}")]
    Execution(#[source] ToolError),
}

impl From<ParameterError> for InvokeError {
    fn from(err: ParameterError) -> Self {
        match err {
            ParameterError::MissingAuth(_) => Self::Unauthenticated(err),
            other => Self::Validation(other),
        }
    }
}
