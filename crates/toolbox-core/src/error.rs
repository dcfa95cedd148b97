//! Error types for the core crate.

use thiserror::Error;
use toolbox_auth::AuthError;
use toolbox_sources::SourceError;
use toolbox_tools::{InvokeError, ToolError};

/// Result type for tools file parsing.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for registry construction.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Tools file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid YAML syntax or shape.
    #[error("invalid tools file at {path}: {message}")]
    InvalidYaml { path: String, message: String },

    #[error("tools file not found: {path}")]
    NotFound { path: String },

    /// Environment variable not found during substitution.
    #[error("environment variable not found: {name}")]
    EnvVarNotFound { name: String },

    #[error("{component} {name:?} has no `kind`")]
    MissingKind {
        component: &'static str,
        name: String,
    },

    #[error("unknown {component} kind {kind:?} for {name:?}")]
    UnknownKind {
        component: &'static str,
        name: String,
        kind: String,
    },

    /// A component's fields did not match its kind.
    #[error("invalid {component} {name:?}: {message}")]
    InvalidComponent {
        component: &'static str,
        name: String,
        message: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Registry construction errors. Each names the failing component.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unable to initialize source {name:?}: {source}")]
    Source { name: String, source: SourceError },

    #[error("unable to initialize auth service {name:?}: {source}")]
    AuthService { name: String, source: AuthError },

    /// Token headers are case-insensitive, so these names would share one.
    #[error("auth service names {first:?} and {second:?} differ only by case")]
    AuthServiceCollision { first: String, second: String },

    #[error("unable to initialize tool {name:?}: {source}")]
    Tool { name: String, source: ToolError },

    #[error("unable to initialize tool {name:?}: no auth service named {service:?} configured")]
    UnknownAuthService { name: String, service: String },

    #[error("unable to initialize toolset {name:?}: {source}")]
    Toolset { name: String, source: ToolError },
}

/// Failure of a tool call, classified for transports.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("invalid tool name: tool with name {0:?} does not exist")]
    ToolNotFound(String),

    #[error(transparent)]
    Unauthorized(AuthError),

    #[error(transparent)]
    Invoke(InvokeError),
}

impl CallError {
    /// Whether the call was refused for lack of valid credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            CallError::Unauthorized(_) | CallError::Invoke(InvokeError::Unauthenticated(_))
        )
    }

    pub fn is_validation_failure(&self) -> bool {
        matches!(self, CallError::Invoke(InvokeError::Validation(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_names_component() {
        let err = RegistryError::Tool {
            name: "get-user".to_string(),
            source: ToolError::SourceNotFound("my-db".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "unable to initialize tool \"get-user\": no source named \"my-db\" configured"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_tool_not_found_message() {
        assert_eq!(
            CallError::ToolNotFound("foo".to_string()).to_string(),
            "invalid tool name: tool with name \"foo\" does not exist"
        );
    }

    #[test]
    fn test_classification() {
        assert!(CallError::Unauthorized(AuthError::Unauthorized).is_auth_failure());
        assert!(!CallError::ToolNotFound("x".to_string()).is_auth_failure());
    }
}
