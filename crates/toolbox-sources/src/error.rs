//! Source error types.

use thiserror::Error;

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors that can occur while opening or using a source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source configuration is unusable.
    #[error("invalid source configuration: {0}")]
    InvalidConfig(String),

    /// Connecting to the backend failed.
    #[error("unable to connect: {0}")]
    Connection(String),

    /// The statement failed while executing.
    #[error("{0}")]
    Execution(String),

    /// The source was closed at shutdown.
    #[error("source {0:?} is closed")]
    Closed(String),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// SQLite driver error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl SourceError {
    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create an execution error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            (
                SourceError::InvalidConfig("missing database".to_string()),
                "invalid source configuration: missing database",
            ),
            (
                SourceError::connection("refused"),
                "unable to connect: refused",
            ),
            (SourceError::execution("no such table: t"), "no such table: t"),
            (
                SourceError::Closed("my-db".to_string()),
                "source \"my-db\" is closed",
            ),
            (SourceError::Cancelled, "operation cancelled"),
        ];

        for (error, expected) in errors {
            assert_eq!(error.to_string(), expected);
        }
    }
}
