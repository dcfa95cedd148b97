//! Auth error types.

use thiserror::Error;

/// Result type for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors raised while configuring auth services or verifying tokens.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid auth service configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("unable to fetch signing keys: {0}")]
    KeyFetch(String),

    /// No required auth service accepted the caller's credentials.
    #[error("unauthorized Tool call: `authRequired` is set for the target Tool")]
    Unauthorized,

    #[error("token verification failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl AuthError {
    /// Create an invalid token error.
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken(message.into())
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::KeyFetch(err.to_string())
    }
}
