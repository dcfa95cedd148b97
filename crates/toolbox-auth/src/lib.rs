//! Authentication for toolbox.
//!
//! An auth service is a named token verifier. Tools list the services that
//! may authorize them in `authRequired`, and parameters may be filled from
//! the claims of a verified token. Callers present tokens per service; over
//! HTTP each one travels in a `<service>_token` header.

pub mod credentials;
pub mod error;
pub mod gate;
pub mod google;
pub mod jwt;

pub use credentials::{Credentials, TOKEN_HEADER_SUFFIX};
pub use error::{AuthError, AuthResult};
pub use gate::AuthGate;
pub use google::{GoogleAuthService, GoogleConfig, GOOGLE_AUTH_KIND};
pub use jwt::{JwtAuthService, JwtConfig, JWT_AUTH_KIND};

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Claims carried by a verified token.
pub type Claims = Map<String, Value>;

/// Verified claims keyed by the auth service that produced them.
pub type ClaimsMap = HashMap<String, Claims>;

/// A named token verifier.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Name of the service, unique within the server.
    fn name(&self) -> &str;

    /// Kind discriminator, e.g. `google`.
    fn kind(&self) -> &str;

    /// Verify a raw token and return its claims.
    async fn verify(&self, token: &str) -> AuthResult<Claims>;
}

/// A shared auth service handle.
pub type BoxedAuthService = Arc<dyn AuthService>;

/// Auth services keyed by name.
pub type AuthServiceMap = HashMap<String, BoxedAuthService>;

/// Configuration for one auth service kind.
#[async_trait]
pub trait AuthServiceConfig: Send + Sync + Debug {
    fn kind(&self) -> &str;

    /// Build the verifier. Receives only its own configuration.
    async fn initialize(&self, name: &str) -> AuthResult<BoxedAuthService>;
}

/// A boxed auth service configuration.
pub type BoxedAuthServiceConfig = Box<dyn AuthServiceConfig>;
