//! The authorization gate applied before every tool invocation.

use crate::{AuthError, AuthResult, AuthServiceMap, ClaimsMap, Credentials};
use tracing::{debug, warn};

/// Checks a caller's credentials against a tool's auth requirements.
pub struct AuthGate<'a> {
    services: &'a AuthServiceMap,
}

impl<'a> AuthGate<'a> {
    pub fn new(services: &'a AuthServiceMap) -> Self {
        Self { services }
    }

    /// Verify `credentials` for a tool.
    ///
    /// When `required` is non-empty at least one listed service must accept
    /// its token; services are tried in order and the first success
    /// satisfies the requirement. Failures are logged and do not stop the
    /// scan. Services in `parameter_services` are verified opportunistically
    /// so that authenticated parameters can read their claims.
    ///
    /// Returns the claims of every service that verified successfully.
    pub async fn authorize(
        &self,
        tool: &str,
        required: &[String],
        parameter_services: &[String],
        credentials: &Credentials,
    ) -> AuthResult<ClaimsMap> {
        let mut claims = ClaimsMap::new();

        if !required.is_empty() {
            for name in required {
                if self.verify_into(name, credentials, &mut claims).await {
                    break;
                }
            }
            if claims.is_empty() {
                warn!(tool = %tool, required = ?required, "Tool call rejected by auth gate");
                return Err(AuthError::Unauthorized);
            }
        }

        for name in parameter_services {
            if !claims.contains_key(name) {
                self.verify_into(name, credentials, &mut claims).await;
            }
        }

        Ok(claims)
    }

    async fn verify_into(
        &self,
        name: &str,
        credentials: &Credentials,
        claims: &mut ClaimsMap,
    ) -> bool {
        let Some(service) = self.services.get(name) else {
            warn!(service = %name, "Auth service is not registered");
            return false;
        };
        let Some(token) = credentials.token(name) else {
            debug!(service = %name, "No token presented");
            return false;
        };
        match service.verify(token).await {
            Ok(verified) => {
                claims.insert(name.to_string(), verified);
                true
            }
            Err(e) => {
                warn!(service = %name, error = %e, "Token verification failed");
                false
            }
        }
    }
}
