//! Shared-secret JWT auth service (`kind: jwt`).
//!
//! Verifies HS256 tokens signed with a configured secret. Useful for
//! deployments that mint their own tokens and for local testing.

use crate::{AuthError, AuthResult, AuthService, AuthServiceConfig, BoxedAuthService, Claims};
use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::sync::Arc;

pub const JWT_AUTH_KIND: &str = "jwt";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtConfig {
    pub secret: String,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
}

#[async_trait]
impl AuthServiceConfig for JwtConfig {
    fn kind(&self) -> &str {
        JWT_AUTH_KIND
    }

    async fn initialize(&self, name: &str) -> AuthResult<BoxedAuthService> {
        if self.secret.is_empty() {
            return Err(AuthError::InvalidConfig("`secret` must not be empty".to_string()));
        }
        Ok(Arc::new(JwtAuthService::new(name, self)))
    }
}

pub struct JwtAuthService {
    name: String,
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthService {
    pub fn new(name: &str, config: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            name: name.to_string(),
            key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl AuthService for JwtAuthService {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        JWT_AUTH_KIND
    }

    async fn verify(&self, token: &str) -> AuthResult<Claims> {
        let data = decode::<Claims>(token, &self.key, &self.validation)?;
        Ok(data.claims)
    }
}
