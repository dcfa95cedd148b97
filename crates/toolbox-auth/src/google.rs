//! Google Sign-In auth service (`kind: google`).
//!
//! Verifies RS256 ID tokens issued by Google for a configured OAuth client
//! id. Signing keys are fetched from the JWKS endpoint and cached by `kid`.
//! An unknown `kid` triggers a refresh before the token is rejected, at most
//! once per refresh interval no matter how many callers miss concurrently.

use crate::{AuthError, AuthResult, AuthService, AuthServiceConfig, BoxedAuthService, Claims};
use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub const GOOGLE_AUTH_KIND: &str = "google";

/// Google's published signing keys.
pub const GOOGLE_JWKS_URI: &str = "https://www.googleapis.com/oauth2/v3/certs";

const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Minimum time between two JWKS fetches.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleConfig {
    /// OAuth client id the token audience must match.
    pub client_id: String,
    /// Override for the JWKS endpoint.
    #[serde(default)]
    pub jwks_uri: Option<String>,
}

#[async_trait]
impl AuthServiceConfig for GoogleConfig {
    fn kind(&self) -> &str {
        GOOGLE_AUTH_KIND
    }

    async fn initialize(&self, name: &str) -> AuthResult<BoxedAuthService> {
        if self.client_id.is_empty() {
            return Err(AuthError::InvalidConfig(
                "`clientId` must not be empty".to_string(),
            ));
        }
        let jwks_uri = self
            .jwks_uri
            .clone()
            .unwrap_or_else(|| GOOGLE_JWKS_URI.to_string());
        Ok(Arc::new(GoogleAuthService::new(
            name,
            &self.client_id,
            jwks_uri,
        )?))
    }
}

/// Cached signing keys and the time of the last fetch attempt.
struct KeyCache {
    set: JwkSet,
    fetched_at: Option<Instant>,
}

impl KeyCache {
    fn fetched_within(&self, interval: Duration) -> bool {
        self.fetched_at.is_some_and(|at| at.elapsed() < interval)
    }
}

pub struct GoogleAuthService {
    name: String,
    client_id: String,
    jwks_uri: String,
    http: reqwest::Client,
    refresh_interval: Duration,
    keys: RwLock<KeyCache>,
}

impl GoogleAuthService {
    pub fn new(name: &str, client_id: &str, jwks_uri: String) -> AuthResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| AuthError::InvalidConfig(format!("unable to build http client: {e}")))?;

        Ok(Self {
            name: name.to_string(),
            client_id: client_id.to_string(),
            jwks_uri,
            http,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            keys: RwLock::new(KeyCache {
                set: JwkSet { keys: Vec::new() },
                fetched_at: None,
            }),
        })
    }

    /// Override the minimum time between JWKS fetches.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    async fn signing_key(&self, kid: &str) -> AuthResult<Jwk> {
        if let Some(key) = self.keys.read().await.set.find(kid) {
            return Ok(key.clone());
        }

        // Held across the fetch so concurrent misses share one request.
        let mut cache = self.keys.write().await;
        if let Some(key) = cache.set.find(kid) {
            return Ok(key.clone());
        }
        if cache.fetched_within(self.refresh_interval) {
            warn!(service = %self.name, kid = %kid, "Unknown kid, key refresh throttled");
            return Err(unknown_kid(kid));
        }

        cache.fetched_at = Some(Instant::now());
        cache.set = self.fetch_keys().await?;
        cache.set.find(kid).cloned().ok_or_else(|| unknown_kid(kid))
    }

    async fn fetch_keys(&self) -> AuthResult<JwkSet> {
        debug!(service = %self.name, uri = %self.jwks_uri, "Fetching signing keys");
        let set = self
            .http
            .get(&self.jwks_uri)
            .send()
            .await?
            .error_for_status()?
            .json::<JwkSet>()
            .await?;
        Ok(set)
    }
}

fn unknown_kid(kid: &str) -> AuthError {
    AuthError::invalid_token(format!("no signing key matches kid {kid:?}"))
}

#[async_trait]
impl AuthService for GoogleAuthService {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        GOOGLE_AUTH_KIND
    }

    async fn verify(&self, token: &str) -> AuthResult<Claims> {
        let header = decode_header(token)?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::invalid_token("token header has no `kid`"))?;
        let jwk = self.signing_key(&kid).await?;
        let key = DecodingKey::from_jwk(&jwk)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.client_id]);
        validation.set_issuer(&GOOGLE_ISSUERS);

        let data = decode::<Claims>(token, &key, &validation)?;
        Ok(data.claims)
    }
}
