//! Caller-presented tokens.

use std::collections::HashMap;

/// Suffix of the HTTP header that carries a service's token.
pub const TOKEN_HEADER_SUFFIX: &str = "_token";

/// Raw tokens presented by a caller, keyed by auth service name.
///
/// Service names are matched case-insensitively since HTTP header names
/// carry no case.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    tokens: HashMap<String, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect tokens from `<service>_token` header pairs. Other headers are
    /// ignored.
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut credentials = Self::new();
        for (name, value) in headers {
            let lower = name.to_ascii_lowercase();
            if let Some(service) = lower.strip_suffix(TOKEN_HEADER_SUFFIX) {
                if !service.is_empty() {
                    credentials.insert(service, value.trim());
                }
            }
        }
        credentials
    }

    /// Builder form of [`Credentials::insert`].
    pub fn with_token(mut self, service: &str, token: impl Into<String>) -> Self {
        self.insert(service, token);
        self
    }

    pub fn insert(&mut self, service: &str, token: impl Into<String>) {
        self.tokens
            .insert(service.to_ascii_lowercase(), token.into());
    }

    /// Token presented for `service`, if any.
    pub fn token(&self, service: &str) -> Option<&str> {
        self.tokens
            .get(&service.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_headers_picks_token_headers() {
        let headers = vec![
            ("content-type", "application/json"),
            ("my-google-auth_token", "abc"),
            ("other_token", " def "),
            ("_token", "ignored"),
        ];
        let credentials = Credentials::from_headers(headers);

        assert_eq!(credentials.token("my-google-auth"), Some("abc"));
        assert_eq!(credentials.token("other"), Some("def"));
        assert_eq!(credentials.token("content-type"), None);
        assert_eq!(credentials.token(""), None);
    }

    #[test]
    fn test_service_lookup_ignores_case() {
        let credentials = Credentials::from_headers(vec![("My-Auth_Token", "t")]);
        assert_eq!(credentials.token("my-auth"), Some("t"));
        assert_eq!(credentials.token("MY-AUTH"), Some("t"));
    }

    #[test]
    fn test_empty_credentials() {
        let credentials = Credentials::new();
        assert!(credentials.is_empty());
        assert!(!credentials.with_token("svc", "t").is_empty());
    }
}
