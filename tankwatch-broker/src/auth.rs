//! Credential provider for the telemetry broker.
//!
//! The broker authenticates connections with short-lived bearer tokens
//! obtained from an OAuth-style endpoint using static client credentials.
//! Tokens are cached against their reported expiry; the session layer asks
//! for a fresh one on every reconnect regardless.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::AuthError;

/// Assumed token lifetime when the provider omits `expires_in`.
const DEFAULT_TTL: Duration = Duration::from_secs(7200);

/// Obtains and refreshes bearer credentials for the broker connection.
#[derive(Debug)]
pub struct CredentialProvider {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    safety_margin: Duration,
    cached: Mutex<Option<CachedToken>>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Wire shape of the token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl CredentialProvider {
    /// Create a new builder for configuring the provider.
    pub fn builder() -> CredentialProviderBuilder {
        CredentialProviderBuilder::default()
    }

    /// Return a usable bearer token, exchanging credentials if the cached one
    /// is absent or inside the safety margin of its expiry.
    pub async fn token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if cache_usable(entry.expires_at, self.safety_margin, Instant::now()) {
                return Ok(entry.token.clone());
            }
        }

        let fresh = self.exchange().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    /// Exchange for a brand-new token, bypassing the cache.
    ///
    /// Used on every reconnect attempt so the broker always sees a fresh
    /// credential.
    pub async fn fresh_token(&self) -> Result<String, AuthError> {
        let fresh = self.exchange().await?;
        let token = fresh.token.clone();
        *self.cached.lock().await = Some(fresh);
        Ok(token)
    }

    async fn exchange(&self) -> Result<CachedToken, AuthError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::Status(response.status()));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        let token = match body.access_token {
            Some(t) if !t.is_empty() => t,
            _ => return Err(AuthError::MissingToken),
        };

        let ttl = body.expires_in.map(Duration::from_secs).unwrap_or(DEFAULT_TTL);
        debug!(ttl_secs = ttl.as_secs(), "obtained fresh broker credential");

        Ok(CachedToken {
            token,
            expires_at: Instant::now() + ttl,
        })
    }
}

/// A cached token is usable while now is still a safety margin short of its
/// expiry.
fn cache_usable(expires_at: Instant, safety_margin: Duration, now: Instant) -> bool {
    now + safety_margin < expires_at
}

/// Builder for [`CredentialProvider`].
#[derive(Debug, Default)]
pub struct CredentialProviderBuilder {
    token_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    safety_margin: Option<Duration>,
    timeout: Option<Duration>,
}

impl CredentialProviderBuilder {
    /// Set the token endpoint URL.
    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    /// Set the static client credentials used for the exchange.
    pub fn credentials(mut self, id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self.client_secret = Some(secret.into());
        self
    }

    /// Set how long before expiry a cached token stops being used
    /// (default: 5 minutes).
    pub fn safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = Some(margin);
        self
    }

    /// Set the request timeout for the exchange (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the provider.
    pub fn build(self) -> CredentialProvider {
        let timeout = self.timeout.unwrap_or(Duration::from_secs(10));

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        CredentialProvider {
            client,
            token_url: self
                .token_url
                .unwrap_or_else(|| "http://localhost:8080/oauth/token".to_string()),
            client_id: self.client_id.unwrap_or_default(),
            client_secret: self.client_secret.unwrap_or_default(),
            safety_margin: self.safety_margin.unwrap_or(Duration::from_secs(300)),
            cached: Mutex::new(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let provider = CredentialProvider::builder().build();
        assert_eq!(provider.token_url, "http://localhost:8080/oauth/token");
        assert_eq!(provider.safety_margin, Duration::from_secs(300));
    }

    #[test]
    fn builder_custom() {
        let provider = CredentialProvider::builder()
            .token_url("https://auth.example.com/token")
            .credentials("dashboard", "s3cret")
            .safety_margin(Duration::from_secs(60))
            .build();

        assert_eq!(provider.token_url, "https://auth.example.com/token");
        assert_eq!(provider.client_id, "dashboard");
        assert_eq!(provider.client_secret, "s3cret");
        assert_eq!(provider.safety_margin, Duration::from_secs(60));
    }

    #[test]
    fn cache_usable_outside_margin() {
        let now = Instant::now();
        let margin = Duration::from_secs(300);
        assert!(cache_usable(now + Duration::from_secs(600), margin, now));
    }

    #[test]
    fn cache_not_usable_inside_margin() {
        let now = Instant::now();
        let margin = Duration::from_secs(300);
        assert!(!cache_usable(now + Duration::from_secs(200), margin, now));
    }

    #[test]
    fn cache_not_usable_when_expired() {
        let now = Instant::now();
        let margin = Duration::from_secs(300);
        assert!(!cache_usable(now, margin, now));
    }

    #[test]
    fn token_response_parses_without_ttl() {
        let body: TokenResponse =
            serde_json::from_str(r#"{ "access_token": "abc" }"#).unwrap();
        assert_eq!(body.access_token.as_deref(), Some("abc"));
        assert!(body.expires_in.is_none());
    }

    #[test]
    fn token_response_parses_ttl() {
        let body: TokenResponse =
            serde_json::from_str(r#"{ "access_token": "abc", "expires_in": 3600 }"#).unwrap();
        assert_eq!(body.expires_in, Some(3600));
    }

    #[tokio::test]
    async fn exchange_against_unreachable_endpoint_fails() {
        let provider = CredentialProvider::builder()
            .token_url("http://127.0.0.1:1/token")
            .credentials("id", "secret")
            .timeout(Duration::from_millis(200))
            .build();

        let err = provider.token().await.unwrap_err();
        assert!(matches!(err, AuthError::Exchange(_) | AuthError::Timeout));
    }
}
