use crate::config::AuthConfig;
use crate::error::GatewayError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use std::time::{Duration, Instant};

/// Refresh this long before the token actually expires.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Source of a valid bearer token for CRM requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a full `Authorization` header value, e.g. "Bearer abc123".
    async fn bearer_token(&self) -> Result<String, GatewayError>;
}

/// Fixed token, for tests and local runs against a stub CRM.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        StaticTokenProvider {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> Result<String, GatewayError> {
        Ok(self.token.clone())
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// OAuth2 client-credentials provider with an in-process cache.
///
/// A token is fetched lazily on first use and reused until shortly before
/// its expiry. Fetch failures propagate as fatal; there is no retry here
/// because the caller's own retry/redelivery policy governs that.
pub struct OAuthTokenProvider {
    config: AuthConfig,
    client: reqwest::Client,
    cached: RwLock<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    token_type: String,
    access_token: String,
    expires_in: u64,
}

impl OAuthTokenProvider {
    pub fn new(config: AuthConfig) -> Self {
        OAuthTokenProvider {
            config,
            client: reqwest::Client::new(),
            cached: RwLock::new(None),
        }
    }

    fn cached_token(&self) -> Option<String> {
        let guard = self.cached.read();
        guard
            .as_ref()
            .filter(|token| token.expires_at > Instant::now())
            .map(|token| token.value.clone())
    }

    async fn fetch_token(&self) -> Result<CachedToken, GatewayError> {
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "client_credentials"),
            ("scope", self.config.scope.as_str()),
        ];

        let response = self
            .client
            .post(self.config.token_endpoint.clone())
            .form(&form)
            .send()
            .await
            .map_err(|err| GatewayError::Auth(format!("unable to reach token endpoint: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Auth(format!("auth failed: {status} - {body}")));
        }

        let payload = response
            .json::<TokenResponse>()
            .await
            .map_err(|err| GatewayError::Auth(format!("malformed token response: {err}")))?;

        let lifetime = Duration::from_secs(payload.expires_in);
        Ok(CachedToken {
            value: format!("{} {}", payload.token_type, payload.access_token),
            expires_at: Instant::now() + lifetime.saturating_sub(EXPIRY_SKEW),
        })
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    async fn bearer_token(&self) -> Result<String, GatewayError> {
        if let Some(token) = self.cached_token() {
            return Ok(token);
        }

        let fresh = self.fetch_token().await?;
        let value = fresh.value.clone();
        *self.cached.write() = Some(fresh);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn auth_config(server: &MockServer) -> AuthConfig {
        AuthConfig {
            token_endpoint: Url::parse(&format!("{}/oauth2/token", server.uri())).unwrap(),
            client_id: "client-1".into(),
            client_secret: "shhh".into(),
            scope: "crm.default".into(),
        }
    }

    #[tokio::test]
    async fn fetches_and_caches_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=client-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"token_type":"Bearer","access_token":"abc123","expires_in":3600}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OAuthTokenProvider::new(auth_config(&server));

        let first = provider.bearer_token().await.unwrap();
        assert_eq!(first, "Bearer abc123");

        // Second call is served from the cache; the mock's expect(1) would
        // fail the test on a second fetch.
        let second = provider.bearer_token().await.unwrap();
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn short_lived_token_is_not_cached() {
        let server = MockServer::start().await;

        // expires_in below the refresh skew: every call refetches
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"token_type":"Bearer","access_token":"abc123","expires_in":5}"#,
            ))
            .expect(2)
            .mount(&server)
            .await;

        let provider = OAuthTokenProvider::new(auth_config(&server));
        provider.bearer_token().await.unwrap();
        provider.bearer_token().await.unwrap();
    }

    #[tokio::test]
    async fn error_status_is_fatal() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad client"))
            .mount(&server)
            .await;

        let provider = OAuthTokenProvider::new(auth_config(&server));
        let err = provider.bearer_token().await.unwrap_err();
        assert!(matches!(err, GatewayError::Auth(message) if message.contains("401")));
    }
}
