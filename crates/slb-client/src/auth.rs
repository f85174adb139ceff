//! Bearer token sources for the SLB API
//!
//! Every SLB request carries a bearer token. Tokens come either from
//! configuration ([`StaticToken`]) or from an OAuth2 token exchange against
//! the identity provider ([`KeycloakTokenSource`]), which caches the token and
//! refreshes it shortly before it expires.

use crate::error::SlbError;
use crate::models::TokenResponse;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use std::future::Future;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Grant type for the token exchange flow
pub const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";

/// Lifetime assumed when the identity provider omits `expires_in`
const DEFAULT_TOKEN_TTL_SECS: i64 = 300;

/// A token is refreshed once it is this close to expiry
const REFRESH_SKEW_SECS: i64 = 30;

/// Source of bearer tokens for SLB requests
///
/// Implementations must be safe to call from concurrent reconciliations.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    /// Return a token valid for at least the next request
    async fn token(&self) -> Result<String, SlbError>;

    /// Drop any cached token after the API rejected it
    async fn invalidate(&self) {}
}

/// Pre-issued token taken from configuration
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wrap a pre-issued token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

#[async_trait::async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String, SlbError> {
        if self.0.is_empty() {
            return Err(SlbError::Authentication("static token is empty".to_string()));
        }
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - ChronoDuration::seconds(REFRESH_SKEW_SECS) > now
    }
}

/// Expiry-driven token cache
///
/// Readers share the cached value under a read lock. A refresh takes the
/// write lock and re-checks freshness, so concurrent callers that all observe
/// an expired token trigger a single fetch.
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached token, or fetch and store a new one.
    ///
    /// `fetch` resolves to the token and its lifetime in seconds.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<String, SlbError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(String, i64), SlbError>>,
    {
        if let Some(cached) = self.slot.read().await.as_ref() {
            if cached.is_fresh(Utc::now()) {
                return Ok(cached.value.clone());
            }
        }

        let mut slot = self.slot.write().await;
        if let Some(cached) = slot.as_ref() {
            if cached.is_fresh(Utc::now()) {
                return Ok(cached.value.clone());
            }
        }

        let (value, ttl_secs) = fetch().await?;
        *slot = Some(CachedToken {
            value: value.clone(),
            expires_at: Utc::now() + ChronoDuration::seconds(ttl_secs),
        });
        Ok(value)
    }

    /// Drop the cached token so the next call fetches a fresh one
    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }
}

/// Token exchange against a Keycloak-compatible identity provider
pub struct KeycloakTokenSource {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    requested_subject: String,
    cache: TokenCache,
}

impl std::fmt::Debug for KeycloakTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeycloakTokenSource")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("requested_subject", &self.requested_subject)
            .finish_non_exhaustive()
    }
}

impl KeycloakTokenSource {
    /// Create a token source
    ///
    /// # Arguments
    /// * `client` - HTTP client used for the exchange
    /// * `token_url` - Full URL of the identity provider token endpoint
    /// * `client_id` / `client_secret` - Client credentials
    /// * `requested_subject` - User the token is issued for
    pub fn new(
        client: Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        requested_subject: impl Into<String>,
    ) -> Self {
        Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            requested_subject: requested_subject.into(),
            cache: TokenCache::new(),
        }
    }

    async fn exchange(&self) -> Result<(String, i64), SlbError> {
        debug!("Exchanging client credentials for a bearer token at {}", self.token_url);

        let form = [
            ("grant_type", TOKEN_EXCHANGE_GRANT),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("requested_subject", self.requested_subject.as_str()),
        ];

        let response = self.client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SlbError::Authentication(format!(
                "token exchange failed: {} - {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await?;
        if token.access_token.is_empty() {
            return Err(SlbError::Authentication(
                "identity provider returned an empty access token".to_string(),
            ));
        }

        let ttl = token.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        info!("Obtained SLB bearer token (expires in {}s)", ttl);
        Ok((token.access_token, ttl))
    }
}

#[async_trait::async_trait]
impl TokenSource for KeycloakTokenSource {
    async fn token(&self) -> Result<String, SlbError> {
        self.cache.get_or_refresh(|| self.exchange()).await
    }

    async fn invalidate(&self) {
        debug!("Dropping cached SLB bearer token");
        self.cache.invalidate().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_cache_reuses_fresh_token() {
        let cache = TokenCache::new();
        let fetches = AtomicUsize::new(0);

        for _ in 0..3 {
            let token = cache
                .get_or_refresh(|| async {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(("token-a".to_string(), 3600))
                })
                .await
                .unwrap();
            assert_eq!(token, "token-a");
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_refreshes_token_inside_skew_window() {
        let cache = TokenCache::new();
        let fetches = AtomicUsize::new(0);

        // Lifetime shorter than the skew window is stale immediately
        for expected in ["token-1", "token-2"] {
            let token = cache
                .get_or_refresh(|| async {
                    let n = fetches.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok((format!("token-{}", n), REFRESH_SKEW_SECS - 1))
                })
                .await
                .unwrap();
            assert_eq!(token, expected);
        }
    }

    #[tokio::test]
    async fn test_cache_does_not_store_failures() {
        let cache = TokenCache::new();

        let failed = cache
            .get_or_refresh(|| async { Err(SlbError::Authentication("denied".to_string())) })
            .await;
        assert!(matches!(failed, Err(SlbError::Authentication(_))));

        let token = cache
            .get_or_refresh(|| async { Ok(("token-b".to_string(), 3600)) })
            .await
            .unwrap();
        assert_eq!(token, "token-b");
    }

    #[tokio::test]
    async fn test_concurrent_readers_share_one_exchange() {
        let cache = Arc::new(TokenCache::new());
        let fetches = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let fetches = Arc::clone(&fetches);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_refresh(|| async move {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        Ok(("shared".to_string(), 3600))
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "shared");
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_static_token_rejects_empty_value() {
        assert!(StaticToken::new("").token().await.is_err());
        assert_eq!(StaticToken::new("abc").token().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_keycloak_exchange_posts_client_credentials() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/realms/picp/protocol/openid-connect/token"))
            .and(body_string_contains("requested_subject=cluster-admin"))
            .and(body_string_contains("client_id=slb-controller"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "exchanged-token",
                "expires_in": 600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = KeycloakTokenSource::new(
            Client::new(),
            format!("{}/auth/realms/picp/protocol/openid-connect/token", server.uri()),
            "slb-controller",
            "s3cr3t",
            "cluster-admin",
        );

        assert_eq!(source.token().await.unwrap(), "exchanged-token");
        // Served from cache; the mock expects exactly one exchange
        assert_eq!(source.token().await.unwrap(), "exchanged-token");
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_exchange() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "rotated",
                "expires_in": 3600
            })))
            .expect(2)
            .mount(&server)
            .await;

        let source =
            KeycloakTokenSource::new(Client::new(), server.uri(), "id", "secret", "subject");

        assert_eq!(source.token().await.unwrap(), "rotated");
        source.invalidate().await;
        assert_eq!(source.token().await.unwrap(), "rotated");
    }

    #[tokio::test]
    async fn test_keycloak_exchange_failure_is_authentication_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let source = KeycloakTokenSource::new(Client::new(), server.uri(), "id", "bad", "subject");

        assert!(matches!(source.token().await, Err(SlbError::Authentication(_))));
    }
}
