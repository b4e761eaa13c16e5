//! Cached access tokens with single-flight refresh.
//!
//! A [`TokenProvider`] owns the only copy of the current access token. The
//! cache sits behind an async mutex that stays locked for the duration of an
//! exchange, so callers arriving while a refresh is in flight wait for it and
//! then share its result instead of issuing their own token request.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Duration, Utc};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::flow::OAuthClient;
use crate::token::Token;

/// Default reserve kept before a token's expiry.
pub const DEFAULT_SAFETY_MARGIN_SECS: i64 = 60;

/// Hands out access tokens, exchanging client credentials only when needed.
#[derive(Debug)]
pub struct TokenProvider {
    client: OAuthClient,
    safety_margin: Duration,
    cached: Mutex<Option<Token>>,
    exchanges: AtomicU64,
}

impl TokenProvider {
    /// Creates a provider with the default safety margin.
    #[must_use]
    pub fn new(client: OAuthClient) -> Self {
        Self {
            client,
            safety_margin: Duration::seconds(DEFAULT_SAFETY_MARGIN_SECS),
            cached: Mutex::new(None),
            exchanges: AtomicU64::new(0),
        }
    }

    /// Returns a token valid for at least the safety margin.
    ///
    /// # Errors
    ///
    /// Returns an error if a fresh exchange was required and failed.
    pub async fn get_token(&self) -> Result<Token> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_fresh_at(Utc::now(), self.safety_margin) {
                return Ok(token.clone());
            }
            tracing::debug!(expires_at = %token.expires_at, "cached token is stale");
        }

        tracing::info!(token_url = %self.client.token_url, "requesting new access token");
        self.exchanges.fetch_add(1, Ordering::Relaxed);
        let token = self.client.exchange_client_credentials().await?;
        tracing::info!(expires_at = %token.expires_at, "obtained access token");

        *cached = Some(token.clone());
        Ok(token)
    }

    /// Drops `stale` from the cache after the server rejected it.
    ///
    /// A newer token that replaced `stale` in the meantime is kept.
    pub async fn invalidate(&self, stale: &Token) {
        let mut cached = self.cached.lock().await;
        if cached
            .as_ref()
            .is_some_and(|t| t.access_token == stale.access_token)
        {
            tracing::warn!("access token rejected, invalidating cache");
            *cached = None;
        }
    }

    /// Number of credential exchanges performed so far.
    #[must_use]
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> TokenProvider {
        let url = Url::parse(&format!("{}/accessTokens", server.uri())).unwrap();
        let client = OAuthClient::new("id", "secret", url)
            .with_retry(1, std::time::Duration::from_millis(1));
        TokenProvider::new(client)
    }

    async fn mount_token(server: &MockServer, token: &str, expires_in: u64) {
        Mock::given(method("POST"))
            .and(path("/accessTokens"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": token,
                "expires_in": expires_in
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn reuses_token_within_validity_window() {
        let server = MockServer::start().await;
        mount_token(&server, "tok", 3600).await;
        let provider = provider_for(&server);

        let first = provider.get_token().await.unwrap();
        let second = provider.get_token().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.exchange_count(), 1);
    }

    #[tokio::test]
    async fn refreshes_token_inside_safety_margin() {
        let server = MockServer::start().await;
        mount_token(&server, "short", 30).await;
        let provider = provider_for(&server);

        provider.get_token().await.unwrap();
        provider.get_token().await.unwrap();

        assert_eq!(provider.exchange_count(), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_new_exchange() {
        let server = MockServer::start().await;
        mount_token(&server, "tok", 3600).await;
        let provider = provider_for(&server);

        let token = provider.get_token().await.unwrap();
        provider.invalidate(&token).await;
        provider.get_token().await.unwrap();

        assert_eq!(provider.exchange_count(), 2);
    }

    #[tokio::test]
    async fn invalidate_ignores_superseded_token() {
        let server = MockServer::start().await;
        mount_token(&server, "tok", 3600).await;
        let provider = provider_for(&server);
        provider.get_token().await.unwrap();

        let old = Token::new("older", Utc::now() + Duration::hours(1));
        provider.invalidate(&old).await;
        provider.get_token().await.unwrap();

        assert_eq!(provider.exchange_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accessTokens"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "shared", "expires_in": 3600}))
                    .set_delay(std::time::Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;
        let provider = Arc::new(provider_for(&server));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move { provider.get_token().await })
            })
            .collect();

        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token.access_token, "shared");
        }
        assert_eq!(provider.exchange_count(), 1);
    }

    #[tokio::test]
    async fn failed_exchange_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accessTokens"))
            .respond_with(ResponseTemplate::new(403).set_body_string("nope"))
            .mount(&server)
            .await;
        let provider = provider_for(&server);

        tokio_test::assert_err!(provider.get_token().await);
    }
}
