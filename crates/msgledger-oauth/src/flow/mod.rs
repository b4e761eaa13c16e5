//! `OAuth2` client-credentials grant.

use crate::error::{Error, Result};
use crate::token::{ErrorResponse, Token, TokenResponse};
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Common `OAuth2` client configuration for the client-credentials grant.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// Client ID from provider.
    pub client_id: String,
    /// Client secret.
    client_secret: String,
    /// Token endpoint.
    pub token_url: Url,
    /// Requested scope.
    pub scope: Option<String>,
    /// Attempts per exchange, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub initial_backoff: Duration,
    /// HTTP client.
    http_client: Client,
}

impl OAuthClient {
    /// Creates a new OAuth client for `token_url`.
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>, token_url: Url) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url,
            scope: Some("general".to_string()),
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            http_client: Client::new(),
        }
    }

    /// Sets the requested scope (`None` omits the parameter).
    #[must_use]
    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope;
        self
    }

    /// Sets retry behaviour for transient failures.
    #[must_use]
    pub fn with_retry(mut self, max_attempts: u32, initial_backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.initial_backoff = initial_backoff;
        self
    }

    /// Uses a preconfigured HTTP client (timeouts, proxies).
    #[must_use]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    /// Exchanges the client credentials for an access token.
    ///
    /// Connection failures, timeouts and 5xx/429 answers are retried with
    /// exponential backoff; anything else fails on the first attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the credentials, the response
    /// is malformed, or every attempt failed transiently.
    pub async fn exchange_client_credentials(&self) -> Result<Token> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.request_token().await {
                Ok(token) => return Ok(token),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let wait = backoff(self.initial_backoff, attempt);
                    tracing::warn!(
                        attempt,
                        wait_ms = wait.as_millis(),
                        error = %e,
                        "token exchange failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) if e.is_transient() => {
                    return Err(Error::RetriesExhausted {
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_token(&self) -> Result<Token> {
        let mut params = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        if let Some(scope) = &self.scope {
            params.push(("scope", scope.as_str()));
        }

        let issued_at = Utc::now();
        let response = self
            .http_client
            .post(self.token_url.clone())
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.is_client_error() {
                if let Ok(error) = serde_json::from_str::<ErrorResponse>(&body) {
                    return Err(error.into_error());
                }
            }
            return Err(Error::Status {
                status: status.as_u16(),
                body: truncate(&body, 512),
            });
        }

        let token_response: TokenResponse = response.json().await?;
        Token::from_response(token_response, issued_at)
    }
}

fn backoff(initial: Duration, attempt: u32) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(5);
    (initial * factor).min(Duration::from_secs(30))
}

fn truncate(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OAuthClient {
        let url = Url::parse(&format!("{}/accessTokens", server.uri())).unwrap();
        OAuthClient::new("id-1", "secret-1", url).with_retry(3, Duration::from_millis(1))
    }

    #[test]
    fn test_oauth_client_creation() {
        let url = Url::parse("https://api.example.com/v1/accessTokens").unwrap();
        let client = OAuthClient::new("client", "secret", url);
        assert_eq!(client.client_id, "client");
        assert_eq!(client.scope.as_deref(), Some("general"));
        assert_eq!(client.max_attempts, 3);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let base = Duration::from_secs(2);
        assert_eq!(backoff(base, 1), Duration::from_secs(2));
        assert_eq!(backoff(base, 2), Duration::from_secs(4));
        assert_eq!(backoff(base, 3), Duration::from_secs(8));
        assert_eq!(backoff(base, 10), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn exchange_sends_client_credentials_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accessTokens"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=id-1"))
            .and(body_string_contains("client_secret=secret-1"))
            .and(body_string_contains("scope=general"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "Bearer",
                "expires_in": 3600,
                "access_token": "tok-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = client_for(&server).exchange_client_credentials().await.unwrap();
        assert_eq!(token.access_token, "tok-1");
        assert!(!token.is_expired());
    }

    #[tokio::test]
    async fn exchange_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accessTokens"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/accessTokens"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "tok-2", "expires_in": 60})),
            )
            .mount(&server)
            .await;

        let token = client_for(&server).exchange_client_credentials().await.unwrap();
        assert_eq!(token.access_token, "tok-2");
    }

    #[tokio::test]
    async fn exchange_fails_fast_on_bad_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accessTokens"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "invalid_client",
                "error_description": "Client authentication failed"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .exchange_client_credentials()
            .await
            .unwrap_err();
        match err {
            Error::OAuth { error, .. } => assert_eq!(error, "invalid_client"),
            other => panic!("expected OAuth error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn exchange_gives_up_after_max_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accessTokens"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .expect(3)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .exchange_client_credentials()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RetriesExhausted { attempts: 3, .. }));
    }
}
