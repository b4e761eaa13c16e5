//! `OAuth2` token types.

use crate::error::Error;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifetime assumed when the token endpoint omits `expires_in` (about six months).
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 15_897_600;

/// `OAuth2` access token with its expiry.
///
/// Tokens live only in memory; nothing in this crate persists them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Access token string.
    pub access_token: String,
    /// Token type (usually "Bearer").
    pub token_type: String,
    /// Expiration time.
    pub expires_at: DateTime<Utc>,
    /// Scope granted by authorization server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Token {
    /// Creates a new bearer token expiring at `expires_at`.
    #[must_use]
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            expires_at,
            scope: None,
        }
    }

    /// Creates a token from a token response received at `issued_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the response carries an empty access token.
    pub fn from_response(response: TokenResponse, issued_at: DateTime<Utc>) -> Result<Self, Error> {
        if response.access_token.trim().is_empty() {
            return Err(Error::InvalidResponse("empty access_token".to_string()));
        }

        let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let expires_in = i64::try_from(expires_in).unwrap_or(i64::MAX);
        let expires_at = Duration::try_seconds(expires_in)
            .and_then(|d| issued_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Ok(Self {
            access_token: response.access_token,
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_at,
            scope: response.scope,
        })
    }

    /// Checks if the token is usable at `now`, keeping `margin` in reserve.
    #[must_use]
    pub fn is_fresh_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin < self.expires_at
    }

    /// Checks if the token is expired (with 60 second buffer).
    #[must_use]
    pub fn is_expired(&self) -> bool {
        !self.is_fresh_at(Utc::now(), Duration::seconds(60))
    }

    /// Value for an `Authorization` header.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// Token response from `OAuth2` server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Token type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Expires in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Error response from `OAuth2` server.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub error: String,
    /// Error description.
    #[serde(default)]
    pub error_description: String,
}

impl ErrorResponse {
    /// Converts to an Error.
    #[must_use]
    pub fn into_error(self) -> Error {
        Error::oauth_error(self.error, self.error_description)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_token_creation() {
        let expires = Utc::now() + Duration::hours(1);
        let token = Token::new("access123", expires);
        assert_eq!(token.access_token, "access123");
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.authorization_header(), "Bearer access123");
        assert!(token.scope.is_none());
    }

    #[test]
    fn test_token_expiration() {
        let expired = Token::new("a", Utc::now() - Duration::seconds(120));
        assert!(expired.is_expired());

        let valid = Token::new("a", Utc::now() + Duration::seconds(3600));
        assert!(!valid.is_expired());
    }

    #[test]
    fn test_margin_is_respected() {
        let now = Utc::now();
        let token = Token::new("a", now + Duration::seconds(30));
        assert!(token.is_fresh_at(now, Duration::seconds(10)));
        assert!(!token.is_fresh_at(now, Duration::seconds(30)));
        assert!(!token.is_fresh_at(now, Duration::seconds(60)));
    }

    #[test]
    fn test_token_from_response() {
        let issued = Utc::now();
        let response = TokenResponse {
            access_token: "test_token".to_string(),
            token_type: Some("Bearer".to_string()),
            expires_in: Some(3600),
            scope: Some("general".to_string()),
        };

        let token = Token::from_response(response, issued).unwrap();
        assert_eq!(token.access_token, "test_token");
        assert_eq!(token.expires_at, issued + Duration::seconds(3600));
        assert_eq!(token.scope.as_deref(), Some("general"));
    }

    #[test]
    fn test_missing_expiry_uses_default_lifetime() {
        let issued = Utc::now();
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"abc"}"#).unwrap();
        let token = Token::from_response(response, issued).unwrap();
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(
            token.expires_at,
            issued + Duration::seconds(15_897_600)
        );
    }

    #[test]
    fn test_empty_access_token_rejected() {
        let response = TokenResponse {
            access_token: "  ".to_string(),
            token_type: None,
            expires_in: Some(10),
            scope: None,
        };
        assert!(matches!(
            Token::from_response(response, Utc::now()),
            Err(Error::InvalidResponse(_))
        ));
    }
}
