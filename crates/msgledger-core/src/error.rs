//! Error types for the core library.

use thiserror::Error;

use crate::transform::ValidationError;

/// Errors that can occur in core operations.
///
/// Per-record variants ([`Error::Validation`], [`Error::Enrichment`],
/// [`Error::StoreWrite`]) are contained by the sync engine and counted;
/// everything else aborts a run. See [`Error::is_fatal`].
#[derive(Debug, Error)]
pub enum Error {
    /// Credential exchange failed.
    #[error("Authentication failed: {0}")]
    Auth(#[from] msgledger_oauth::Error),

    /// API kept rejecting a freshly issued token.
    #[error("API rejected credentials after token refresh (HTTP {status})")]
    AuthRejected {
        /// HTTP status of the final rejection (401 or 403).
        status: u16,
    },

    /// Non-retryable API rejection.
    #[error("Extraction rejected{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Extract {
        /// HTTP status, if the rejection came from the transport.
        status: Option<u16>,
        /// Server message or response body.
        message: String,
    },

    /// Transient failures persisted past the retry budget.
    #[error("Network failure after {attempts} attempts: {last_error}")]
    TransientNetwork {
        /// Number of attempts made.
        attempts: u32,
        /// Last observed failure.
        last_error: String,
    },

    /// Record failed validation.
    #[error("Invalid record: {0}")]
    Validation(#[from] ValidationError),

    /// Best-effort lookup failed.
    #[error("Enrichment lookup failed: {0}")]
    Enrichment(String),

    /// Store could not be reached.
    #[error("Store unavailable after {attempts} attempts: {source}")]
    StoreUnavailable {
        /// Number of connection attempts made.
        attempts: u32,
        /// Last connection error.
        #[source]
        source: sqlx::Error,
    },

    /// Writing a single record failed.
    #[error("Store write failed: {0}")]
    StoreWrite(#[source] sqlx::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true if this error must abort the whole sync run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Validation(_) | Self::Enrichment(_) | Self::StoreWrite(_)
        )
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::AuthRejected { status: 401 }.is_fatal());
        assert!(
            Error::TransientNetwork {
                attempts: 3,
                last_error: "timeout".into()
            }
            .is_fatal()
        );
        assert!(
            Error::Extract {
                status: Some(400),
                message: "bad request".into()
            }
            .is_fatal()
        );
        assert!(!Error::Validation(ValidationError::MissingMessageId).is_fatal());
        assert!(!Error::Enrichment("listing 7 not found".into()).is_fatal());
        assert!(!Error::StoreWrite(sqlx::Error::RowNotFound).is_fatal());
    }

    #[test]
    fn test_extract_display_includes_status() {
        let err = Error::Extract {
            status: Some(422),
            message: "invalid offset".into(),
        };
        assert_eq!(err.to_string(), "Extraction rejected (HTTP 422): invalid offset");

        let err = Error::Extract {
            status: None,
            message: "status=fail".into(),
        };
        assert_eq!(err.to_string(), "Extraction rejected: status=fail");
    }
}
