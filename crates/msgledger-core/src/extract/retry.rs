//! Retry classification and backoff for API calls.

use std::time::Duration;

use reqwest::StatusCode;

/// Longest `Retry-After` we are willing to honor.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// How to react to an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Success; decode the body.
    Success,
    /// Token rejected; refresh once and retry once.
    Reauthenticate,
    /// Transient; back off and retry.
    Retry,
    /// Permanent rejection.
    Fail,
}

impl Disposition {
    /// Classifies a response status.
    #[must_use]
    pub fn of(status: StatusCode) -> Self {
        if status.is_success() {
            Self::Success
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Self::Reauthenticate
        } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Self::Retry
        } else {
            Self::Fail
        }
    }
}

/// Exponential backoff with a bounded attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per request, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }

    /// Delay for a 429, preferring the server's `Retry-After` seconds.
    #[must_use]
    pub fn throttle_delay(&self, attempt: u32, retry_after: Option<&str>) -> Duration {
        retry_after
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or_else(
                || self.backoff(attempt),
                |secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER),
            )
    }
}

/// True for transport failures worth retrying.
#[must_use]
pub fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}
