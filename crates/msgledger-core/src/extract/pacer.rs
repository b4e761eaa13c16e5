//! Minimum spacing between consecutive HTTP calls.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a fixed minimum delay between consecutive calls.
///
/// This is cooperative pacing, not a token bucket: every caller waits until
/// `delay` has passed since the previous call started, which serializes calls
/// even when several tasks share the pacer.
#[derive(Debug)]
pub struct RequestPacer {
    delay: Duration,
    last: Mutex<Option<Instant>>,
}

impl RequestPacer {
    /// Creates a pacer. A zero delay disables pacing.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last: Mutex::new(None),
        }
    }

    /// Waits for this caller's turn and records the call.
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.delay;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
