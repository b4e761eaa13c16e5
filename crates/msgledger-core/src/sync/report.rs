//! End-of-run reporting.

use async_trait::async_trait;

use super::run::{RunStatus, SyncRun};

/// Receives every finished run.
#[async_trait]
pub trait RunReporter: Send + Sync {
    /// Reports a completed or failed run.
    async fn report(&self, run: &SyncRun);
}

/// Writes the run summary to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

#[async_trait]
impl RunReporter for LogReporter {
    async fn report(&self, run: &SyncRun) {
        let duration_ms = run.duration().map(|d| d.num_milliseconds());
        let watermark = run.watermark.map(|w| w.to_rfc3339());

        match run.status {
            RunStatus::Failed => tracing::error!(
                mode = %run.mode,
                ?watermark,
                seen = run.seen,
                succeeded = run.succeeded,
                failed = run.failed,
                pages = run.pages_fetched,
                ?duration_ms,
                error = run.fatal_error.as_deref().unwrap_or_default(),
                "sync run failed"
            ),
            _ if run.failed > 0 => tracing::error!(
                mode = %run.mode,
                ?watermark,
                seen = run.seen,
                succeeded = run.succeeded,
                failed = run.failed,
                first_error = run.first_error.as_deref().unwrap_or_default(),
                "sync run completed with record errors"
            ),
            _ => tracing::info!(
                mode = %run.mode,
                ?watermark,
                dry_run = run.dry_run,
                seen = run.seen,
                inserted = run.inserted,
                updated = run.updated,
                filtered = run.filtered,
                pages = run.pages_fetched,
                ?duration_ms,
                "sync run completed"
            ),
        }
    }
}
