//! Sync modes and per-run statistics.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::Error;
use crate::message::UpsertOutcome;

/// Which window of remote records a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum SyncMode {
    /// Everything the API returns.
    Full,
    /// Records newer than the newest stored message; full when the store is empty.
    Incremental,
    /// Records newer than the given instant.
    SinceTimestamp(DateTime<Utc>),
    /// Records from the last `n` days.
    SinceDays(u32),
}

impl SyncMode {
    /// Watermark implied by the mode alone.
    ///
    /// `Incremental` needs the store and yields `None` here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a day window reaches past the
    /// representable date range.
    pub fn fixed_watermark(&self, now: DateTime<Utc>) -> crate::Result<Option<DateTime<Utc>>> {
        match self {
            Self::Full | Self::Incremental => Ok(None),
            Self::SinceTimestamp(t) => Ok(Some(*t)),
            Self::SinceDays(n) => Duration::try_days(i64::from(*n))
                .and_then(|window| now.checked_sub_signed(window))
                .map(Some)
                .ok_or_else(|| Error::Config(format!("a window of {n} days is out of range"))),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Incremental => write!(f, "incremental"),
            Self::SinceTimestamp(t) => write!(f, "since {}", t.to_rfc3339()),
            Self::SinceDays(n) => write!(f, "last {n} days"),
        }
    }
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Created, not started.
    Idle,
    /// Extracting and loading.
    Running,
    /// Reached the end of the remote data.
    Completed,
    /// Aborted by a fatal error.
    Failed,
}

/// Statistics and outcome of one sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncRun {
    /// Requested mode.
    pub mode: SyncMode,
    /// Resolved exclusive lower bound, if any.
    pub watermark: Option<DateTime<Utc>>,
    /// Current status.
    pub status: RunStatus,
    /// True if nothing was written.
    pub dry_run: bool,
    /// When the run was created.
    pub started_at: DateTime<Utc>,
    /// When the run completed or failed.
    pub finished_at: Option<DateTime<Utc>>,
    /// Records handed to the transformer.
    pub seen: u64,
    /// Records transformed and stored.
    pub succeeded: u64,
    /// Records skipped because of a per-record error.
    pub failed: u64,
    /// Upserts that created a document.
    pub inserted: u64,
    /// Upserts that replaced a document.
    pub updated: u64,
    /// Records dropped as not newer than the watermark.
    pub filtered: u64,
    /// Pages requested from the API.
    pub pages_fetched: u32,
    /// First per-record error, for the report.
    pub first_error: Option<String>,
    /// Error that aborted the run.
    pub fatal_error: Option<String>,
}

impl SyncRun {
    /// Creates an idle run.
    #[must_use]
    pub fn new(mode: SyncMode, dry_run: bool) -> Self {
        Self {
            mode,
            watermark: None,
            status: RunStatus::Idle,
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            seen: 0,
            succeeded: 0,
            failed: 0,
            inserted: 0,
            updated: 0,
            filtered: 0,
            pages_fetched: 0,
            first_error: None,
            fatal_error: None,
        }
    }

    /// Completed with no per-record failures.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.status == RunStatus::Completed && self.failed == 0
    }

    /// Wall-clock duration once finished.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }

    pub(crate) fn start(&mut self, watermark: Option<DateTime<Utc>>) {
        self.watermark = watermark;
        self.status = RunStatus::Running;
    }

    pub(crate) fn record_success(&mut self, outcome: Option<UpsertOutcome>) {
        self.succeeded += 1;
        match outcome {
            Some(UpsertOutcome::Inserted) => self.inserted += 1,
            Some(UpsertOutcome::Updated) => self.updated += 1,
            None => {}
        }
    }

    pub(crate) fn record_failure(&mut self, message_id: Option<&str>, error: &Error) {
        self.failed += 1;
        tracing::warn!(message_id = message_id.unwrap_or("<none>"), %error, "skipping record");
        if self.first_error.is_none() {
            self.first_error = Some(match message_id {
                Some(id) => format!("{id}: {error}"),
                None => error.to_string(),
            });
        }
    }

    pub(crate) fn complete(&mut self) {
        self.status = RunStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, error: &Error) {
        self.status = RunStatus::Failed;
        self.fatal_error = Some(error.to_string());
        self.finished_at = Some(Utc::now());
    }
}
