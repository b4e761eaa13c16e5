//! Message persistence.

mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;
use crate::message::{Message, UpsertOutcome};

pub use sqlite::SqliteMessageStore;

/// Write side of the document store used by a sync run.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Inserts or fully replaces the message with the same `message_id`.
    ///
    /// Keeps `created_at` of an existing document and sets `updated_at` to now.
    async fn upsert(&self, message: &Message) -> Result<UpsertOutcome>;

    /// Newest stored message timestamp, or `None` when empty.
    async fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>>;

    /// Creates the unique, query and full-text indexes if missing.
    async fn ensure_indexes(&self) -> Result<()>;
}
