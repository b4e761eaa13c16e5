//! # msgledger-core
//!
//! Incremental sync of guest messages from the Hostaway REST API into a
//! local document store.
//!
//! This crate provides:
//! - **Extraction** - paginated, paced API client with retry and token refresh
//! - **Transformation** - validation, normalization and enrichment of raw records
//! - **Storage** - idempotent upserts, watermark queries and full-text search (`SQLite`)
//! - **Sync runs** - full, incremental and windowed runs with per-run statistics
//!
//! ```no_run
//! use msgledger_core::{ApiConfig, StoreConfig, SyncConfig, SyncMode, run_sync};
//!
//! # async fn example() -> msgledger_core::Result<()> {
//! let config = SyncConfig {
//!     api: ApiConfig::new("client-id", "client-secret")?,
//!     store: StoreConfig::default(),
//! };
//! let run = run_sync(&config, SyncMode::Incremental).await?;
//! println!("{} new, {} updated", run.inserted, run.updated);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod extract;
pub mod message;
pub mod store;
pub mod sync;
pub mod transform;

pub use config::{ApiConfig, DEFAULT_BASE_URL, StoreConfig, SyncConfig};
pub use error::{Error, Result};
pub use extract::{ExtractClient, Page, RawRecord, RecordStream};
pub use message::{
    Direction, Guest, Message, MessageType, Property, Reservation, StoredMessage, UpsertOutcome,
};
pub use store::{MessageStore, SqliteMessageStore};
pub use sync::{
    LogReporter, RunReporter, RunStatus, SyncEngine, SyncMode, SyncRun, run_sync,
    run_sync_with_reporter,
};
pub use transform::{EnrichmentLookup, NoEnrichment, Transformer, ValidationError};
