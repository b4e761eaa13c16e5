//! Sync runs: watermark resolution, orchestration and reporting.

mod engine;
mod report;
mod run;

pub use engine::SyncEngine;
pub use report::{LogReporter, RunReporter};
pub use run::{RunStatus, SyncMode, SyncRun};

use crate::config::SyncConfig;
use crate::extract::ExtractClient;
use crate::store::SqliteMessageStore;
use crate::{Error, Result};

/// Runs one sync with components built from `config`.
///
/// A store that cannot be reached yields a failed run rather than an error.
/// Dry runs open the store read-only and never create it.
///
/// # Errors
///
/// Returns [`Error::Config`] if the configuration is invalid.
pub async fn run_sync(config: &SyncConfig, mode: SyncMode) -> Result<SyncRun> {
    run_sync_with_reporter(config, mode, LogReporter).await
}

/// Like [`run_sync`], reporting to `reporter`.
///
/// # Errors
///
/// Returns [`Error::Config`] if the configuration is invalid.
pub async fn run_sync_with_reporter(
    config: &SyncConfig,
    mode: SyncMode,
    reporter: impl RunReporter + 'static,
) -> Result<SyncRun> {
    config.validate()?;
    let client = ExtractClient::from_config(&config.api)?;

    let connected = if config.api.dry_run {
        SqliteMessageStore::connect_read_only(&config.store).await
    } else {
        SqliteMessageStore::connect(&config.store).await
    };
    let store = match connected {
        Ok(store) => store,
        Err(e @ Error::Config(_)) => return Err(e),
        Err(e) => {
            let mut run = SyncRun::new(mode, config.api.dry_run);
            run.fail(&e);
            reporter.report(&run).await;
            return Ok(run);
        }
    };

    let engine = SyncEngine::new(client, store).with_reporter(reporter);
    let run = engine.run(mode).await;
    engine.store().close().await;
    Ok(run)
}
