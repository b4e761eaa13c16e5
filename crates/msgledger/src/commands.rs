//! Subcommand implementations.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use msgledger_core::{MessageStore, SqliteMessageStore, StoreConfig, StoredMessage, run_sync};
use tracing::info;

use crate::cli::{StoreArgs, SyncArgs};

/// Directory for the database file, created when `create` is set.
///
/// `None` when an explicit store URL is given.
pub fn data_dir(store: &StoreArgs, create: bool) -> anyhow::Result<Option<PathBuf>> {
    if store.store_url.is_some() {
        return Ok(None);
    }
    let dir = dirs::data_dir()
        .context("could not determine the data directory")?
        .join("msgledger");
    if create {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("cannot create data directory {}", dir.display()))?;
    }
    Ok(Some(dir))
}

pub async fn sync(args: &SyncArgs, store: StoreConfig) -> anyhow::Result<ExitCode> {
    let config = args.to_config(store)?;
    let mode = args.mode();
    info!(%mode, dry_run = config.api.dry_run, "Starting msgledger sync");

    let run = run_sync(&config, mode).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        println!(
            "{status:?}: {seen} seen, {inserted} inserted, {updated} updated, {failed} failed, {filtered} already synced ({pages} pages)",
            status = run.status,
            seen = run.seen,
            inserted = run.inserted,
            updated = run.updated,
            failed = run.failed,
            filtered = run.filtered,
            pages = run.pages_fetched,
        );
        if let Some(error) = run.fatal_error.as_deref().or(run.first_error.as_deref()) {
            println!("error: {error}");
        }
    }

    Ok(if run.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub async fn list(config: &StoreConfig, skip: u32, limit: u32) -> anyhow::Result<ExitCode> {
    let store = SqliteMessageStore::connect(config).await?;
    let messages = store.list(skip, limit).await?;
    let total = store.count().await?;

    for message in &messages {
        println!("{}", summary_line(message));
    }
    println!("({} of {total})", messages.len());
    store.close().await;
    Ok(ExitCode::SUCCESS)
}

pub async fn show(config: &StoreConfig, message_id: &str) -> anyhow::Result<ExitCode> {
    let store = SqliteMessageStore::connect(config).await?;
    let found = store.get(message_id).await?;
    store.close().await;

    match found {
        Some(message) => {
            println!("{}", serde_json::to_string_pretty(&message)?);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("no message with id {message_id}");
            Ok(ExitCode::FAILURE)
        }
    }
}

pub async fn search(config: &StoreConfig, query: &str, limit: u32) -> anyhow::Result<ExitCode> {
    let store = SqliteMessageStore::connect(config).await?;
    store.ensure_indexes().await?;
    let hits = store.search_content(query, limit).await?;

    for message in &hits {
        println!("{}", summary_line(message));
    }
    store.close().await;
    Ok(ExitCode::SUCCESS)
}

/// One-line listing: time, direction, ID, property, guest and a snippet.
fn summary_line(stored: &StoredMessage) -> String {
    let m = &stored.message;
    let property = m.property.name.as_deref().unwrap_or(&m.property.id);
    let guest = m.guest.name.as_deref().unwrap_or("-");
    let snippet: String = m.content.split_whitespace().collect::<Vec<_>>().join(" ");
    let snippet = match snippet.char_indices().nth(60) {
        Some((idx, _)) => format!("{}...", &snippet[..idx]),
        None => snippet,
    };
    format!(
        "{}  {:<8}  {:<12}  [{property}] {guest}: {snippet}",
        m.timestamp.format("%Y-%m-%d %H:%M"),
        m.direction.as_str(),
        m.message_id,
    )
}
