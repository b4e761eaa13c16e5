//! `msgledger` - sync Hostaway guest messages into a local store.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "msgledger=info,msgledger_core=info,msgledger_oauth=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    // a dry run only reads the store, so leave the filesystem alone
    let create = !matches!(&cli.command, Command::Sync(args) if args.dry_run);
    let store = cli.store.to_config(commands::data_dir(&cli.store, create)?);

    match cli.command {
        Command::Sync(args) => commands::sync(&args, store).await,
        Command::List { skip, limit } => commands::list(&store, skip, limit).await,
        Command::Show { message_id } => commands::show(&store, &message_id).await,
        Command::Search { query, limit } => commands::search(&store, &query, limit).await,
    }
}
