//! Command-line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use msgledger_core::message::parse_timestamp;
use msgledger_core::{ApiConfig, DEFAULT_BASE_URL, StoreConfig, SyncConfig, SyncMode};

/// Widest `--days` window accepted.
const MAX_DAYS: i64 = 36_500;

/// Sync Hostaway guest messages into a local store.
#[derive(Debug, Parser)]
#[command(name = "msgledger", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Pull new and changed messages from the API
    Sync(SyncArgs),
    /// List stored messages, newest first
    List {
        /// Messages to skip
        #[arg(long, default_value_t = 0)]
        skip: u32,
        /// Messages to show (at most 100)
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Print one stored message as JSON
    Show {
        /// Remote message ID
        message_id: String,
    },
    /// Search message content
    Search {
        /// Words that must all appear
        query: String,
        /// Maximum results (at most 100)
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

/// Where messages are stored.
#[derive(Debug, Args)]
pub struct StoreArgs {
    /// SQLite URL, overrides --database
    #[arg(long, env = "STORE_URL", global = true)]
    pub store_url: Option<String>,

    /// Database file stem under the data directory
    #[arg(long, env = "STORE_DATABASE", default_value = "hostaway_messages", global = true)]
    pub database: String,

    /// Table holding the messages
    #[arg(long, env = "STORE_COLLECTION", default_value = "messages", global = true)]
    pub collection: String,
}

impl StoreArgs {
    /// Builds the store config, placing the database under `data_dir`.
    pub fn to_config(&self, data_dir: Option<PathBuf>) -> StoreConfig {
        StoreConfig {
            url: self.store_url.clone(),
            database: self.database.clone(),
            collection: self.collection.clone(),
            data_dir,
            ..StoreConfig::default()
        }
    }
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Re-extract everything
    #[arg(long, conflicts_with_all = ["since", "days"])]
    pub full: bool,

    /// Only messages after this instant (RFC 3339 or `YYYY-MM-DD HH:MM:SS` UTC)
    #[arg(long, value_parser = parse_since, conflicts_with = "days")]
    pub since: Option<DateTime<Utc>>,

    /// Only messages from the last N days
    #[arg(long, value_parser = clap::value_parser!(u32).range(..=MAX_DAYS))]
    pub days: Option<u32>,

    /// Log what would happen without calling the API or writing
    #[arg(long, env = "ENABLE_DRY_RUN")]
    pub dry_run: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub api: ApiArgs,
}

impl SyncArgs {
    /// Mode selected by the flags; incremental when none is given.
    pub fn mode(&self) -> SyncMode {
        if self.full {
            SyncMode::Full
        } else if let Some(since) = self.since {
            SyncMode::SinceTimestamp(since)
        } else if let Some(days) = self.days {
            SyncMode::SinceDays(days)
        } else {
            SyncMode::Incremental
        }
    }

    /// Builds the full sync config.
    pub fn to_config(&self, store: StoreConfig) -> anyhow::Result<SyncConfig> {
        let mut api = ApiConfig::new(&self.api.client_id, &self.api.client_secret)?
            .with_base_url(&self.api.base_url)
            .with_context(|| format!("invalid base URL: {}", self.api.base_url))?;

        let Ok(delay) = Duration::try_from_secs_f64(self.api.request_delay) else {
            bail!("request delay must be a non-negative number of seconds");
        };
        api.request_delay = delay;
        api.page_limit = self.api.page_limit;
        api.max_attempts = self.api.max_attempts;
        api.timeout = Duration::from_secs(self.api.timeout_secs);
        api.dry_run = self.dry_run;

        Ok(SyncConfig { api, store })
    }
}

/// Remote API settings.
#[derive(Debug, Args)]
pub struct ApiArgs {
    /// OAuth client ID
    #[arg(long, env = "HOSTAWAY_CLIENT_ID", default_value = "", hide_env_values = true)]
    pub client_id: String,

    /// OAuth client secret
    #[arg(
        long,
        env = "HOSTAWAY_CLIENT_SECRET",
        default_value = "",
        hide_default_value = true,
        hide_env_values = true
    )]
    pub client_secret: String,

    /// API base URL
    #[arg(long, env = "HOSTAWAY_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Seconds between API calls
    #[arg(long, env = "API_REQUEST_DELAY", default_value_t = 1.0)]
    pub request_delay: f64,

    /// Records per page
    #[arg(long, env = "API_PAGE_LIMIT", default_value_t = 100)]
    pub page_limit: usize,

    /// Attempts per request before giving up
    #[arg(long, env = "API_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,

    /// Per-request timeout in seconds
    #[arg(long, env = "API_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,
}

fn parse_since(value: &str) -> Result<DateTime<Utc>, String> {
    parse_timestamp(value).ok_or_else(|| format!("not a timestamp: {value}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sync_args(args: &[&str]) -> SyncArgs {
        let argv = ["msgledger", "sync"].iter().chain(args).copied();
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Sync(args) => args,
            other => panic!("expected sync, got {other:?}"),
        }
    }

    #[test]
    fn test_mode_flags() {
        assert_eq!(sync_args(&[]).mode(), SyncMode::Incremental);
        assert_eq!(sync_args(&["--full"]).mode(), SyncMode::Full);
        assert_eq!(sync_args(&["--days", "7"]).mode(), SyncMode::SinceDays(7));
        assert_eq!(
            sync_args(&["--since", "2024-01-15 00:00:00"]).mode(),
            SyncMode::SinceTimestamp(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_conflicting_modes_rejected() {
        assert!(Cli::try_parse_from(["msgledger", "sync", "--full", "--days", "1"]).is_err());
        assert!(
            Cli::try_parse_from([
                "msgledger",
                "sync",
                "--since",
                "2024-01-01T00:00:00Z",
                "--days",
                "1"
            ])
            .is_err()
        );
        assert!(Cli::try_parse_from(["msgledger", "sync", "--since", "last week"]).is_err());
    }

    #[test]
    fn test_sync_config_from_flags() {
        let args = sync_args(&[
            "--client-id",
            "id",
            "--client-secret",
            "secret",
            "--base-url",
            "http://localhost:9000/v1",
            "--request-delay",
            "0.25",
            "--page-limit",
            "50",
        ]);
        let config = args.to_config(StoreConfig::default()).unwrap();
        assert_eq!(config.api.request_delay, Duration::from_millis(250));
        assert_eq!(config.api.page_limit, 50);
        assert_eq!(
            config.api.endpoint("conversations").unwrap().as_str(),
            "http://localhost:9000/v1/conversations"
        );
    }

    #[test]
    fn test_negative_delay_rejected() {
        let args = sync_args(&["--request-delay=-1"]);
        assert!(args.to_config(StoreConfig::default()).is_err());
    }

    #[test]
    fn test_huge_delay_rejected() {
        let args = sync_args(&[
            "--client-id",
            "id",
            "--client-secret",
            "secret",
            "--request-delay",
            "1e30",
        ]);
        let err = args.to_config(StoreConfig::default()).unwrap_err();
        assert!(err.to_string().contains("request delay"), "{err}");

        let args = sync_args(&["--request-delay", "NaN"]);
        assert!(args.to_config(StoreConfig::default()).is_err());
    }

    #[test]
    fn test_days_window_is_bounded() {
        assert_eq!(sync_args(&["--days", "36500"]).mode(), SyncMode::SinceDays(36_500));
        assert!(Cli::try_parse_from(["msgledger", "sync", "--days", "100000000"]).is_err());
        assert!(Cli::try_parse_from(["msgledger", "sync", "--days", "-1"]).is_err());
    }

    #[test]
    fn test_store_flags_are_global() {
        let cli = Cli::try_parse_from(["msgledger", "list", "--collection", "archive"]).unwrap();
        let config = cli.store.to_config(None);
        assert_eq!(config.collection, "archive");
        assert!(matches!(cli.command, Command::List { skip: 0, limit: 20 }));
    }
}
