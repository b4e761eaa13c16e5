//! Runtime configuration for a sync run.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::{Error, Result};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.hostaway.com/v1";

/// Remote API settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL; endpoint paths are appended to it.
    pub base_url: Url,
    /// OAuth client ID.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Requested OAuth scope.
    pub scope: Option<String>,
    /// Records requested per page.
    pub page_limit: usize,
    /// Minimum pause between consecutive HTTP calls.
    pub request_delay: Duration,
    /// Attempts per request, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles afterwards.
    pub initial_backoff: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Skip all network calls.
    pub dry_run: bool,
}

impl ApiConfig {
    /// Creates a config with defaults for everything but the credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the default base URL cannot be parsed.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base_url: Url::parse(DEFAULT_BASE_URL)?,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: Some("general".to_string()),
            page_limit: 100,
            request_delay: Duration::from_secs(1),
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
            dry_run: false,
        })
    }

    /// Sets the base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not a valid URL.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = Url::parse(base_url)?;
        Ok(self)
    }

    /// Resolves `path` (e.g. `conversations`) against the base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the joined URL is invalid.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !self.dry_run {
            if self.client_id.trim().is_empty() {
                return Err(Error::Config("HOSTAWAY_CLIENT_ID is required".into()));
            }
            if self.client_secret.trim().is_empty() {
                return Err(Error::Config("HOSTAWAY_CLIENT_SECRET is required".into()));
            }
        }
        if self.page_limit == 0 {
            return Err(Error::Config("page limit must be at least 1".into()));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max attempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Document store settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Explicit `SQLite` connection URL; overrides `database`/`data_dir`.
    pub url: Option<String>,
    /// Database name, used as the file stem when `url` is absent.
    pub database: String,
    /// Collection (table) name.
    pub collection: String,
    /// Directory holding the database file when `url` is absent.
    pub data_dir: Option<PathBuf>,
    /// Connection attempts before giving up.
    pub connect_attempts: u32,
    /// Pause between connection attempts.
    pub connect_retry_delay: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            database: "hostaway_messages".to_string(),
            collection: "messages".to_string(),
            data_dir: None,
            connect_attempts: 3,
            connect_retry_delay: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    /// Connection URL derived from the settings.
    #[must_use]
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let file = format!("{}.db", self.database);
        let path = self
            .data_dir
            .as_ref()
            .map_or_else(|| PathBuf::from(&file), |dir| dir.join(&file));
        format!("sqlite:{}?mode=rwc", path.display())
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !is_identifier(&self.collection) {
            return Err(Error::Config(format!(
                "collection name '{}' must match [A-Za-z_][A-Za-z0-9_]*",
                self.collection
            )));
        }
        if self.url.is_none() && self.database.trim().is_empty() {
            return Err(Error::Config("database name is required".into()));
        }
        Ok(())
    }
}

/// Complete configuration for [`crate::run_sync`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Remote API settings.
    pub api: ApiConfig,
    /// Store settings.
    pub store: StoreConfig,
}

impl SyncConfig {
    /// Checks that required values are present and well-formed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.api.validate()?;
        self.store.validate()
    }
}

/// Returns true if `name` is safe to splice into SQL as an identifier.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
