//! HTTP client for the remote conversation API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use msgledger_oauth::{OAuthClient, TokenProvider};
use reqwest::{Client, header};
use rust_decimal::Decimal;
use serde_json::Value;
use url::Url;

use super::pacer::RequestPacer;
use super::raw::RawRecord;
use super::retry::{Disposition, RetryPolicy, is_transient};
use super::stream::RecordStream;
use crate::config::ApiConfig;
use crate::transform::{EnrichmentLookup, parse_decimal};
use crate::{Error, Result};

/// One page of raw records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Records in API order.
    pub records: Vec<RawRecord>,
    /// False once the API returned fewer records than requested.
    pub has_more: bool,
}

/// Paginated, paced API client with retry and token refresh.
#[derive(Debug)]
pub struct ExtractClient {
    http: Client,
    config: ApiConfig,
    tokens: Arc<TokenProvider>,
    pacer: RequestPacer,
    retry: RetryPolicy,
}

impl ExtractClient {
    /// Creates a client that authenticates through `tokens`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig, tokens: Arc<TokenProvider>) -> Result<Self> {
        let http = build_http_client(config)?;
        Ok(Self::with_parts(config, http, tokens))
    }

    /// Creates a client and its token provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the token URL is invalid or the HTTP client cannot be built.
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        let http = build_http_client(config)?;
        let oauth = OAuthClient::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            config.endpoint("accessTokens")?,
        )
        .with_scope(config.scope.clone())
        .with_retry(config.max_attempts, config.initial_backoff)
        .with_http_client(http.clone());

        Ok(Self::with_parts(
            config,
            http,
            Arc::new(TokenProvider::new(oauth)),
        ))
    }

    fn with_parts(config: &ApiConfig, http: Client, tokens: Arc<TokenProvider>) -> Self {
        Self {
            http,
            config: config.clone(),
            tokens,
            pacer: RequestPacer::new(config.request_delay),
            retry: RetryPolicy {
                max_attempts: config.max_attempts.max(1),
                initial_backoff: config.initial_backoff,
                ..RetryPolicy::default()
            },
        }
    }

    /// True if network calls are replaced by no-ops.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    /// Token provider shared by all requests.
    #[must_use]
    pub const fn tokens(&self) -> &Arc<TokenProvider> {
        &self.tokens
    }

    /// Fetches one page of conversations.
    ///
    /// `since` is forwarded to the API as a filter hint; exclusive filtering
    /// happens in [`RecordStream`].
    ///
    /// # Errors
    ///
    /// Returns a fatal error if authentication fails, the API rejects the
    /// request, or transient failures outlast the retry budget.
    pub async fn fetch_page(
        &self,
        offset: usize,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Page> {
        let url = self.config.endpoint("conversations")?;
        let mut query = vec![("limit", limit.to_string()), ("offset", offset.to_string())];
        if let Some(since) = since {
            query.push(("since", since.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }

        if self.config.dry_run {
            tracing::info!(%url, ?query, "DRY RUN: would fetch conversations page");
            return Ok(Page::default());
        }

        let body = self.get_json(url, &query).await?;
        let records: Vec<RawRecord> = match body.get("result") {
            Some(Value::Array(items)) => items.iter().map(RawRecord::from_value).collect(),
            None | Some(Value::Null) => Vec::new(),
            Some(other) => {
                return Err(Error::Extract {
                    status: None,
                    message: format!("expected result array, got {}", json_kind(other)),
                });
            }
        };

        let has_more = records.len() >= limit;
        tracing::debug!(offset, limit, count = records.len(), has_more, "fetched page");
        Ok(Page { records, has_more })
    }

    /// Lazily pages through every record newer than `since`.
    #[must_use]
    pub fn stream_since(&self, since: Option<DateTime<Utc>>) -> RecordStream<'_> {
        RecordStream::new(self, since, self.config.page_limit)
    }

    /// Fetches `result` of a detail endpoint such as `listings/{id}`.
    async fn get_detail(&self, collection: &str, segments: &[&str]) -> Result<Value> {
        let mut url = self.config.endpoint(collection)?;
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("base URL cannot take a path: {}", self.config.base_url)))?
            .extend(segments);
        let body = self.get_json(url, &[]).await?;
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Sends a paced, authenticated GET and returns the decoded envelope.
    async fn get_json(&self, url: Url, query: &[(&str, String)]) -> Result<Value> {
        let mut failures = 0u32;
        let mut refreshed = false;

        loop {
            let token = self.tokens.get_token().await?;
            self.pacer.wait().await;
            tracing::debug!(%url, failures, "sending request");

            let sent = self
                .http
                .get(url.clone())
                .query(query)
                .bearer_auth(&token.access_token)
                .header(header::CACHE_CONTROL, "no-cache")
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(e) if is_transient(&e) => {
                    failures += 1;
                    self.back_off(failures, &url, &e.to_string(), None).await?;
                    continue;
                }
                Err(e) => {
                    return Err(Error::Extract {
                        status: None,
                        message: e.to_string(),
                    });
                }
            };

            let status = response.status();
            match Disposition::of(status) {
                Disposition::Success => match response.json::<Value>().await {
                    Ok(body) => return check_envelope(body),
                    Err(e) if is_transient(&e) => {
                        failures += 1;
                        self.back_off(failures, &url, &e.to_string(), None).await?;
                    }
                    Err(e) => {
                        return Err(Error::Extract {
                            status: Some(status.as_u16()),
                            message: format!("invalid JSON body: {e}"),
                        });
                    }
                },
                Disposition::Reauthenticate => {
                    if refreshed {
                        return Err(Error::AuthRejected {
                            status: status.as_u16(),
                        });
                    }
                    tracing::warn!(%url, %status, "authorization failed, refreshing token");
                    self.tokens.invalidate(&token).await;
                    refreshed = true;
                }
                Disposition::Retry => {
                    failures += 1;
                    let retry_after = response
                        .headers()
                        .get(header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let body = response.text().await.unwrap_or_default();
                    let last_error = format!("HTTP {status}: {}", truncate(&body, 256));
                    self.back_off(failures, &url, &last_error, retry_after.as_deref())
                        .await?;
                }
                Disposition::Fail => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::Extract {
                        status: Some(status.as_u16()),
                        message: truncate(&body, 512),
                    });
                }
            }
        }
    }

    /// Sleeps before the next attempt, or gives up once the budget is spent.
    async fn back_off(
        &self,
        failures: u32,
        url: &Url,
        last_error: &str,
        retry_after: Option<&str>,
    ) -> Result<()> {
        if failures >= self.retry.max_attempts {
            tracing::error!(%url, attempts = failures, error = last_error, "giving up");
            return Err(Error::TransientNetwork {
                attempts: failures,
                last_error: last_error.to_string(),
            });
        }

        let wait = self.retry.throttle_delay(failures, retry_after);
        tracing::warn!(
            %url,
            attempt = failures,
            wait_ms = wait.as_millis(),
            error = last_error,
            "transient failure, retrying with backoff"
        );
        tokio::time::sleep(wait).await;
        Ok(())
    }
}

#[async_trait]
impl EnrichmentLookup for ExtractClient {
    async fn property_name(&self, property_id: &str) -> Result<Option<String>> {
        if self.config.dry_run {
            tracing::info!(property_id, "DRY RUN: would look up listing");
            return Ok(None);
        }
        let detail = self.get_detail("listings", &[property_id]).await?;
        Ok(detail
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string))
    }

    async fn reservation_price(&self, reservation_id: &str) -> Result<Option<Decimal>> {
        if self.config.dry_run {
            tracing::info!(reservation_id, "DRY RUN: would look up reservation");
            return Ok(None);
        }
        let detail = self.get_detail("reservations", &[reservation_id]).await?;
        Ok(match detail.get("totalPrice") {
            Some(Value::Number(n)) => parse_decimal(&n.to_string()),
            Some(Value::String(s)) => parse_decimal(s),
            _ => None,
        })
    }

    async fn conversation_content(&self, conversation_id: &str) -> Result<Option<String>> {
        if self.config.dry_run {
            tracing::info!(conversation_id, "DRY RUN: would fetch conversation messages");
            return Ok(None);
        }
        let messages = self
            .get_detail("conversations", &[conversation_id, "messages"])
            .await?;
        Ok(messages
            .as_array()
            .and_then(|items| items.first())
            .and_then(|first| first.get("body"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

fn build_http_client(config: &ApiConfig) -> Result<Client> {
    Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))
}

/// Rejects envelopes whose `status` is present and not `success`.
fn check_envelope(body: Value) -> Result<Value> {
    match body.get("status").and_then(Value::as_str) {
        None | Some("success") => Ok(body),
        Some(status) => {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown API error");
            Err(Error::Extract {
                status: None,
                message: format!("API status '{status}': {message}"),
            })
        }
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn truncate(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
