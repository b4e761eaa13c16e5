//! Extract, transform and load orchestration.

use chrono::{DateTime, Utc};

use super::report::{LogReporter, RunReporter};
use super::run::{SyncMode, SyncRun};
use crate::{Error, Result};
use crate::extract::ExtractClient;
use crate::store::MessageStore;
use crate::transform::Transformer;

/// Log progress every this many records.
const PROGRESS_EVERY: u64 = 100;

/// Runs syncs from the remote API into a store.
///
/// Runs are sequential; callers must not start two runs against the same
/// store at once.
pub struct SyncEngine<S> {
    client: ExtractClient,
    store: S,
    reporter: Box<dyn RunReporter>,
}

impl<S> std::fmt::Debug for SyncEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl<S: MessageStore> SyncEngine<S> {
    /// Creates an engine that reports to the log.
    #[must_use]
    pub fn new(client: ExtractClient, store: S) -> Self {
        Self {
            client,
            store,
            reporter: Box::new(LogReporter),
        }
    }

    /// Replaces the reporter.
    #[must_use]
    pub fn with_reporter(mut self, reporter: impl RunReporter + 'static) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    /// The target store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Runs one sync and reports it.
    ///
    /// Never returns early: fatal errors end the run with
    /// [`RunStatus::Failed`](super::RunStatus::Failed), keeping whatever was
    /// already written.
    pub async fn run(&self, mode: SyncMode) -> SyncRun {
        let mut run = SyncRun::new(mode, self.client.is_dry_run());
        tracing::info!(%mode, dry_run = run.dry_run, "starting sync run");

        match self.execute(&mut run).await {
            Ok(()) => run.complete(),
            Err(e) => {
                tracing::error!(error = %e, "sync run aborted");
                run.fail(&e);
            }
        }

        self.reporter.report(&run).await;
        run
    }

    async fn execute(&self, run: &mut SyncRun) -> Result<()> {
        let watermark = self.resolve_watermark(run.mode).await?;
        run.start(watermark);
        tracing::info!(watermark = ?watermark.map(|w| w.to_rfc3339()), "resolved watermark");

        if run.dry_run {
            tracing::info!("DRY RUN: skipping index creation");
        } else {
            self.store.ensure_indexes().await?;
        }

        let mut transformer = Transformer::new(&self.client);
        let mut records = self.client.stream_since(watermark);

        loop {
            let next = records.next().await;
            let stats = records.stats();
            run.pages_fetched = stats.pages_fetched;
            run.filtered = stats.filtered;

            let Some(raw) = next? else {
                break;
            };
            run.seen += 1;

            let message = match transformer.transform(&raw).await {
                Ok(message) => message,
                Err(e) => {
                    run.record_failure(raw.id.as_deref(), &Error::from(e));
                    continue;
                }
            };

            if run.dry_run {
                tracing::info!(message_id = %message.message_id, "DRY RUN: would upsert message");
                run.record_success(None);
            } else {
                match self.store.upsert(&message).await {
                    Ok(outcome) => run.record_success(Some(outcome)),
                    Err(e) if !e.is_fatal() => {
                        run.record_failure(Some(&message.message_id), &e);
                    }
                    Err(e) => return Err(e),
                }
            }

            if run.seen % PROGRESS_EVERY == 0 {
                tracing::info!(
                    seen = run.seen,
                    succeeded = run.succeeded,
                    failed = run.failed,
                    "sync progress"
                );
            }
        }

        Ok(())
    }

    async fn resolve_watermark(&self, mode: SyncMode) -> Result<Option<DateTime<Utc>>> {
        match mode {
            SyncMode::Incremental => self.store.latest_timestamp().await,
            other => other.fixed_watermark(Utc::now()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::message::{Message, UpsertOutcome, parse_timestamp};
    use crate::sync::RunStatus;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // ── In-memory store ─────────────────────────────────────────

    #[derive(Default)]
    struct MemoryStore {
        docs: Arc<Mutex<HashMap<String, Message>>>,
        watermark: Option<DateTime<Utc>>,
        reject_ids: Vec<String>,
        watermark_fails: bool,
        index_calls: AtomicUsize,
    }

    #[async_trait]
    impl MessageStore for MemoryStore {
        async fn upsert(&self, message: &Message) -> Result<UpsertOutcome> {
            if self.reject_ids.contains(&message.message_id) {
                return Err(Error::StoreWrite(sqlx::Error::RowNotFound));
            }
            let previous = self
                .docs
                .lock()
                .unwrap()
                .insert(message.message_id.clone(), message.clone());
            Ok(if previous.is_some() {
                UpsertOutcome::Updated
            } else {
                UpsertOutcome::Inserted
            })
        }

        async fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
            if self.watermark_fails {
                return Err(Error::Database(sqlx::Error::PoolClosed));
            }
            Ok(self.watermark)
        }

        async fn ensure_indexes(&self) -> Result<()> {
            self.index_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct CapturingReporter {
        runs: Arc<Mutex<Vec<SyncRun>>>,
    }

    #[async_trait]
    impl RunReporter for CapturingReporter {
        async fn report(&self, run: &SyncRun) {
            self.runs.lock().unwrap().push(run.clone());
        }
    }

    // ── Helpers ─────────────────────────────────────────────────

    fn record(id: Option<&str>, sent_on: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "listingMapId": 1,
            "listingName": "Beach House",
            "body": format!("message {}", id.unwrap_or("?")),
            "messageSentOn": sent_on,
            "isIncoming": 1,
        })
    }

    async fn server_with(records: Vec<serde_json::Value>) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accessTokens"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok", "expires_in": 3600
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/conversations"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success", "result": records
            })))
            .mount(&server)
            .await;
        server
    }

    fn client(server: &MockServer, dry_run: bool) -> ExtractClient {
        let mut config = ApiConfig::new("id", "secret")
            .unwrap()
            .with_base_url(&server.uri())
            .unwrap();
        config.request_delay = Duration::ZERO;
        config.initial_backoff = Duration::from_millis(1);
        config.page_limit = 10;
        config.dry_run = dry_run;
        ExtractClient::from_config(&config).unwrap()
    }

    // ── Tests ───────────────────────────────────────────────────

    #[tokio::test]
    async fn invalid_record_is_counted_and_skipped() {
        let server = server_with(vec![
            record(Some("m1"), "2024-01-01 10:00:00"),
            record(None, "2024-01-01 11:00:00"),
            record(Some("m2"), "2024-01-01 12:00:00"),
            record(Some("m3"), "2024-01-01 13:00:00"),
        ])
        .await;
        let engine = SyncEngine::new(client(&server, false), MemoryStore::default());

        let run = engine.run(SyncMode::Full).await;

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.seen, 4);
        assert_eq!(run.succeeded, 3);
        assert_eq!(run.failed, 1);
        assert_eq!(run.inserted, 3);
        assert!(run.first_error.is_some());
        assert!(!run.is_clean());
        assert_eq!(engine.store().docs.lock().unwrap().len(), 3);
        assert_eq!(engine.store().index_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn store_write_error_is_per_record() {
        let server = server_with(vec![
            record(Some("m1"), "2024-01-01 10:00:00"),
            record(Some("m2"), "2024-01-01 11:00:00"),
        ])
        .await;
        let store = MemoryStore {
            reject_ids: vec!["m1".into()],
            ..MemoryStore::default()
        };
        let engine = SyncEngine::new(client(&server, false), store);

        let run = engine.run(SyncMode::Full).await;

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!((run.succeeded, run.failed), (1, 1));
        assert!(run.first_error.as_deref().unwrap().starts_with("m1:"));
    }

    #[tokio::test]
    async fn fatal_page_error_keeps_written_records() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accessTokens"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok", "expires_in": 3600
            })))
            .mount(&server)
            .await;
        let first_page: Vec<_> = (0..10)
            .map(|i| record(Some(&format!("m{i}")), "2024-01-01 10:00:00"))
            .collect();
        Mock::given(method("GET"))
            .and(path("/conversations"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success", "result": first_page
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/conversations"))
            .and(query_param("offset", "10"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let reporter = CapturingReporter::default();
        let engine = SyncEngine::new(client(&server, false), MemoryStore::default())
            .with_reporter(reporter.clone());

        let run = engine.run(SyncMode::Full).await;

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.succeeded, 10);
        assert_eq!(run.pages_fetched, 1);
        assert!(run.fatal_error.as_deref().unwrap().contains("HTTP 400"));
        assert_eq!(engine.store().docs.lock().unwrap().len(), 10);

        let reported = reporter.runs.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0], run);
    }

    #[tokio::test]
    async fn incremental_uses_store_watermark() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accessTokens"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok", "expires_in": 3600
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/conversations"))
            .and(query_param("since", "2024-01-01T12:00:00Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "result": [
                    record(Some("old"), "2024-01-01 11:00:00"),
                    record(Some("edge"), "2024-01-01 12:00:00"),
                    record(Some("new"), "2024-01-01 13:00:00"),
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryStore {
            watermark: parse_timestamp("2024-01-01T12:00:00Z"),
            ..MemoryStore::default()
        };
        let engine = SyncEngine::new(client(&server, false), store);

        let run = engine.run(SyncMode::Incremental).await;

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.watermark, parse_timestamp("2024-01-01T12:00:00Z"));
        assert_eq!(run.filtered, 2);
        assert_eq!(run.succeeded, 1);
        let docs = engine.store().docs.lock().unwrap();
        assert!(docs.contains_key("new"));
        assert!(!docs.contains_key("edge"));
    }

    #[tokio::test]
    async fn watermark_failure_is_fatal() {
        let server = server_with(vec![]).await;
        let store = MemoryStore {
            watermark_fails: true,
            ..MemoryStore::default()
        };
        let engine = SyncEngine::new(client(&server, false), store);

        let run = engine.run(SyncMode::Incremental).await;

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.seen, 0);
        assert_eq!(engine.store().index_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn out_of_range_day_window_fails_the_run() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        let engine = SyncEngine::new(client(&server, false), MemoryStore::default());

        let run = engine.run(SyncMode::SinceDays(u32::MAX)).await;

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.seen, 0);
        assert!(run.fatal_error.unwrap().contains("out of range"));
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        let engine = SyncEngine::new(client(&server, true), MemoryStore::default());

        let run = engine.run(SyncMode::SinceDays(7)).await;

        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.dry_run);
        assert!(run.watermark.is_some());
        assert!(engine.store().docs.lock().unwrap().is_empty());
        assert_eq!(engine.store().index_calls.load(Ordering::SeqCst), 0);
    }
}
