//! Lazy, page-at-a-time record sequence.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use super::client::ExtractClient;
use super::raw::RawRecord;
use crate::Result;
use crate::message::parse_timestamp;

/// Counters collected while streaming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Pages requested from the API.
    pub pages_fetched: u32,
    /// Records returned by the API.
    pub records_fetched: u64,
    /// Records dropped because they were not newer than the watermark.
    pub filtered: u64,
}

/// Yields raw records newer than an optional watermark.
///
/// At most one page is buffered. The sequence cannot be rewound; after an
/// error it is finished.
#[derive(Debug)]
pub struct RecordStream<'a> {
    client: &'a ExtractClient,
    since: Option<DateTime<Utc>>,
    limit: usize,
    next_offset: usize,
    buffer: VecDeque<RawRecord>,
    finished: bool,
    stats: StreamStats,
}

impl<'a> RecordStream<'a> {
    pub(crate) fn new(
        client: &'a ExtractClient,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Self {
        Self {
            client,
            since,
            limit: limit.max(1),
            next_offset: 0,
            buffer: VecDeque::new(),
            finished: false,
            stats: StreamStats::default(),
        }
    }

    /// Next record, fetching another page when the buffer runs dry.
    ///
    /// # Errors
    ///
    /// Returns the page fetch error; the stream yields nothing afterwards.
    pub async fn next(&mut self) -> Result<Option<RawRecord>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }
            if self.finished {
                return Ok(None);
            }

            let page = match self
                .client
                .fetch_page(self.next_offset, self.limit, self.since)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    self.finished = true;
                    return Err(e);
                }
            };

            self.stats.pages_fetched += 1;
            self.stats.records_fetched += page.records.len() as u64;
            self.next_offset += self.limit;
            self.finished = !page.has_more;

            let before = self.stats.filtered;
            for record in page.records {
                if self.is_stale(&record) {
                    self.stats.filtered += 1;
                } else {
                    self.buffer.push_back(record);
                }
            }

            tracing::info!(
                page = self.stats.pages_fetched,
                kept = self.buffer.len(),
                filtered = self.stats.filtered - before,
                "extracted page"
            );
        }
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Records at or before the watermark were already synced.
    fn is_stale(&self, record: &RawRecord) -> bool {
        let Some(since) = self.since else {
            return false;
        };
        record
            .sent_on
            .as_deref()
            .and_then(parse_timestamp)
            .is_some_and(|ts| ts <= since)
    }
}
