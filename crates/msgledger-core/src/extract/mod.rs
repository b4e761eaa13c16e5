//! Extraction from the remote conversation API.

mod client;
mod pacer;
mod raw;
mod retry;
mod stream;

pub use client::{ExtractClient, Page};
pub use pacer::RequestPacer;
pub use raw::RawRecord;
pub use retry::{Disposition, RetryPolicy};
pub use stream::{RecordStream, StreamStats};
