//! Retry, backoff, and chunked-fetch primitives for the data access layer.

pub mod retry;

pub use retry::{fetch_chunked, partition, with_retry, RetryPolicy};
