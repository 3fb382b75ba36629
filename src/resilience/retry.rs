//! Retry with exponential backoff and jitter, plus chunked batch fetching
//! with partial-chunk tolerance.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use crate::error::{PipelineError, PipelineResult};

/// Hard ceiling on any single backoff sleep.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Jitter is uniform in `[0, min(1000, base))`.
const MAX_JITTER_MS: u64 = 1_000;

/// Retry configuration for transient data-access failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure (2 retries = 3 attempts total).
    pub max_retries: u32,
    /// Base delay; attempt i sleeps `base * 2^(i-1)` plus jitter.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    /// Backoff for the given 1-based failed attempt number.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let base_ms = self
            .base_delay
            .as_millis()
            .saturating_mul(1u128 << (attempt.saturating_sub(1)).min(31))
            .min(u64::MAX as u128) as u64;
        let jitter_cap = base_ms.min(MAX_JITTER_MS);
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..jitter_cap)
        };
        Duration::from_millis(base_ms.saturating_add(jitter).min(MAX_BACKOFF_MS))
    }
}

/// Run `operation` with retry on transient errors.
///
/// Non-transient errors propagate immediately. Once retries are exhausted
/// the transient error is reported as `Exhausted` so callers can decide
/// whether to tolerate the missing chunk.
pub async fn with_retry<T, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    mut f: F,
) -> PipelineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PipelineResult<T>>,
{
    let total_attempts = policy.max_retries + 1;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(PipelineError::Transient(reason)) if attempt <= policy.max_retries => {
                let delay = policy.backoff_delay(attempt);
                warn!(
                    operation,
                    attempt,
                    total_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %reason,
                    "transient failure, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }
            Err(PipelineError::Transient(reason)) => {
                error!(
                    operation,
                    attempts = attempt,
                    error = %reason,
                    "operation failed after exhausting retries"
                );
                return Err(PipelineError::Exhausted {
                    operation: operation.to_string(),
                    reason,
                });
            }
            Err(other) => return Err(other),
        }
    }
}

/// Split `items` into contiguous chunks of at most `size` elements.
pub fn partition<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    if size == 0 {
        return vec![items.to_vec()];
    }
    items.chunks(size).map(|c| c.to_vec()).collect()
}

/// Fetch a keyed batch in sequential chunks with per-chunk retry.
///
/// A chunk that exhausts its retries is logged and skipped; remaining
/// chunks still run and the union of successful chunks is returned.
/// Chunks partition the input, so the merge is disjoint. Any error other
/// than retry exhaustion aborts the whole call.
pub async fn fetch_chunked<V, F, Fut>(
    operation: &str,
    ids: &[String],
    chunk_size: usize,
    policy: &RetryPolicy,
    fetch: F,
) -> PipelineResult<HashMap<String, V>>
where
    F: Fn(Vec<String>) -> Fut,
    Fut: Future<Output = PipelineResult<HashMap<String, V>>>,
{
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let chunks = partition(ids, chunk_size);
    let total = chunks.len();
    let mut merged = HashMap::with_capacity(ids.len());

    for (index, chunk) in chunks.into_iter().enumerate() {
        let chunk_len = chunk.len();
        match with_retry(operation, policy, || fetch(chunk.clone())).await {
            Ok(part) => merged.extend(part),
            Err(PipelineError::Exhausted { reason, .. }) => {
                error!(
                    operation,
                    chunk = index + 1,
                    total_chunks = total,
                    chunk_len,
                    error = %reason,
                    "chunk failed after retries, continuing with remaining chunks"
                );
            }
            Err(other) => return Err(other),
        }
    }

    Ok(merged)
}
