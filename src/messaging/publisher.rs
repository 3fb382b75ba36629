//! Downstream queue publisher seam.
//!
//! The publishing service serializes messages and fans out through this
//! trait; the pgmq implementation carries the trace id as a message header,
//! the mock records sends for local runs and assertions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::messaging::pgmq_client::PgmqClient;
use crate::trace::TRACE_HEADER;

/// One send to the downstream destination.
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    async fn publish(
        &self,
        payload: serde_json::Value,
        trace_id: Option<&str>,
    ) -> PipelineResult<()>;
}

/// Publishes to a pgmq queue, echoing the trace id via `X-Trace-Id`.
#[derive(Debug, Clone)]
pub struct PgmqQueuePublisher {
    client: PgmqClient,
    queue_name: String,
}

impl PgmqQueuePublisher {
    pub fn new(client: PgmqClient, queue_name: impl Into<String>) -> Self {
        Self {
            client,
            queue_name: queue_name.into(),
        }
    }
}

#[async_trait]
impl QueuePublisher for PgmqQueuePublisher {
    async fn publish(
        &self,
        payload: serde_json::Value,
        trace_id: Option<&str>,
    ) -> PipelineResult<()> {
        let headers = trace_id.map(|id| json!({ TRACE_HEADER: id }));
        self.client
            .send(&self.queue_name, &payload, headers.as_ref())
            .await
            .map_err(|e| PipelineError::Publish(e.to_string()))?;
        Ok(())
    }
}

/// Message captured by the mock publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub payload: serde_json::Value,
    pub trace_id: Option<String>,
}

/// Log-only publisher used when the downstream queue is disabled.
///
/// Records every send so tests can assert on message counts and shapes;
/// can be armed to fail the first N publishes.
#[derive(Debug, Default)]
pub struct MockQueuePublisher {
    sent: Mutex<Vec<SentMessage>>,
    remaining_failures: AtomicU64,
}

impl MockQueuePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publisher that fails its first `n` sends, then succeeds.
    pub fn failing_first(n: u64) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            remaining_failures: AtomicU64::new(n),
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().map(|v| v.len()).unwrap_or(0)
    }
}

#[async_trait]
impl QueuePublisher for MockQueuePublisher {
    async fn publish(
        &self,
        payload: serde_json::Value,
        trace_id: Option<&str>,
    ) -> PipelineResult<()> {
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .remaining_failures
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(PipelineError::Publish("mock publisher failure".into()));
        }

        debug!(trace_id, "[mock queue] message published");
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentMessage {
                payload,
                trace_id: trace_id.map(str::to_string),
            });
        }
        Ok(())
    }
}
