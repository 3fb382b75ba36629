//! Dead-letter sink for per-order transform failures.
//!
//! Pluggable so deployments can wire a real DLQ topic without touching the
//! event handler; the default sink logs each failed order.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::warn;

use crate::error::PipelineResult;
use crate::models::FailedOrder;

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn send(&self, failures: &[FailedOrder]) -> PipelineResult<()>;
}

/// Default sink: logs every failed order.
#[derive(Debug, Default, Clone)]
pub struct LogDeadLetterSink;

#[async_trait]
impl DeadLetterSink for LogDeadLetterSink {
    async fn send(&self, failures: &[FailedOrder]) -> PipelineResult<()> {
        if failures.is_empty() {
            return Ok(());
        }
        warn!(count = failures.len(), "publishing failed orders to dead letter sink");
        for failed in failures {
            warn!(
                order_id = %failed.order.id,
                error = %failed.error_message,
                exception_type = %failed.exception_type,
                "dead-lettered order"
            );
        }
        Ok(())
    }
}

/// Sink that records everything it receives; used in tests.
#[derive(Debug, Default)]
pub struct RecordingDeadLetterSink {
    received: Mutex<Vec<FailedOrder>>,
}

impl RecordingDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<FailedOrder> {
        self.received.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DeadLetterSink for RecordingDeadLetterSink {
    async fn send(&self, failures: &[FailedOrder]) -> PipelineResult<()> {
        if let Ok(mut received) = self.received.lock() {
            received.extend_from_slice(failures);
        }
        Ok(())
    }
}
