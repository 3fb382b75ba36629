//! Input event source seam.
//!
//! The consumer driver is external; the handler sees only `InboundEvent`s
//! carrying a per-record commit handle. The pgmq source reads with a
//! visibility timeout (uncommitted events become visible again, giving
//! at-least-once redelivery) and deletes on commit. The in-memory source
//! backs tests and local runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, error};

use crate::error::{PipelineError, PipelineResult};
use crate::messaging::PgmqClient;
use crate::models::OrderEvent;
use crate::trace::TRACE_HEADER;

/// Per-record manual commit. Idempotent at the driver level.
#[async_trait]
pub trait CommitHandle: Send + Sync {
    async fn commit(&self) -> PipelineResult<()>;
}

/// One delivered event plus its commit handle and optional inbound trace id.
pub struct InboundEvent {
    pub event: OrderEvent,
    pub trace_id: Option<String>,
    pub commit: Arc<dyn CommitHandle>,
}

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Next batch of events; empty when the queue is idle.
    async fn next_batch(&self) -> PipelineResult<Vec<InboundEvent>>;
}

/// pgmq-backed event source.
pub struct PgmqEventSource {
    client: PgmqClient,
    queue_name: String,
    visibility_timeout_secs: i32,
    batch_size: i32,
}

impl PgmqEventSource {
    pub fn new(
        client: PgmqClient,
        queue_name: impl Into<String>,
        visibility_timeout_secs: i32,
        batch_size: i32,
    ) -> Self {
        Self {
            client,
            queue_name: queue_name.into(),
            visibility_timeout_secs,
            batch_size,
        }
    }
}

struct PgmqCommitHandle {
    client: PgmqClient,
    queue_name: String,
    msg_id: i64,
}

#[async_trait]
impl CommitHandle for PgmqCommitHandle {
    async fn commit(&self) -> PipelineResult<()> {
        self.client.delete(&self.queue_name, self.msg_id).await?;
        debug!(queue = %self.queue_name, msg_id = self.msg_id, "offset committed");
        Ok(())
    }
}

#[async_trait]
impl EventSource for PgmqEventSource {
    async fn next_batch(&self) -> PipelineResult<Vec<InboundEvent>> {
        let messages = self
            .client
            .read(&self.queue_name, self.visibility_timeout_secs, self.batch_size)
            .await?;

        let mut batch = Vec::with_capacity(messages.len());
        for message in messages {
            let event: OrderEvent = match serde_json::from_value(message.message.clone()) {
                Ok(event) => event,
                Err(e) => {
                    // Poison message: park it in the archive so it stops
                    // blocking the queue.
                    error!(
                        msg_id = message.msg_id,
                        error = %e,
                        "undeserializable event, archiving"
                    );
                    self.client.archive(&self.queue_name, message.msg_id).await?;
                    continue;
                }
            };

            let trace_id = message
                .headers
                .as_ref()
                .and_then(|h| h.get(TRACE_HEADER))
                .and_then(|v| v.as_str())
                .map(str::to_string);

            batch.push(InboundEvent {
                event,
                trace_id,
                commit: Arc::new(PgmqCommitHandle {
                    client: self.client.clone(),
                    queue_name: self.queue_name.clone(),
                    msg_id: message.msg_id,
                }),
            });
        }
        Ok(batch)
    }
}

/// In-memory event source for tests and local runs.
#[derive(Default)]
pub struct InMemoryEventSource {
    pending: Mutex<VecDeque<(OrderEvent, Option<String>)>>,
    committed: Arc<Mutex<Vec<String>>>,
}

impl InMemoryEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: OrderEvent) {
        self.push_with_trace(event, None);
    }

    pub fn push_with_trace(&self, event: OrderEvent, trace_id: Option<String>) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.push_back((event, trace_id));
        }
    }

    /// Event ids whose commit handle was invoked.
    pub fn committed_ids(&self) -> Vec<String> {
        self.committed.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

struct InMemoryCommitHandle {
    event_id: String,
    committed_once: AtomicBool,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl CommitHandle for InMemoryCommitHandle {
    async fn commit(&self) -> PipelineResult<()> {
        // Idempotent: repeated commits record once.
        if !self.committed_once.swap(true, Ordering::SeqCst) {
            self.log
                .lock()
                .map_err(|_| PipelineError::Fatal("commit log poisoned".into()))?
                .push(self.event_id.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    async fn next_batch(&self) -> PipelineResult<Vec<InboundEvent>> {
        let drained: Vec<(OrderEvent, Option<String>)> = {
            let mut pending = self
                .pending
                .lock()
                .map_err(|_| PipelineError::Fatal("event queue poisoned".into()))?;
            pending.drain(..).collect()
        };

        Ok(drained
            .into_iter()
            .map(|(event, trace_id)| InboundEvent {
                commit: Arc::new(InMemoryCommitHandle {
                    event_id: event.event_id.clone(),
                    committed_once: AtomicBool::new(false),
                    log: self.committed.clone(),
                }),
                event,
                trace_id,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str) -> OrderEvent {
        OrderEvent {
            event_id: id.into(),
            event_type: "SINGLE_ORDER".into(),
            trading_partner_name: "ACME".into(),
            business_unit_name: "WEST".into(),
        }
    }

    #[tokio::test]
    async fn in_memory_source_drains_and_records_commits() {
        let source = InMemoryEventSource::new();
        source.push(event("e1"));
        source.push(event("e2"));

        let batch = source.next_batch().await.unwrap();
        assert_eq!(batch.len(), 2);
        assert!(source.next_batch().await.unwrap().is_empty());

        batch[0].commit.commit().await.unwrap();
        batch[0].commit.commit().await.unwrap();
        assert_eq!(source.committed_ids(), vec!["e1".to_string()]);
    }
}
