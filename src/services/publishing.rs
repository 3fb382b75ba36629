//! Publishing of processed orders to the downstream queue.
//!
//! Grouped-type events route through the grouper; everything else publishes
//! one message per order. Sends fan out under the publish semaphore and are
//! all awaited; individual send failures are counted and logged but never
//! fail the batch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument};

use crate::error::PipelineResult;
use crate::messaging::QueuePublisher;
use crate::metrics::AppMetrics;
use crate::models::ProcessedOrder;
use crate::services::grouping::OrderGroupingService;
use crate::trace::TraceContext;

pub struct PublishingService {
    publisher: Arc<dyn QueuePublisher>,
    grouping: Arc<OrderGroupingService>,
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    metrics: Arc<AppMetrics>,
}

/// Counts for one publish batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub grouped_messages: usize,
    pub individual_messages: usize,
    pub failures: usize,
}

impl PublishingService {
    pub fn new(
        publisher: Arc<dyn QueuePublisher>,
        grouping: Arc<OrderGroupingService>,
        publish_concurrency: usize,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        info!(publish_concurrency, "publishing service initialized");
        Self {
            publisher,
            grouping,
            semaphore: Arc::new(Semaphore::new(publish_concurrency)),
            max_concurrency: publish_concurrency,
            metrics,
        }
    }

    /// Publish the batch. Empty input sends nothing and takes no permits.
    #[instrument(skip(self, orders, trace), fields(order_count = orders.len()))]
    pub async fn publish(
        &self,
        orders: Vec<ProcessedOrder>,
        use_grouping: bool,
        trace: &TraceContext,
    ) -> PublishSummary {
        if orders.is_empty() {
            info!("no orders to publish");
            return PublishSummary::default();
        }

        let started = Instant::now();
        info!(
            order_count = orders.len(),
            use_grouping,
            max_concurrent = self.max_concurrency,
            "publishing to downstream queue"
        );

        let (grouped, individual) = if use_grouping {
            let result = self.grouping.group_orders(orders);
            (result.grouped_messages, result.individual_orders)
        } else {
            (Vec::new(), orders)
        };

        let mut payloads = Vec::with_capacity(grouped.len() + individual.len());
        let failures = Arc::new(AtomicUsize::new(0));
        let grouped_count = grouped.len();
        let individual_count = individual.len();

        for message in &grouped {
            match serde_json::to_value(message) {
                Ok(value) => payloads.push(value),
                Err(e) => {
                    error!(group_id = %message.group_id, error = %e, "failed to serialize grouped message");
                    failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        for order in &individual {
            match serde_json::to_value(order) {
                Ok(value) => payloads.push(value),
                Err(e) => {
                    error!(order_id = %order.order_id, error = %e, "failed to serialize order");
                    failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        let mut join_set: JoinSet<PipelineResult<()>> = JoinSet::new();
        for payload in payloads {
            let publisher = self.publisher.clone();
            let semaphore = self.semaphore.clone();
            let trace_id = trace.trace_id.clone();
            let failures = failures.clone();
            let metrics = self.metrics.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                match publisher.publish(payload, Some(&trace_id)).await {
                    Ok(()) => {
                        metrics.record_publish_success();
                        Ok(())
                    }
                    Err(e) => {
                        metrics.record_publish_failure();
                        failures.fetch_add(1, Ordering::Relaxed);
                        error!(error = %e, "message publish failed");
                        Ok(())
                    }
                }
            });
        }
        while join_set.join_next().await.is_some() {}

        let summary = PublishSummary {
            grouped_messages: grouped_count,
            individual_messages: individual_count,
            failures: failures.load(Ordering::Relaxed),
        };
        let elapsed = started.elapsed();
        self.metrics.record_publish_time(elapsed);
        info!(
            grouped = summary.grouped_messages,
            individual = summary.individual_messages,
            failures = summary.failures,
            elapsed_ms = elapsed.as_millis() as u64,
            "publish complete"
        );
        summary
    }
}
