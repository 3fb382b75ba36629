//! Per-event entry point.
//!
//! State machine for one inbound event: dedup, validate, fetch, orchestrate,
//! dead-letter, commit. Duplicate, skipped, and empty-fetch branches commit
//! immediately; any error in fetch, orchestration, or the dead-letter path
//! propagates without committing so the broker redelivers.

pub mod source;

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn, Instrument};

use crate::cache::DedupService;
use crate::error::PipelineResult;
use crate::metrics::AppMetrics;
use crate::models::OrderEvent;
use crate::services::dead_letter::DeadLetterSink;
use crate::services::fetch::OrderFetchService;
use crate::services::orchestrator::OrderProcessingOrchestrator;
use crate::services::validation::PartnerValidationService;
use crate::trace::TraceContext;

pub use source::{CommitHandle, EventSource, InMemoryEventSource, InboundEvent, PgmqEventSource};

pub struct OrderEventHandler {
    dedup: Arc<DedupService>,
    validator: Arc<PartnerValidationService>,
    fetch: Arc<OrderFetchService>,
    orchestrator: Arc<OrderProcessingOrchestrator>,
    dead_letter: Arc<dyn DeadLetterSink>,
    metrics: Arc<AppMetrics>,
}

impl OrderEventHandler {
    pub fn new(
        dedup: Arc<DedupService>,
        validator: Arc<PartnerValidationService>,
        fetch: Arc<OrderFetchService>,
        orchestrator: Arc<OrderProcessingOrchestrator>,
        dead_letter: Arc<dyn DeadLetterSink>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            dedup,
            validator,
            fetch,
            orchestrator,
            dead_letter,
            metrics,
        }
    }

    /// Handle one delivered event. An `Err` means the offset was NOT
    /// committed and the driver should let the event be redelivered.
    pub async fn handle(&self, inbound: &InboundEvent) -> PipelineResult<()> {
        let trace = TraceContext::from_inbound(inbound.trace_id.as_deref());
        let span = tracing::info_span!(
            "order_event",
            event_id = %inbound.event.event_id,
            trace_id = %trace.trace_id,
            span_id = %trace.span_id,
        );
        self.handle_inner(&inbound.event, inbound.commit.as_ref(), &trace)
            .instrument(span)
            .await
    }

    async fn handle_inner(
        &self,
        event: &OrderEvent,
        commit: &dyn CommitHandle,
        trace: &TraceContext,
    ) -> PipelineResult<()> {
        self.metrics.record_event_received();
        let started = Instant::now();

        info!(
            event_type = %event.event_type,
            trading_partner = %event.trading_partner_name,
            business_unit = %event.business_unit_name,
            "processing event"
        );

        // Deduplication: identical (partner, unit) within the TTL window
        // processes exactly once. The duplicate still commits.
        if !self.dedup.try_acquire(event) {
            self.metrics.record_duplicate_event();
            self.commit_offset(commit).await;
            return Ok(());
        }

        // Partner/unit validation (cached lookups). A skip decision commits;
        // a lookup failure propagates without committing.
        let validation = self.validator.validate_event(event).await?;
        if !validation.should_process {
            self.metrics.record_skipped_event();
            self.commit_offset(commit).await;
            return Ok(());
        }

        // Fetch pending orders for the scope. Empty scope commits.
        let orders = self.fetch.fetch_orders_for_event(event).await?;
        if orders.is_empty() {
            info!("no pending orders for event, committing");
            self.metrics.record_empty_fetch();
            self.commit_offset(commit).await;
            return Ok(());
        }

        // Preload, transform, publish.
        let result = self
            .orchestrator
            .process_orders(orders, event.requires_grouping(), trace)
            .await?;

        // Transform failures go to the dead-letter sink before the commit;
        // a sink failure blocks the commit.
        if result.has_failures() {
            self.dead_letter.send(&result.failures).await?;
            self.metrics.record_dead_lettered(result.failures.len());
        }

        self.commit_offset(commit).await;

        // Best-effort status write-back, off the critical path.
        let succeeded_ids: Vec<String> =
            result.successes.iter().map(|p| p.order_id.clone()).collect();
        self.fetch.mark_processed_in_background(succeeded_ids);

        let elapsed = started.elapsed();
        self.metrics.record_event_completed(elapsed);
        info!(
            successes = result.successes.len(),
            failures = result.failures.len(),
            total_ms = result.timings.total_ms,
            preload_ms = result.timings.preload_ms,
            processing_ms = result.timings.processing_ms,
            publish_ms = result.timings.publish_ms,
            "event complete"
        );
        Ok(())
    }

    /// Commit the offset. A commit failure is logged, not propagated: the
    /// broker redelivers and dedup suppresses the rerun.
    async fn commit_offset(&self, commit: &dyn CommitHandle) {
        if let Err(e) = commit.commit().await {
            warn!(error = %e, "offset commit failed");
        }
    }
}
