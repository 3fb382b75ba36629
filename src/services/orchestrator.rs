//! Pipeline orchestration: preload, transform, publish, with stage timings.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument};

use crate::error::PipelineResult;
use crate::metrics::AppMetrics;
use crate::models::{Order, PipelineTimings, ProcessingResult};
use crate::services::caching_preload::CachingDataService;
use crate::services::preload::DataPreloadService;
use crate::services::processing::BusinessLogicService;
use crate::services::publishing::PublishingService;
use crate::trace::TraceContext;

pub struct OrderProcessingOrchestrator {
    preload: Arc<DataPreloadService>,
    caching_preload: Arc<CachingDataService>,
    business: Arc<BusinessLogicService>,
    publishing: Arc<PublishingService>,
    metrics: Arc<AppMetrics>,
    data_cache_enabled: bool,
}

impl OrderProcessingOrchestrator {
    pub fn new(
        preload: Arc<DataPreloadService>,
        caching_preload: Arc<CachingDataService>,
        business: Arc<BusinessLogicService>,
        publishing: Arc<PublishingService>,
        metrics: Arc<AppMetrics>,
        data_cache_enabled: bool,
    ) -> Self {
        Self {
            preload,
            caching_preload,
            business,
            publishing,
            metrics,
            data_cache_enabled,
        }
    }

    /// Run the full pipeline for one batch of orders.
    #[instrument(skip(self, orders, trace), fields(order_count = orders.len()))]
    pub async fn process_orders(
        &self,
        orders: Vec<Order>,
        use_grouping: bool,
        trace: &TraceContext,
    ) -> PipelineResult<ProcessingResult> {
        if orders.is_empty() {
            return Ok(ProcessingResult::empty());
        }

        let started = Instant::now();
        let order_ids: Vec<String> = orders.iter().map(|o| o.id.clone()).collect();

        info!(
            order_count = orders.len(),
            use_grouping,
            data_cache = self.data_cache_enabled,
            "pipeline start"
        );

        // Stage 1: reference-data preload
        let preload_start = Instant::now();
        let context = if self.data_cache_enabled {
            self.caching_preload.preload(&order_ids).await?
        } else {
            self.preload.preload(&order_ids).await?
        };
        let preload_ms = preload_start.elapsed().as_millis() as u64;

        // Stage 2: business logic
        let processing_start = Instant::now();
        let output = self
            .business
            .process_orders(&orders, Arc::new(context))
            .await;
        let processing_ms = processing_start.elapsed().as_millis() as u64;
        self.metrics
            .record_processing_time(processing_start.elapsed());

        // Stage 3: publish
        let publish_start = Instant::now();
        self.publishing
            .publish(output.successes.clone(), use_grouping, trace)
            .await;
        let publish_ms = publish_start.elapsed().as_millis() as u64;

        let total_ms = started.elapsed().as_millis() as u64;
        self.metrics
            .record_orders(output.successes.len(), output.failures.len());

        info!(
            total_ms,
            preload_ms,
            processing_ms,
            publish_ms,
            successes = output.successes.len(),
            failures = output.failures.len(),
            "pipeline complete"
        );

        Ok(ProcessingResult {
            successes: output.successes,
            failures: output.failures,
            timings: PipelineTimings {
                preload_ms,
                processing_ms,
                publish_ms,
                total_ms,
            },
        })
    }
}
