//! Order pipeline consumer.
//!
//! Wires configuration, the connection pool, caches, and the pipeline
//! services, then drives the consume -> handle -> commit loop against the
//! input event queue.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use orderflow_core::cache::DedupService;
use orderflow_core::config::AppConfig;
use orderflow_core::handler::{EventSource, OrderEventHandler, PgmqEventSource};
use orderflow_core::logging;
use orderflow_core::messaging::{
    MockQueuePublisher, PgmqClient, PgmqQueuePublisher, QueuePublisher,
};
use orderflow_core::metrics::AppMetrics;
use orderflow_core::repository::{
    MockOrderSource, OrderDocumentSource, PgDocumentStore, PgReferenceRepository,
    ReferenceDataSource,
};
use orderflow_core::resilience::RetryPolicy;
use orderflow_core::services::{
    BusinessLogicService, CachingDataService, DataCaches, DataPreloadService, LogDeadLetterSink,
    OrderFetchService, OrderGroupingService, OrderProcessingOrchestrator, PartnerValidationService,
    PublishingService,
};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging();
    let config = AppConfig::load()?;

    let database_url = config
        .database_url
        .clone()
        .ok_or_else(|| anyhow!("DATABASE_URL must be set"))?;
    let pool = PgPoolOptions::new()
        .max_connections(config.db.max_connections)
        .connect(&database_url)
        .await?;

    let metrics = Arc::new(AppMetrics::new());
    let retry = RetryPolicy::new(config.db.max_retries, config.db.retry_delay_ms);
    let repository: Arc<dyn ReferenceDataSource> = Arc::new(PgReferenceRepository::new(
        pool.clone(),
        config.db.chunk_size,
        retry,
    ));

    let dedup = Arc::new(DedupService::new(
        config.cache.dedup.max_size,
        config.cache.dedup.ttl(),
    ));
    let validator = Arc::new(PartnerValidationService::new(
        repository.clone(),
        config.cache.partner.max_size,
        config.cache.partner.ttl(),
    ));

    let document_source: Arc<dyn OrderDocumentSource> = if config.document_store.enabled {
        Arc::new(PgDocumentStore::new(pool.clone(), config.document_store.top_n))
    } else {
        info!("document store disabled, serving mock orders");
        Arc::new(MockOrderSource::default())
    };
    let fetch = Arc::new(OrderFetchService::new(document_source));

    let preload = Arc::new(DataPreloadService::new(
        repository.clone(),
        config.db.chunk_size,
        config.executor.db_concurrency,
        metrics.clone(),
    ));
    let caches = Arc::new(DataCaches::new(
        config.cache.data.max_size,
        config.cache.data.ttl(),
    ));
    let caching_preload = Arc::new(CachingDataService::new(
        repository.clone(),
        caches,
        metrics.clone(),
    ));
    let business = Arc::new(BusinessLogicService::new(
        config.executor.processing_concurrency,
    ));
    let grouping = Arc::new(OrderGroupingService::new(
        &config.grouping.strategy,
        &config.grouping.high_value_threshold,
        config.grouping.min_group_size,
    )?);

    let pgmq = PgmqClient::new(pool.clone());
    let publisher: Arc<dyn QueuePublisher> = if config.queue.enabled {
        pgmq.create_queue(&config.queue.name).await?;
        Arc::new(PgmqQueuePublisher::new(pgmq.clone(), config.queue.name.clone()))
    } else {
        info!("downstream queue disabled, publishing to mock destination");
        Arc::new(MockQueuePublisher::new())
    };
    let publishing = Arc::new(PublishingService::new(
        publisher,
        grouping,
        config.queue.publish_concurrency,
        metrics.clone(),
    ));

    let orchestrator = Arc::new(OrderProcessingOrchestrator::new(
        preload,
        caching_preload,
        business,
        publishing,
        metrics.clone(),
        config.cache.data_enabled,
    ));
    let handler = OrderEventHandler::new(
        dedup,
        validator,
        fetch,
        orchestrator,
        Arc::new(LogDeadLetterSink),
        metrics.clone(),
    );

    pgmq.create_queue(&config.events.queue).await?;
    let source = PgmqEventSource::new(
        pgmq,
        config.events.queue.clone(),
        config.events.visibility_timeout_secs,
        config.events.batch_size,
    );

    info!(queue = %config.events.queue, "consumer started");
    loop {
        let batch = match source.next_batch().await {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "event read failed, backing off");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };
        if batch.is_empty() {
            tokio::time::sleep(Duration::from_millis(500)).await;
            continue;
        }
        for inbound in &batch {
            if let Err(e) = handler.handle(inbound).await {
                // Skipped commit: the visibility timeout redelivers the event.
                error!(
                    event_id = %inbound.event.event_id,
                    error = %e,
                    "event processing failed, leaving for redelivery"
                );
            }
        }
    }
}
