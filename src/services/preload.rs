//! Batch preloading of reference data.
//!
//! One pipeline run issues three sibling fetch tasks (customer, inventory,
//! pricing) instead of N×3 point queries. Each task partitions the id list
//! into chunks sized for the IN-clause cap and runs the chunks concurrently,
//! optionally gated by the db-concurrency semaphore. The call returns only
//! after all three tasks join.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

use crate::error::{PipelineError, PipelineResult};
use crate::metrics::AppMetrics;
use crate::models::{CustomerData, InventoryData, PricingData};
use crate::repository::ReferenceDataSource;
use crate::resilience::partition;

/// Reference data for one pipeline run, keyed by order id.
/// Any key may be absent; the transform degrades deterministically.
#[derive(Debug, Clone, Default)]
pub struct ProcessingContext {
    pub customer_data: HashMap<String, CustomerData>,
    pub inventory_data: HashMap<String, InventoryData>,
    pub pricing_data: HashMap<String, PricingData>,
}

impl ProcessingContext {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn customer(&self, order_id: &str) -> Option<&CustomerData> {
        self.customer_data.get(order_id)
    }

    pub fn inventory(&self, order_id: &str) -> Option<&InventoryData> {
        self.inventory_data.get(order_id)
    }

    pub fn pricing(&self, order_id: &str) -> Option<&PricingData> {
        self.pricing_data.get(order_id)
    }
}

#[derive(Clone)]
pub struct DataPreloadService {
    repository: Arc<dyn ReferenceDataSource>,
    chunk_size: usize,
    /// Caps concurrent chunk queries across all three data types; None
    /// leaves chunk parallelism unbounded.
    db_semaphore: Option<Arc<Semaphore>>,
    metrics: Arc<AppMetrics>,
}

impl DataPreloadService {
    pub fn new(
        repository: Arc<dyn ReferenceDataSource>,
        chunk_size: usize,
        db_concurrency: usize,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        let db_semaphore = if db_concurrency > 0 {
            Some(Arc::new(Semaphore::new(db_concurrency)))
        } else {
            None
        };
        info!(chunk_size, db_concurrency, "data preload service initialized");
        Self {
            repository,
            chunk_size,
            db_semaphore,
            metrics,
        }
    }

    /// Preload all three data types for the given order ids.
    #[instrument(skip(self, order_ids), fields(order_count = order_ids.len()))]
    pub async fn preload(&self, order_ids: &[String]) -> PipelineResult<ProcessingContext> {
        if order_ids.is_empty() {
            return Ok(ProcessingContext::empty());
        }

        let started = Instant::now();
        let chunks = order_ids.len().div_ceil(self.chunk_size);
        info!(
            order_count = order_ids.len(),
            chunk_size = self.chunk_size,
            chunks,
            "preloading reference data with 3 parallel batch fetches"
        );

        let ids: Vec<String> = order_ids.to_vec();

        let customer_repo = self.repository.clone();
        let customers = tokio::spawn(load_in_chunks(
            ids.clone(),
            self.chunk_size,
            self.db_semaphore.clone(),
            move |chunk| {
                let repo = customer_repo.clone();
                async move { repo.batch_fetch_customer_data(&chunk).await }
            },
            "customer",
        ));

        let inventory_repo = self.repository.clone();
        let inventory = tokio::spawn(load_in_chunks(
            ids.clone(),
            self.chunk_size,
            self.db_semaphore.clone(),
            move |chunk| {
                let repo = inventory_repo.clone();
                async move { repo.batch_fetch_inventory_data(&chunk).await }
            },
            "inventory",
        ));

        let pricing_repo = self.repository.clone();
        let pricing = tokio::spawn(load_in_chunks(
            ids,
            self.chunk_size,
            self.db_semaphore.clone(),
            move |chunk| {
                let repo = pricing_repo.clone();
                async move { repo.batch_fetch_pricing_data(&chunk).await }
            },
            "pricing",
        ));

        let (customers, inventory, pricing) = tokio::try_join!(customers, inventory, pricing)
            .map_err(|e| PipelineError::Fatal(format!("preload task failed: {e}")))?;

        let context = ProcessingContext {
            customer_data: customers?,
            inventory_data: inventory?,
            pricing_data: pricing?,
        };

        let elapsed = started.elapsed();
        self.metrics.record_preload_time(elapsed);
        info!(
            elapsed_ms = elapsed.as_millis() as u64,
            customers = context.customer_data.len(),
            inventory = context.inventory_data.len(),
            pricing = context.pricing_data.len(),
            "reference data preload complete"
        );
        Ok(context)
    }
}

/// Fetch one data type: chunks run concurrently, each under an optional
/// db-concurrency permit. A chunk whose retries were exhausted upstream is
/// tolerated (its keys stay absent); any other error fails the whole load.
async fn load_in_chunks<V, F, Fut>(
    ids: Vec<String>,
    chunk_size: usize,
    semaphore: Option<Arc<Semaphore>>,
    loader: F,
    data_type: &'static str,
) -> PipelineResult<HashMap<String, V>>
where
    V: Send + 'static,
    F: Fn(Vec<String>) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = PipelineResult<HashMap<String, V>>> + Send + 'static,
{
    let chunks = partition(&ids, chunk_size);
    debug!(
        data_type,
        chunks = chunks.len(),
        "loading data in parallel chunks"
    );

    let mut join_set: JoinSet<PipelineResult<HashMap<String, V>>> = JoinSet::new();
    for chunk in chunks {
        let loader = loader.clone();
        let semaphore = semaphore.clone();
        join_set.spawn(async move {
            let _permit = match &semaphore {
                Some(sem) => Some(
                    sem.clone()
                        .acquire_owned()
                        .await
                        .map_err(|e| PipelineError::Fatal(format!("db semaphore closed: {e}")))?,
                ),
                None => None,
            };
            loader(chunk).await
        });
    }

    let mut merged = HashMap::with_capacity(ids.len());
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Ok(part)) => merged.extend(part),
            Ok(Err(PipelineError::Exhausted { operation, reason })) => {
                error!(
                    data_type,
                    operation,
                    error = %reason,
                    "chunk lost after retries, continuing with partial data"
                );
            }
            Ok(Err(other)) => {
                join_set.abort_all();
                return Err(other);
            }
            Err(join_err) => {
                join_set.abort_all();
                return Err(PipelineError::Fatal(format!(
                    "{data_type} chunk task failed: {join_err}"
                )));
            }
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BusinessUnitStatus, Order, TradingPartnerStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Repository stub: customers present for every id, inventory empty,
    /// pricing fails for a marked id's chunk.
    struct StubRepo {
        calls: AtomicUsize,
        poisoned_id: Option<String>,
    }

    impl StubRepo {
        fn new(poisoned_id: Option<&str>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                poisoned_id: poisoned_id.map(str::to_string),
            }
        }
    }

    #[async_trait]
    impl ReferenceDataSource for StubRepo {
        async fn find_orders_by_ids(&self, _ids: &[String]) -> PipelineResult<Vec<Order>> {
            Ok(Vec::new())
        }

        async fn batch_fetch_customer_data(
            &self,
            ids: &[String],
        ) -> PipelineResult<HashMap<String, CustomerData>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ids
                .iter()
                .map(|id| {
                    (
                        id.clone(),
                        CustomerData {
                            customer_id: format!("C-{id}"),
                            name: "Acme".into(),
                            email: "ops@acme.test".into(),
                            tier: "GOLD".into(),
                        },
                    )
                })
                .collect())
        }

        async fn batch_fetch_inventory_data(
            &self,
            _ids: &[String],
        ) -> PipelineResult<HashMap<String, InventoryData>> {
            Ok(HashMap::new())
        }

        async fn batch_fetch_pricing_data(
            &self,
            ids: &[String],
        ) -> PipelineResult<HashMap<String, PricingData>> {
            if let Some(poisoned) = &self.poisoned_id {
                if ids.contains(poisoned) {
                    return Err(PipelineError::Exhausted {
                        operation: "batch_fetch_pricing_data".into(),
                        reason: "connection reset".into(),
                    });
                }
            }
            Ok(ids
                .iter()
                .map(|id| {
                    (
                        id.clone(),
                        PricingData {
                            order_id: id.clone(),
                            base_price: 100.into(),
                            discount: 0.into(),
                            tax_rate: 0.into(),
                        },
                    )
                })
                .collect())
        }

        async fn find_trading_partner_by_name(
            &self,
            _name: &str,
        ) -> PipelineResult<Option<TradingPartnerStatus>> {
            Ok(None)
        }

        async fn find_business_unit_by_name(
            &self,
            _name: &str,
        ) -> PipelineResult<Option<BusinessUnitStatus>> {
            Ok(None)
        }
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("O{i}")).collect()
    }

    #[tokio::test]
    async fn empty_input_short_circuits() {
        let service = DataPreloadService::new(
            Arc::new(StubRepo::new(None)),
            500,
            10,
            Arc::new(AppMetrics::new()),
        );
        let ctx = service.preload(&[]).await.unwrap();
        assert!(ctx.customer_data.is_empty());
    }

    #[tokio::test]
    async fn preload_chunks_and_merges_all_types() {
        let repo = Arc::new(StubRepo::new(None));
        let service = DataPreloadService::new(repo.clone(), 2, 10, Arc::new(AppMetrics::new()));

        let order_ids = ids(5);
        let ctx = service.preload(&order_ids).await.unwrap();

        assert_eq!(ctx.customer_data.len(), 5);
        assert_eq!(ctx.pricing_data.len(), 5);
        assert!(ctx.inventory_data.is_empty());
        // 5 ids at chunk size 2 = 3 customer chunk calls
        assert_eq!(repo.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_chunk_leaves_keys_absent() {
        let repo = Arc::new(StubRepo::new(Some("O2")));
        let service = DataPreloadService::new(repo, 2, 10, Arc::new(AppMetrics::new()));

        let order_ids = ids(5);
        let ctx = service.preload(&order_ids).await.unwrap();

        // chunk [O2, O3] was lost; the rest survived
        assert_eq!(ctx.customer_data.len(), 5);
        assert_eq!(ctx.pricing_data.len(), 3);
        assert!(ctx.pricing("O2").is_none());
        assert!(ctx.pricing("O3").is_none());
        assert!(ctx.pricing("O4").is_some());
    }

    #[tokio::test]
    async fn zero_db_concurrency_disables_the_cap() {
        let service = DataPreloadService::new(
            Arc::new(StubRepo::new(None)),
            2,
            0,
            Arc::new(AppMetrics::new()),
        );
        let ctx = service.preload(&ids(4)).await.unwrap();
        assert_eq!(ctx.customer_data.len(), 4);
    }
}
