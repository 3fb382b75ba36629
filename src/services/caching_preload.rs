//! Cache-aside layer in front of the reference-data repository.
//!
//! For each data type: split the id list into cache hits and misses, fetch
//! only the misses, write the fetched rows back, and merge. Reads come from
//! the cache; there is no write-through (reference data changes land from
//! external systems and expire via TTL).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use crate::cache::{CacheStats, TypedCache};
use crate::error::{PipelineError, PipelineResult};
use crate::metrics::AppMetrics;
use crate::models::{CustomerData, InventoryData, PricingData};
use crate::repository::ReferenceDataSource;
use crate::services::preload::ProcessingContext;

/// The three data caches, keyed by order id.
pub struct DataCaches {
    pub customer: Arc<TypedCache<CustomerData>>,
    pub inventory: Arc<TypedCache<InventoryData>>,
    pub pricing: Arc<TypedCache<PricingData>>,
}

impl DataCaches {
    pub fn new(max_size: u64, ttl: std::time::Duration) -> Self {
        Self {
            customer: Arc::new(TypedCache::new("customer_data", max_size, ttl)),
            inventory: Arc::new(TypedCache::new("inventory_data", max_size, ttl)),
            pricing: Arc::new(TypedCache::new("pricing_data", max_size, ttl)),
        }
    }

    pub fn stats(&self) -> [CacheStats; 3] {
        [
            self.customer.stats(),
            self.inventory.stats(),
            self.pricing.stats(),
        ]
    }

    pub fn invalidate_all(&self) {
        self.customer.invalidate_all();
        self.inventory.invalidate_all();
        self.pricing.invalidate_all();
    }
}

pub struct CachingDataService {
    repository: Arc<dyn ReferenceDataSource>,
    caches: Arc<DataCaches>,
    metrics: Arc<AppMetrics>,
}

/// Split of one id list against one cache.
struct CacheCheck<V> {
    cached: HashMap<String, V>,
    missing: Vec<String>,
}

impl CachingDataService {
    pub fn new(
        repository: Arc<dyn ReferenceDataSource>,
        caches: Arc<DataCaches>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            repository,
            caches,
            metrics,
        }
    }

    /// Preload with caching: hits from the cache, misses from the store.
    #[instrument(skip(self, order_ids), fields(order_count = order_ids.len()))]
    pub async fn preload(&self, order_ids: &[String]) -> PipelineResult<ProcessingContext> {
        if order_ids.is_empty() {
            return Ok(ProcessingContext::empty());
        }

        let started = Instant::now();

        let customer_check = check_cache(order_ids, &self.caches.customer);
        let inventory_check = check_cache(order_ids, &self.caches.inventory);
        let pricing_check = check_cache(order_ids, &self.caches.pricing);

        debug!(
            total = order_ids.len(),
            customer_hits = customer_check.cached.len(),
            inventory_hits = inventory_check.cached.len(),
            pricing_hits = pricing_check.cached.len(),
            "cache check complete"
        );

        let customer_repo = self.repository.clone();
        let customer_cache = self.caches.customer.clone();
        let customers = fetch_missing(customer_check.missing, move |ids| async move {
            let fetched = customer_repo.batch_fetch_customer_data(&ids).await?;
            for (key, value) in &fetched {
                customer_cache.insert(key.clone(), value.clone());
            }
            Ok(fetched)
        });

        let inventory_repo = self.repository.clone();
        let inventory_cache = self.caches.inventory.clone();
        let inventory = fetch_missing(inventory_check.missing, move |ids| async move {
            let fetched = inventory_repo.batch_fetch_inventory_data(&ids).await?;
            for (key, value) in &fetched {
                inventory_cache.insert(key.clone(), value.clone());
            }
            Ok(fetched)
        });

        let pricing_repo = self.repository.clone();
        let pricing_cache = self.caches.pricing.clone();
        let pricing = fetch_missing(pricing_check.missing, move |ids| async move {
            let fetched = pricing_repo.batch_fetch_pricing_data(&ids).await?;
            for (key, value) in &fetched {
                pricing_cache.insert(key.clone(), value.clone());
            }
            Ok(fetched)
        });

        let (customers, inventory, pricing) = tokio::try_join!(customers, inventory, pricing)
            .map_err(|e| PipelineError::Fatal(format!("cached preload task failed: {e}")))?;

        let context = ProcessingContext {
            customer_data: merge(customer_check.cached, customers?),
            inventory_data: merge(inventory_check.cached, inventory?),
            pricing_data: merge(pricing_check.cached, pricing?),
        };

        let elapsed = started.elapsed();
        self.metrics.record_preload_time(elapsed);
        info!(
            elapsed_ms = elapsed.as_millis() as u64,
            customers = context.customer_data.len(),
            inventory = context.inventory_data.len(),
            pricing = context.pricing_data.len(),
            "cached preload complete"
        );
        Ok(context)
    }

    pub fn cache_stats(&self) -> [CacheStats; 3] {
        self.caches.stats()
    }
}

fn check_cache<V: Clone + Send + Sync + 'static>(
    order_ids: &[String],
    cache: &TypedCache<V>,
) -> CacheCheck<V> {
    let mut cached = HashMap::new();
    let mut missing = Vec::new();
    for id in order_ids {
        match cache.get(id) {
            Some(value) => {
                cached.insert(id.clone(), value);
            }
            None => missing.push(id.clone()),
        }
    }
    CacheCheck { cached, missing }
}

/// Spawn the miss fetch; an empty miss set short-circuits without a task
/// hitting the repository.
fn fetch_missing<V, F, Fut>(
    missing: Vec<String>,
    fetch: F,
) -> JoinHandle<PipelineResult<HashMap<String, V>>>
where
    V: Send + 'static,
    F: FnOnce(Vec<String>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = PipelineResult<HashMap<String, V>>> + Send + 'static,
{
    tokio::spawn(async move {
        if missing.is_empty() {
            return Ok(HashMap::new());
        }
        debug!(count = missing.len(), "fetching cache misses from store");
        fetch(missing).await
    })
}

fn merge<V>(cached: HashMap<String, V>, fetched: HashMap<String, V>) -> HashMap<String, V> {
    let mut result = cached;
    result.extend(fetched);
    result
}
