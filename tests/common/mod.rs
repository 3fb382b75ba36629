//! Shared harness: a fully wired pipeline over in-memory collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use std::str::FromStr;

use orderflow_core::cache::DedupService;
use orderflow_core::error::{PipelineError, PipelineResult};
use orderflow_core::handler::OrderEventHandler;
use orderflow_core::messaging::MockQueuePublisher;
use orderflow_core::metrics::AppMetrics;
use orderflow_core::models::{
    BusinessUnitStatus, CustomerData, InventoryData, Order, OrderEvent, PricingData,
    TradingPartnerStatus,
};
use orderflow_core::repository::{OrderDocumentSource, ReferenceDataSource};
use orderflow_core::services::{
    BusinessLogicService, CachingDataService, DataCaches, DataPreloadService,
    OrderFetchService, OrderGroupingService, OrderProcessingOrchestrator,
    PartnerValidationService, PublishingService, RecordingDeadLetterSink,
};

pub fn event(id: &str, event_type: &str, partner: &str, unit: &str) -> OrderEvent {
    OrderEvent {
        event_id: id.into(),
        event_type: event_type.into(),
        trading_partner_name: partner.into(),
        business_unit_name: unit.into(),
    }
}

pub fn order(id: &str, customer: &str, amount: i64) -> Order {
    Order {
        id: id.into(),
        customer_id: customer.into(),
        status: "PENDING".into(),
        amount: BigDecimal::from(amount),
        created_at: Utc::now(),
    }
}

pub fn decimal(raw: &str) -> BigDecimal {
    BigDecimal::from_str(raw).unwrap()
}

/// Scriptable reference-data repository.
#[derive(Default)]
pub struct ScriptedRepo {
    pub customers: Mutex<HashMap<String, CustomerData>>,
    pub inventory: Mutex<HashMap<String, InventoryData>>,
    pub pricing: Mutex<HashMap<String, PricingData>>,
    pub partners: Mutex<HashMap<String, TradingPartnerStatus>>,
    pub units: Mutex<HashMap<String, BusinessUnitStatus>>,
    /// Customer reads fail transiently this many times before succeeding.
    pub customer_transient_failures: AtomicUsize,
    pub customer_fetch_calls: AtomicUsize,
    pub partner_lookup_calls: AtomicUsize,
    /// Ids whose customer chunk is permanently lost (retries exhausted).
    pub lost_customer_ids: Mutex<Vec<String>>,
}

impl ScriptedRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_partner(self, name: &str, status: &str) -> Self {
        self.partners.lock().unwrap().insert(
            name.to_string(),
            TradingPartnerStatus {
                partner_id: format!("P-{name}"),
                partner_name: name.to_string(),
                status: status.to_string(),
                updated_at: None,
            },
        );
        self
    }

    pub fn with_unit(self, name: &str, status: &str) -> Self {
        self.units.lock().unwrap().insert(
            name.to_string(),
            BusinessUnitStatus {
                unit_id: format!("U-{name}"),
                unit_name: name.to_string(),
                status: status.to_string(),
                updated_at: None,
            },
        );
        self
    }

    /// Complete reference data for one order: GOLD customer, qty-20
    /// inventory, pricing (base, discount, tax).
    pub fn with_full_order_data(self, order_id: &str, base: &str, discount: &str, tax: &str) -> Self {
        self.customers.lock().unwrap().insert(
            order_id.to_string(),
            CustomerData {
                customer_id: "CUST-1".into(),
                name: "Acme Industrial".into(),
                email: "ops@acme.test".into(),
                tier: "GOLD".into(),
            },
        );
        self.inventory.lock().unwrap().insert(
            order_id.to_string(),
            InventoryData {
                order_id: order_id.to_string(),
                sku: format!("SKU-{order_id}"),
                quantity_available: 20,
                warehouse_location: "WH-EAST".into(),
            },
        );
        self.pricing.lock().unwrap().insert(
            order_id.to_string(),
            PricingData {
                order_id: order_id.to_string(),
                base_price: decimal(base),
                discount: decimal(discount),
                tax_rate: decimal(tax),
            },
        );
        self
    }
}

#[async_trait]
impl ReferenceDataSource for ScriptedRepo {
    async fn find_orders_by_ids(&self, ids: &[String]) -> PipelineResult<Vec<Order>> {
        let _ = ids;
        Ok(Vec::new())
    }

    async fn batch_fetch_customer_data(
        &self,
        ids: &[String],
    ) -> PipelineResult<HashMap<String, CustomerData>> {
        self.customer_fetch_calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.customer_transient_failures.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .customer_transient_failures
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(PipelineError::Transient("connection reset".into()));
        }

        let lost = self.lost_customer_ids.lock().unwrap();
        if ids.iter().any(|id| lost.contains(id)) {
            return Err(PipelineError::Exhausted {
                operation: "batch_fetch_customer_data".into(),
                reason: "connection reset".into(),
            });
        }

        let customers = self.customers.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| customers.get(id).map(|c| (id.clone(), c.clone())))
            .collect())
    }

    async fn batch_fetch_inventory_data(
        &self,
        ids: &[String],
    ) -> PipelineResult<HashMap<String, InventoryData>> {
        let inventory = self.inventory.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| inventory.get(id).map(|i| (id.clone(), i.clone())))
            .collect())
    }

    async fn batch_fetch_pricing_data(
        &self,
        ids: &[String],
    ) -> PipelineResult<HashMap<String, PricingData>> {
        let pricing = self.pricing.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| pricing.get(id).map(|p| (id.clone(), p.clone())))
            .collect())
    }

    async fn find_trading_partner_by_name(
        &self,
        name: &str,
    ) -> PipelineResult<Option<TradingPartnerStatus>> {
        self.partner_lookup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.partners.lock().unwrap().get(name).cloned())
    }

    async fn find_business_unit_by_name(
        &self,
        name: &str,
    ) -> PipelineResult<Option<BusinessUnitStatus>> {
        Ok(self.units.lock().unwrap().get(name).cloned())
    }
}

/// Document source that serves a fixed order list and counts calls.
#[derive(Default)]
pub struct StaticOrderSource {
    pub orders: Mutex<Vec<Order>>,
    pub fetch_calls: AtomicUsize,
    pub status_updates: Mutex<Vec<(Vec<String>, String)>>,
    pub fail_fetch: std::sync::atomic::AtomicBool,
}

impl StaticOrderSource {
    pub fn new(orders: Vec<Order>) -> Self {
        Self {
            orders: Mutex::new(orders),
            ..Self::default()
        }
    }
}

#[async_trait]
impl OrderDocumentSource for StaticOrderSource {
    async fn fetch_pending_for_event(&self, _event: &OrderEvent) -> PipelineResult<Vec<Order>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(PipelineError::Fetch("document store unreachable".into()));
        }
        Ok(self.orders.lock().unwrap().clone())
    }

    async fn batch_update_status(&self, ids: &[String], status: &str) -> PipelineResult<u64> {
        self.status_updates
            .lock()
            .unwrap()
            .push((ids.to_vec(), status.to_string()));
        Ok(ids.len() as u64)
    }
}

/// Fully wired pipeline over mocks, with the collaborators exposed for
/// assertions.
pub struct Harness {
    pub handler: OrderEventHandler,
    pub repo: Arc<ScriptedRepo>,
    pub orders: Arc<StaticOrderSource>,
    pub publisher: Arc<MockQueuePublisher>,
    pub dead_letter: Arc<RecordingDeadLetterSink>,
    pub metrics: Arc<AppMetrics>,
}

pub struct HarnessConfig {
    pub chunk_size: usize,
    pub grouping_strategy: &'static str,
    pub min_group_size: usize,
    pub data_cache_enabled: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            grouping_strategy: "BY_CUSTOMER",
            min_group_size: 2,
            data_cache_enabled: false,
        }
    }
}

pub fn build_harness(
    repo: ScriptedRepo,
    orders: Vec<Order>,
    config: HarnessConfig,
) -> Harness {
    let repo = Arc::new(repo);
    let orders = Arc::new(StaticOrderSource::new(orders));
    let publisher = Arc::new(MockQueuePublisher::new());
    let dead_letter = Arc::new(RecordingDeadLetterSink::new());
    let metrics = Arc::new(AppMetrics::new());

    let repo_dyn: Arc<dyn ReferenceDataSource> = repo.clone();
    let dedup = Arc::new(DedupService::new(50_000, Duration::from_secs(3600)));
    let validator = Arc::new(PartnerValidationService::new(
        repo_dyn.clone(),
        1_000,
        Duration::from_secs(600),
    ));
    let fetch = Arc::new(OrderFetchService::new(orders.clone()));
    let preload = Arc::new(DataPreloadService::new(
        repo_dyn.clone(),
        config.chunk_size,
        10,
        metrics.clone(),
    ));
    let caches = Arc::new(DataCaches::new(10_000, Duration::from_secs(300)));
    let caching_preload = Arc::new(CachingDataService::new(
        repo_dyn.clone(),
        caches,
        metrics.clone(),
    ));
    let business = Arc::new(BusinessLogicService::new(100));
    let grouping = Arc::new(
        OrderGroupingService::new(config.grouping_strategy, "1000", config.min_group_size)
            .unwrap(),
    );
    let publishing = Arc::new(PublishingService::new(
        publisher.clone(),
        grouping,
        50,
        metrics.clone(),
    ));
    let orchestrator = Arc::new(OrderProcessingOrchestrator::new(
        preload,
        caching_preload,
        business,
        publishing,
        metrics.clone(),
        config.data_cache_enabled,
    ));
    let handler = OrderEventHandler::new(
        dedup,
        validator,
        fetch,
        orchestrator,
        dead_letter.clone(),
        metrics.clone(),
    );

    Harness {
        handler,
        repo,
        orders,
        publisher,
        dead_letter,
        metrics,
    }
}
