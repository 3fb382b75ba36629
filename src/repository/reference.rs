//! Reference-data repository over the relational store.
//!
//! Batch readers are chunked to respect the driver's bound-parameter cap,
//! retried per chunk with jittered backoff, and tolerate individual chunks
//! that exhaust their retries (the union of successful chunks is returned;
//! downstream degrades on absent keys).

use std::collections::HashMap;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument, warn};

use crate::error::PipelineResult;
use crate::models::{
    BusinessUnitStatus, CustomerData, InventoryData, Order, PricingData, TradingPartnerStatus,
};
use crate::repository::sql;
use crate::resilience::{fetch_chunked, RetryPolicy};

/// Typed read operations the pipeline needs from the relational store.
#[async_trait]
pub trait ReferenceDataSource: Send + Sync {
    /// Missing ids are omitted; result order is unspecified.
    async fn find_orders_by_ids(&self, ids: &[String]) -> PipelineResult<Vec<Order>>;
    async fn batch_fetch_customer_data(
        &self,
        ids: &[String],
    ) -> PipelineResult<HashMap<String, CustomerData>>;
    async fn batch_fetch_inventory_data(
        &self,
        ids: &[String],
    ) -> PipelineResult<HashMap<String, InventoryData>>;
    async fn batch_fetch_pricing_data(
        &self,
        ids: &[String],
    ) -> PipelineResult<HashMap<String, PricingData>>;
    async fn find_trading_partner_by_name(
        &self,
        name: &str,
    ) -> PipelineResult<Option<TradingPartnerStatus>>;
    async fn find_business_unit_by_name(
        &self,
        name: &str,
    ) -> PipelineResult<Option<BusinessUnitStatus>>;
}

/// Postgres-backed implementation using array binding (`= ANY($1)`).
#[derive(Debug, Clone)]
pub struct PgReferenceRepository {
    pool: PgPool,
    chunk_size: usize,
    retry: RetryPolicy,
}

impl PgReferenceRepository {
    pub fn new(pool: PgPool, chunk_size: usize, retry: RetryPolicy) -> Self {
        debug!(
            chunk_size,
            max_retries = retry.max_retries,
            base_delay_ms = retry.base_delay.as_millis() as u64,
            "reference repository initialized"
        );
        Self {
            pool,
            chunk_size,
            retry,
        }
    }

    async fn query_order_chunk(&self, ids: Vec<String>) -> PipelineResult<HashMap<String, Order>> {
        let rows = sqlx::query(sql::statement("find_orders_by_ids")?)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

        let mut result = HashMap::with_capacity(rows.len());
        for row in rows {
            let order = Order {
                id: row.try_get("order_id")?,
                customer_id: row.try_get("customer_id")?,
                status: row.try_get("status")?,
                amount: row.try_get::<BigDecimal, _>("amount")?,
                created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            };
            result.insert(order.id.clone(), order);
        }
        Ok(result)
    }

    async fn query_customer_chunk(
        &self,
        ids: Vec<String>,
    ) -> PipelineResult<HashMap<String, CustomerData>> {
        let rows = sqlx::query(sql::statement("batch_fetch_customer_data")?)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

        let mut result = HashMap::with_capacity(rows.len());
        for row in rows {
            result.insert(
                row.try_get("order_id")?,
                CustomerData {
                    customer_id: row.try_get("customer_id")?,
                    name: row.try_get("name")?,
                    email: row.try_get("email")?,
                    tier: row.try_get("tier")?,
                },
            );
        }
        Ok(result)
    }

    async fn query_inventory_chunk(
        &self,
        ids: Vec<String>,
    ) -> PipelineResult<HashMap<String, InventoryData>> {
        let rows = sqlx::query(sql::statement("batch_fetch_inventory_data")?)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

        let mut result = HashMap::with_capacity(rows.len());
        for row in rows {
            let order_id: String = row.try_get("order_id")?;
            result.insert(
                order_id.clone(),
                InventoryData {
                    order_id,
                    sku: row.try_get("sku")?,
                    quantity_available: row.try_get("quantity_available")?,
                    warehouse_location: row.try_get("warehouse_location")?,
                },
            );
        }
        Ok(result)
    }

    async fn query_pricing_chunk(
        &self,
        ids: Vec<String>,
    ) -> PipelineResult<HashMap<String, PricingData>> {
        let rows = sqlx::query(sql::statement("batch_fetch_pricing_data")?)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

        let mut result = HashMap::with_capacity(rows.len());
        for row in rows {
            let order_id: String = row.try_get("order_id")?;
            result.insert(
                order_id.clone(),
                PricingData {
                    order_id,
                    base_price: row.try_get::<BigDecimal, _>("base_price")?,
                    discount: row.try_get::<BigDecimal, _>("discount")?,
                    tax_rate: row.try_get::<BigDecimal, _>("tax_rate")?,
                },
            );
        }
        Ok(result)
    }
}

#[async_trait]
impl ReferenceDataSource for PgReferenceRepository {
    #[instrument(skip(self, ids), fields(id_count = ids.len()))]
    async fn find_orders_by_ids(&self, ids: &[String]) -> PipelineResult<Vec<Order>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let by_id = fetch_chunked(
            "find_orders_by_ids",
            ids,
            self.chunk_size,
            &self.retry,
            |chunk| self.query_order_chunk(chunk),
        )
        .await?;
        Ok(by_id.into_values().collect())
    }

    #[instrument(skip(self, ids), fields(id_count = ids.len()))]
    async fn batch_fetch_customer_data(
        &self,
        ids: &[String],
    ) -> PipelineResult<HashMap<String, CustomerData>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        fetch_chunked(
            "batch_fetch_customer_data",
            ids,
            self.chunk_size,
            &self.retry,
            |chunk| self.query_customer_chunk(chunk),
        )
        .await
    }

    #[instrument(skip(self, ids), fields(id_count = ids.len()))]
    async fn batch_fetch_inventory_data(
        &self,
        ids: &[String],
    ) -> PipelineResult<HashMap<String, InventoryData>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        fetch_chunked(
            "batch_fetch_inventory_data",
            ids,
            self.chunk_size,
            &self.retry,
            |chunk| self.query_inventory_chunk(chunk),
        )
        .await
    }

    #[instrument(skip(self, ids), fields(id_count = ids.len()))]
    async fn batch_fetch_pricing_data(
        &self,
        ids: &[String],
    ) -> PipelineResult<HashMap<String, PricingData>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        fetch_chunked(
            "batch_fetch_pricing_data",
            ids,
            self.chunk_size,
            &self.retry,
            |chunk| self.query_pricing_chunk(chunk),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn find_trading_partner_by_name(
        &self,
        name: &str,
    ) -> PipelineResult<Option<TradingPartnerStatus>> {
        let row = sqlx::query(sql::statement("find_trading_partner_by_name")?)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            warn!(partner = name, "trading partner not found");
            return Ok(None);
        };
        Ok(Some(TradingPartnerStatus {
            partner_id: row.try_get("partner_id")?,
            partner_name: row.try_get("partner_name")?,
            status: row.try_get("status")?,
            updated_at: row.try_get::<Option<DateTime<Utc>>, _>("updated_at")?,
        }))
    }

    #[instrument(skip(self))]
    async fn find_business_unit_by_name(
        &self,
        name: &str,
    ) -> PipelineResult<Option<BusinessUnitStatus>> {
        let row = sqlx::query(sql::statement("find_business_unit_by_name")?)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            warn!(unit = name, "business unit not found");
            return Ok(None);
        };
        Ok(Some(BusinessUnitStatus {
            unit_id: row.try_get("unit_id")?,
            unit_name: row.try_get("unit_name")?,
            status: row.try_get("status")?,
            updated_at: row.try_get::<Option<DateTime<Utc>>, _>("updated_at")?,
        }))
    }
}
