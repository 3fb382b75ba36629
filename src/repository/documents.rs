//! Pending-order document collection.
//!
//! The source of truth for pending orders. The Postgres-backed store keeps
//! one row per document; the mock source backs local runs and tests when
//! the store is disabled.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info, instrument};

use crate::error::{PipelineError, PipelineResult};
use crate::models::{Order, OrderDocument, OrderEvent, OrderItem};
use crate::repository::sql;

/// Scope-driven reads and best-effort writes on the pending-order collection.
#[async_trait]
pub trait OrderDocumentSource: Send + Sync {
    /// Pending orders for the event's scope. Resolution by presence:
    /// (partner AND unit) -> partner -> unit -> top-N oldest pending.
    async fn fetch_pending_for_event(&self, event: &OrderEvent) -> PipelineResult<Vec<Order>>;

    /// Multi-document status write. Best-effort: callers do not gate the
    /// offset commit on it.
    async fn batch_update_status(&self, ids: &[String], status: &str) -> PipelineResult<u64>;
}

#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
    top_n: i64,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool, top_n: i64) -> Self {
        Self { pool, top_n }
    }

    fn map_orders(rows: Vec<sqlx::postgres::PgRow>) -> PipelineResult<Vec<Order>> {
        rows.into_iter()
            .map(|row| {
                let items: Vec<OrderItem> = match row
                    .try_get::<Option<serde_json::Value>, _>("items")?
                {
                    Some(value) => serde_json::from_value(value)?,
                    None => Vec::new(),
                };
                let document = OrderDocument {
                    order_id: row.try_get("order_id")?,
                    customer_id: row.try_get("customer_id")?,
                    trading_partner_name: row.try_get("trading_partner_name")?,
                    business_unit_name: row.try_get("business_unit_name")?,
                    status: row.try_get("status")?,
                    amount: row.try_get::<BigDecimal, _>("amount")?,
                    created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
                    items,
                };
                Ok(document.into_order())
            })
            .collect()
    }
}

fn has_value(value: &str) -> bool {
    !value.trim().is_empty()
}

#[async_trait]
impl OrderDocumentSource for PgDocumentStore {
    #[instrument(skip(self, event), fields(event_id = %event.event_id))]
    async fn fetch_pending_for_event(&self, event: &OrderEvent) -> PipelineResult<Vec<Order>> {
        let partner = event.trading_partner_name.as_str();
        let unit = event.business_unit_name.as_str();

        let rows = if has_value(partner) && has_value(unit) {
            debug!(partner, unit, "fetching pending orders by partner and unit");
            sqlx::query(sql::statement("find_pending_by_partner_and_unit")?)
                .bind(partner)
                .bind(unit)
                .fetch_all(&self.pool)
                .await
        } else if has_value(partner) {
            debug!(partner, "fetching pending orders by partner");
            sqlx::query(sql::statement("find_pending_by_partner")?)
                .bind(partner)
                .fetch_all(&self.pool)
                .await
        } else if has_value(unit) {
            debug!(unit, "fetching pending orders by unit");
            sqlx::query(sql::statement("find_pending_by_unit")?)
                .bind(unit)
                .fetch_all(&self.pool)
                .await
        } else {
            debug!(top_n = self.top_n, "fetching oldest pending orders");
            sqlx::query(sql::statement("find_top_pending")?)
                .bind(self.top_n)
                .fetch_all(&self.pool)
                .await
        }
        .map_err(|e| PipelineError::Fetch(e.to_string()))?;

        Self::map_orders(rows)
    }

    #[instrument(skip(self, ids), fields(id_count = ids.len()))]
    async fn batch_update_status(&self, ids: &[String], status: &str) -> PipelineResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(sql::statement("update_document_status_by_ids")?)
            .bind(ids)
            .bind(status)
            .execute(&self.pool)
            .await?;
        info!(
            updated = result.rows_affected(),
            status, "batch updated order documents"
        );
        Ok(result.rows_affected())
    }
}

/// Deterministic in-memory source used when the document store is disabled.
///
/// Produces a fixed count of pending orders derived from the event scope so
/// local runs and tests see stable ids and amounts.
#[derive(Debug, Clone)]
pub struct MockOrderSource {
    count: usize,
}

impl Default for MockOrderSource {
    fn default() -> Self {
        Self { count: 5 }
    }
}

impl MockOrderSource {
    pub fn new(count: usize) -> Self {
        Self { count }
    }
}

#[async_trait]
impl OrderDocumentSource for MockOrderSource {
    async fn fetch_pending_for_event(&self, event: &OrderEvent) -> PipelineResult<Vec<Order>> {
        let mut hasher = DefaultHasher::new();
        event.trading_partner_name.hash(&mut hasher);
        let prefix = hasher.finish() % 1000;

        let now = Utc::now();
        let orders = (1..=self.count)
            .map(|i| Order {
                id: format!("ORD-{prefix}-{i}"),
                customer_id: format!("CUST-{}-{i}", event.business_unit_name),
                status: "PENDING".to_string(),
                amount: BigDecimal::from(100 + 175 * i as i64),
                created_at: now - ChronoDuration::minutes(i as i64),
            })
            .collect();
        debug!(count = self.count, "document store disabled, returning mock orders");
        Ok(orders)
    }

    async fn batch_update_status(&self, ids: &[String], status: &str) -> PipelineResult<u64> {
        debug!(
            count = ids.len(),
            status, "document store disabled, skipping status update"
        );
        Ok(0)
    }
}
