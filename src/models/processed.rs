//! Outbound message shapes: per-order results and grouped messages.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::models::order::Order;

pub const SHIP_READY: &str = "READY_TO_SHIP";
pub const SHIP_LOW_STOCK: &str = "LOW_STOCK";
pub const SHIP_BACKORDER: &str = "BACKORDER";
pub const SHIP_PENDING_INVENTORY: &str = "PENDING_INVENTORY";

/// Service name stamped on outbound messages.
pub const PROCESSED_BY: &str = "orderflow-core";

/// Final per-order result published downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedOrder {
    pub order_id: String,
    pub customer_id: String,
    pub customer_name: String,
    pub customer_tier: String,
    pub final_price: BigDecimal,
    pub warehouse_location: String,
    pub status: String,
    pub processed_at: DateTime<Utc>,
    pub processed_by: String,
}

/// Per-order failure recorded in the result and handed to the dead-letter sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedOrder {
    pub order: Order,
    pub error_message: String,
    pub exception_type: String,
}

impl FailedOrder {
    pub fn new(order: Order, error_message: impl Into<String>, exception_type: impl Into<String>) -> Self {
        Self {
            order,
            error_message: error_message.into(),
            exception_type: exception_type.into(),
        }
    }

    pub fn from_error(order: Order, err: &PipelineError) -> Self {
        Self::new(order, err.to_string(), err.exception_type())
    }
}

/// Multiple orders combined into one downstream message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedOrderMessage {
    pub group_id: String,
    pub grouping_key: String,
    pub group_type: String,
    pub orders: Vec<ProcessedOrder>,
    pub order_count: usize,
    pub total_amount: BigDecimal,
    pub grouped_at: DateTime<Utc>,
    pub grouped_by: String,
}

impl GroupedOrderMessage {
    /// Build a grouped message; `total_amount` is the sum of final prices
    /// and the group id is unique per (creation instant, key).
    pub fn create(grouping_key: &str, group_type: &str, orders: Vec<ProcessedOrder>) -> Self {
        let total_amount = orders
            .iter()
            .fold(BigDecimal::from(0), |acc, o| acc + o.final_price.clone());

        let mut hasher = DefaultHasher::new();
        grouping_key.hash(&mut hasher);
        let group_id = format!(
            "GRP-{}-{:x}",
            Utc::now().timestamp_millis(),
            hasher.finish()
        );

        Self {
            group_id,
            grouping_key: grouping_key.to_string(),
            group_type: group_type.to_string(),
            order_count: orders.len(),
            total_amount,
            orders,
            grouped_at: Utc::now(),
            grouped_by: PROCESSED_BY.to_string(),
        }
    }
}
