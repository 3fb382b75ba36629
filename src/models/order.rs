//! Order as read from the pending-order document collection.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const STATUS_PENDING: &str = "PENDING";
pub const STATUS_PROCESSED: &str = "PROCESSED";

/// Snapshot of one pending order; the document store is the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub customer_id: String,
    pub status: String,
    pub amount: BigDecimal,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn is_pending(&self) -> bool {
        self.status == STATUS_PENDING
    }
}

/// Line item inside an order document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub sku: String,
    pub quantity: i32,
    pub price: BigDecimal,
}

/// Full document shape in the pending-order collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDocument {
    pub order_id: String,
    pub customer_id: String,
    pub trading_partner_name: String,
    pub business_unit_name: String,
    pub status: String,
    pub amount: BigDecimal,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl OrderDocument {
    /// Project the document onto the Order shape used by the pipeline.
    pub fn into_order(self) -> Order {
        Order {
            id: self.order_id,
            customer_id: self.customer_id,
            status: self.status,
            amount: self.amount,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn document_projects_onto_order() {
        let doc = OrderDocument {
            order_id: "O1".into(),
            customer_id: "CUST-1".into(),
            trading_partner_name: "ACME".into(),
            business_unit_name: "WEST".into(),
            status: STATUS_PENDING.into(),
            amount: BigDecimal::from_str("150.00").unwrap(),
            created_at: Utc::now(),
            items: vec![],
        };
        let order = doc.into_order();
        assert_eq!(order.id, "O1");
        assert!(order.is_pending());
    }
}
