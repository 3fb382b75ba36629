//! Inbound event consumed from the order-events topic.

use serde::{Deserialize, Serialize};

/// Event types whose orders are grouped before downstream publishing.
const GROUPED_EVENT_TYPES: [&str; 4] = [
    "BULK_ORDER",
    "BATCH_SHIPMENT",
    "CONSOLIDATE_ORDERS",
    "WAREHOUSE_BATCH",
];

/// Event types whose orders are published one message per order.
const INDIVIDUAL_EVENT_TYPES: [&str; 4] = [
    "SINGLE_ORDER",
    "EXPRESS_ORDER",
    "PRIORITY_ORDER",
    "PROCESS_ORDERS",
];

/// Event received from the input topic.
///
/// Carries the (trading partner, business unit) scope used to query pending
/// orders; it does not carry order ids itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub event_id: String,
    pub event_type: String,
    pub trading_partner_name: String,
    pub business_unit_name: String,
}

impl OrderEvent {
    /// Whether this event's orders are grouped for publishing.
    /// Unknown event types publish individually.
    pub fn requires_grouping(&self) -> bool {
        let upper = self.event_type.to_uppercase();
        GROUPED_EVENT_TYPES.contains(&upper.as_str())
    }

    pub fn is_known_event_type(&self) -> bool {
        let upper = self.event_type.to_uppercase();
        GROUPED_EVENT_TYPES.contains(&upper.as_str())
            || INDIVIDUAL_EVENT_TYPES.contains(&upper.as_str())
    }

    /// Deduplication key: `partner + "::" + unit`.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}::{}",
            self.trading_partner_name, self.business_unit_name
        )
    }
}
