//! Grouping of processed orders before publishing.
//!
//! A configured strategy partitions the successes into grouped messages and
//! individual orders. Keys whose set is smaller than the minimum group size
//! demote to individuals.

use std::collections::HashMap;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::models::reference::TIER_STANDARD;
use crate::models::{GroupedOrderMessage, ProcessedOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupingStrategy {
    ByCustomer,
    ByWarehouse,
    ByTier,
    HighValue,
    None,
}

impl GroupingStrategy {
    /// Unrecognized strategy names fall back to BY_CUSTOMER.
    pub fn parse(raw: &str) -> Self {
        match raw.to_uppercase().as_str() {
            "BY_CUSTOMER" => Self::ByCustomer,
            "BY_WAREHOUSE" => Self::ByWarehouse,
            "BY_TIER" => Self::ByTier,
            "HIGH_VALUE" => Self::HighValue,
            "NONE" => Self::None,
            other => {
                warn!(strategy = other, "unknown grouping strategy, defaulting to BY_CUSTOMER");
                Self::ByCustomer
            }
        }
    }
}

/// Outcome of grouping: grouped messages plus the orders left individual.
#[derive(Debug, Clone, Default)]
pub struct GroupingResult {
    pub grouped_messages: Vec<GroupedOrderMessage>,
    pub individual_orders: Vec<ProcessedOrder>,
}

impl GroupingResult {
    pub fn total_grouped_orders(&self) -> usize {
        self.grouped_messages.iter().map(|g| g.order_count).sum()
    }

    pub fn total_orders(&self) -> usize {
        self.total_grouped_orders() + self.individual_orders.len()
    }
}

pub struct OrderGroupingService {
    strategy: GroupingStrategy,
    high_value_threshold: BigDecimal,
    min_group_size: usize,
}

impl OrderGroupingService {
    pub fn new(
        strategy: &str,
        high_value_threshold: &str,
        min_group_size: usize,
    ) -> PipelineResult<Self> {
        let threshold = BigDecimal::from_str(high_value_threshold).map_err(|e| {
            PipelineError::Config(format!(
                "invalid grouping.high_value_threshold '{high_value_threshold}': {e}"
            ))
        })?;
        Ok(Self {
            strategy: GroupingStrategy::parse(strategy),
            high_value_threshold: threshold,
            min_group_size,
        })
    }

    pub fn strategy(&self) -> GroupingStrategy {
        self.strategy
    }

    /// Apply the configured strategy.
    pub fn group_orders(&self, orders: Vec<ProcessedOrder>) -> GroupingResult {
        if orders.is_empty() {
            return GroupingResult::default();
        }

        info!(
            order_count = orders.len(),
            strategy = ?self.strategy,
            "grouping orders"
        );

        match self.strategy {
            GroupingStrategy::ByCustomer => {
                self.group_by_key(orders, "CUSTOMER", |o| o.customer_id.clone())
            }
            GroupingStrategy::ByWarehouse => self.group_by_key(orders, "WAREHOUSE", |o| {
                if o.warehouse_location.is_empty() {
                    "UNKNOWN".to_string()
                } else {
                    o.warehouse_location.clone()
                }
            }),
            GroupingStrategy::ByTier => self.group_by_key(orders, "TIER", |o| {
                if o.customer_tier.is_empty() {
                    TIER_STANDARD.to_string()
                } else {
                    o.customer_tier.clone()
                }
            }),
            GroupingStrategy::HighValue => self.group_high_value(orders),
            GroupingStrategy::None => GroupingResult {
                grouped_messages: Vec::new(),
                individual_orders: orders,
            },
        }
    }

    fn group_by_key<F>(
        &self,
        orders: Vec<ProcessedOrder>,
        group_type: &str,
        key_fn: F,
    ) -> GroupingResult
    where
        F: Fn(&ProcessedOrder) -> String,
    {
        let mut by_key: HashMap<String, Vec<ProcessedOrder>> = HashMap::new();
        for order in orders {
            by_key.entry(key_fn(&order)).or_default().push(order);
        }

        let mut result = GroupingResult::default();
        for (key, group) in by_key {
            if group.len() >= self.min_group_size {
                debug!(key = %key, size = group.len(), "created group");
                result
                    .grouped_messages
                    .push(GroupedOrderMessage::create(&key, group_type, group));
            } else {
                result.individual_orders.extend(group);
            }
        }

        info!(
            grouped_messages = result.grouped_messages.len(),
            grouped_orders = result.total_grouped_orders(),
            individual_orders = result.individual_orders.len(),
            "grouping complete"
        );
        result
    }

    /// High-value orders above the threshold form one group (if large
    /// enough); everything else publishes individually.
    fn group_high_value(&self, orders: Vec<ProcessedOrder>) -> GroupingResult {
        let (high, regular): (Vec<_>, Vec<_>) = orders
            .into_iter()
            .partition(|o| o.final_price >= self.high_value_threshold);

        let mut result = GroupingResult {
            grouped_messages: Vec::new(),
            individual_orders: regular,
        };

        if high.len() >= self.min_group_size {
            info!(
                count = high.len(),
                threshold = %self.high_value_threshold,
                "grouped high-value orders"
            );
            result
                .grouped_messages
                .push(GroupedOrderMessage::create("HIGH_VALUE", "HIGH_VALUE", high));
        } else {
            result.individual_orders.extend(high);
        }
        result
    }
}
