//! Core business logic: per-order transform under a global concurrency gate.
//!
//! Every order fans out to its own task, gated by a counting semaphore so
//! steady-state CPU load stays bounded no matter how large the batch or the
//! runtime. The transform itself is a pure function of the order and the
//! preloaded context.

use std::sync::Arc;
use std::time::Instant;

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::models::processed::{
    PROCESSED_BY, SHIP_BACKORDER, SHIP_LOW_STOCK, SHIP_PENDING_INVENTORY, SHIP_READY,
};
use crate::models::reference::{TIER_GOLD, TIER_PREMIUM, TIER_STANDARD};
use crate::models::{CustomerData, FailedOrder, InventoryData, Order, PricingData, ProcessedOrder, ProcessingOutput};
use crate::services::preload::ProcessingContext;

pub struct BusinessLogicService {
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
}

impl BusinessLogicService {
    pub fn new(processing_concurrency: usize) -> Self {
        info!(
            processing_concurrency,
            "business logic service initialized"
        );
        Self {
            semaphore: Arc::new(Semaphore::new(processing_concurrency)),
            max_concurrency: processing_concurrency,
        }
    }

    /// Transform all orders in parallel under the processing gate.
    ///
    /// Every input order lands in exactly one of the two output lists.
    #[instrument(skip(self, orders, context), fields(order_count = orders.len()))]
    pub async fn process_orders(
        &self,
        orders: &[Order],
        context: Arc<ProcessingContext>,
    ) -> ProcessingOutput {
        if orders.is_empty() {
            return ProcessingOutput::default();
        }

        let started = Instant::now();
        info!(
            order_count = orders.len(),
            max_concurrent = self.max_concurrency,
            "processing orders in parallel"
        );

        let mut handles = Vec::with_capacity(orders.len());
        for order in orders {
            let order = order.clone();
            let fallback = order.clone();
            let context = context.clone();
            let semaphore = self.semaphore.clone();
            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| FailedOrder::new(order.clone(), "processing gate closed", "Cancelled"))?;
                transform_order(&order, &context)
                    .map_err(|e| FailedOrder::from_error(order, &e))
            });
            handles.push((handle, fallback));
        }

        let mut output = ProcessingOutput::default();
        for (handle, order) in handles {
            match handle.await {
                Ok(Ok(processed)) => output.successes.push(processed),
                Ok(Err(failed)) => {
                    warn!(
                        order_id = %failed.order.id,
                        error = %failed.error_message,
                        "order transform failed"
                    );
                    output.failures.push(failed);
                }
                Err(join_err) if join_err.is_cancelled() => {
                    warn!(order_id = %order.id, "order transform cancelled");
                    output
                        .failures
                        .push(FailedOrder::new(order, "task cancelled", "Cancelled"));
                }
                Err(join_err) => {
                    warn!(order_id = %order.id, error = %join_err, "order transform panicked");
                    output
                        .failures
                        .push(FailedOrder::new(order, join_err.to_string(), "Panic"));
                }
            }
        }

        info!(
            successes = output.successes.len(),
            failures = output.failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "order processing complete"
        );
        output
    }
}

/// Pure per-order transform. Absent reference data degrades deterministically:
/// no customer -> "Unknown"/STANDARD, no inventory -> DEFAULT warehouse and
/// PENDING_INVENTORY, no pricing -> final price 0.00.
pub fn transform_order(
    order: &Order,
    context: &ProcessingContext,
) -> PipelineResult<ProcessedOrder> {
    let customer = context.customer(&order.id);
    let inventory = context.inventory(&order.id);
    let pricing = context.pricing(&order.id);

    let final_price =
        calculate_final_price(pricing, customer).map_err(|reason| PipelineError::Transform {
            order_id: order.id.clone(),
            reason,
        })?;
    let status = determine_status(inventory);

    Ok(ProcessedOrder {
        order_id: order.id.clone(),
        customer_id: order.customer_id.clone(),
        customer_name: customer
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        customer_tier: customer
            .map(|c| c.tier.clone())
            .unwrap_or_else(|| TIER_STANDARD.to_string()),
        final_price,
        warehouse_location: inventory
            .map(|i| i.warehouse_location.clone())
            .unwrap_or_else(|| "DEFAULT".to_string()),
        status: status.to_string(),
        processed_at: Utc::now(),
        processed_by: worker_name(),
    })
}

/// `round2(base * (1 - (discount + tier_bonus)) * (1 + tax))`, half-up at
/// scale 2. Absent pricing prices at zero. Discount and tax rate must be
/// fractions in [0, 1].
fn calculate_final_price(
    pricing: Option<&PricingData>,
    customer: Option<&CustomerData>,
) -> Result<BigDecimal, String> {
    let Some(pricing) = pricing else {
        return Ok(round2(BigDecimal::from(0)));
    };

    let zero = BigDecimal::from(0);
    let one = BigDecimal::from(1);
    if pricing.discount < zero || pricing.discount > one {
        return Err(format!("discount {} out of [0, 1]", pricing.discount));
    }
    if pricing.tax_rate < zero || pricing.tax_rate > one {
        return Err(format!("tax rate {} out of [0, 1]", pricing.tax_rate));
    }

    let mut discount = pricing.discount.clone();
    if let Some(customer) = customer {
        discount += tier_bonus(&customer.tier);
    }

    let discounted = pricing.base_price.clone() - pricing.base_price.clone() * discount;
    let total = discounted * (one + pricing.tax_rate.clone());
    Ok(round2(total))
}

fn tier_bonus(tier: &str) -> BigDecimal {
    // Exact decimals: 10/100 = 0.10, 5/100 = 0.05
    match tier {
        TIER_GOLD => BigDecimal::from(10) / BigDecimal::from(100),
        TIER_PREMIUM => BigDecimal::from(5) / BigDecimal::from(100),
        _ => BigDecimal::from(0),
    }
}

fn determine_status(inventory: Option<&InventoryData>) -> &'static str {
    match inventory {
        None => SHIP_PENDING_INVENTORY,
        Some(inv) if inv.quantity_available > 10 => SHIP_READY,
        Some(inv) if inv.quantity_available > 0 => SHIP_LOW_STOCK,
        Some(_) => SHIP_BACKORDER,
    }
}

fn round2(value: BigDecimal) -> BigDecimal {
    value.with_scale_round(2, RoundingMode::HalfUp)
}

fn worker_name() -> String {
    std::thread::current()
        .name()
        .unwrap_or(PROCESSED_BY)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::str::FromStr;

    fn order(id: &str, amount: i64) -> Order {
        Order {
            id: id.into(),
            customer_id: "CUST-1".into(),
            status: "PENDING".into(),
            amount: BigDecimal::from(amount),
            created_at: Utc::now(),
        }
    }

    fn customer(tier: &str) -> CustomerData {
        CustomerData {
            customer_id: "CUST-1".into(),
            name: "Acme Industrial".into(),
            email: "ops@acme.test".into(),
            tier: tier.into(),
        }
    }

    fn inventory(qty: i32) -> InventoryData {
        InventoryData {
            order_id: "O1".into(),
            sku: "SKU-1".into(),
            quantity_available: qty,
            warehouse_location: "WH-EAST".into(),
        }
    }

    fn pricing(base: &str, discount: &str, tax: &str) -> PricingData {
        PricingData {
            order_id: "O1".into(),
            base_price: BigDecimal::from_str(base).unwrap(),
            discount: BigDecimal::from_str(discount).unwrap(),
            tax_rate: BigDecimal::from_str(tax).unwrap(),
        }
    }

    fn context_for(
        id: &str,
        customer_data: Option<CustomerData>,
        inventory_data: Option<InventoryData>,
        pricing_data: Option<PricingData>,
    ) -> ProcessingContext {
        let mut ctx = ProcessingContext::empty();
        if let Some(c) = customer_data {
            ctx.customer_data.insert(id.to_string(), c);
        }
        if let Some(i) = inventory_data {
            ctx.inventory_data.insert(id.to_string(), i);
        }
        if let Some(p) = pricing_data {
            ctx.pricing_data.insert(id.to_string(), p);
        }
        ctx
    }

    #[test]
    fn gold_tier_price_matches_hand_computation() {
        // 50 * (1 - 0.10) * 1.08 = 48.60
        let ctx = context_for(
            "O1",
            Some(customer(TIER_GOLD)),
            Some(inventory(20)),
            Some(pricing("50", "0.00", "0.08")),
        );
        let processed = transform_order(&order("O1", 50), &ctx).unwrap();
        assert_eq!(processed.final_price, BigDecimal::from_str("48.60").unwrap());
        assert_eq!(processed.status, SHIP_READY);
    }

    #[test]
    fn premium_tier_adds_five_percent() {
        // 100 * (1 - 0.15) * 1.10 = 93.50
        let ctx = context_for(
            "O1",
            Some(customer(TIER_PREMIUM)),
            None,
            Some(pricing("100", "0.10", "0.10")),
        );
        let processed = transform_order(&order("O1", 100), &ctx).unwrap();
        assert_eq!(processed.final_price, BigDecimal::from_str("93.50").unwrap());
    }

    #[test]
    fn rounding_is_half_up_at_scale_two() {
        assert_eq!(
            round2(BigDecimal::from_str("10.405").unwrap()),
            BigDecimal::from_str("10.41").unwrap()
        );
        assert_eq!(
            round2(BigDecimal::from_str("10.404").unwrap()),
            BigDecimal::from_str("10.40").unwrap()
        );
    }

    #[test]
    fn missing_pricing_prices_at_zero() {
        let ctx = context_for("O1", Some(customer(TIER_GOLD)), Some(inventory(5)), None);
        let processed = transform_order(&order("O1", 50), &ctx).unwrap();
        assert_eq!(processed.final_price, BigDecimal::from_str("0.00").unwrap());
        assert_eq!(processed.status, SHIP_LOW_STOCK);
    }

    #[test]
    fn missing_customer_and_inventory_degrade() {
        let ctx = context_for("O1", None, None, Some(pricing("100", "0", "0")));
        let processed = transform_order(&order("O1", 100), &ctx).unwrap();
        assert_eq!(processed.customer_name, "Unknown");
        assert_eq!(processed.customer_tier, TIER_STANDARD);
        assert_eq!(processed.warehouse_location, "DEFAULT");
        assert_eq!(processed.status, SHIP_PENDING_INVENTORY);
    }

    #[test]
    fn out_of_range_discount_is_a_transform_error() {
        let ctx = context_for("O1", None, None, Some(pricing("100", "1.50", "0.05")));
        let err = transform_order(&order("O1", 100), &ctx).unwrap_err();
        assert!(matches!(err, PipelineError::Transform { .. }));
        assert_eq!(err.exception_type(), "TransformError");
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(determine_status(Some(&inventory(11))), SHIP_READY);
        assert_eq!(determine_status(Some(&inventory(10))), SHIP_LOW_STOCK);
        assert_eq!(determine_status(Some(&inventory(1))), SHIP_LOW_STOCK);
        assert_eq!(determine_status(Some(&inventory(0))), SHIP_BACKORDER);
        assert_eq!(determine_status(None), SHIP_PENDING_INVENTORY);
    }

    #[test]
    fn transform_is_deterministic_modulo_stamps() {
        let ctx = context_for(
            "O1",
            Some(customer(TIER_GOLD)),
            Some(inventory(20)),
            Some(pricing("150", "0.00", "0.08")),
        );
        let o = order("O1", 150);
        let first = transform_order(&o, &ctx).unwrap();
        let second = transform_order(&o, &ctx).unwrap();
        assert_eq!(first.final_price, second.final_price);
        assert_eq!(first.status, second.status);
        assert_eq!(first.customer_name, second.customer_name);
    }

    #[tokio::test]
    async fn every_order_lands_in_exactly_one_list() {
        let service = BusinessLogicService::new(4);
        let orders: Vec<Order> = (0..25).map(|i| order(&format!("O{i}"), 100)).collect();
        let mut ctx = ProcessingContext::empty();
        for o in &orders {
            ctx.pricing_data
                .insert(o.id.clone(), pricing("100", "0", "0.05"));
        }

        let output = service.process_orders(&orders, Arc::new(ctx)).await;
        assert_eq!(output.successes.len() + output.failures.len(), 25);
        assert_eq!(output.failures.len(), 0);

        let mut ids: Vec<String> = output
            .successes
            .iter()
            .map(|p| p.order_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 25, "no order appears twice");
    }

    #[tokio::test]
    async fn empty_input_produces_empty_output() {
        let service = BusinessLogicService::new(4);
        let output = service
            .process_orders(&[], Arc::new(ProcessingContext::empty()))
            .await;
        assert!(output.successes.is_empty());
        assert!(output.failures.is_empty());
    }

    #[test]
    fn gold_tier_prices_across_amounts() {
        // amounts 50, 150, 1000 with (base=amount, discount=0, tax=0.08), GOLD
        for (amount, expected) in [(50, "48.60"), (150, "145.80"), (1000, "972.00")] {
            let ctx = context_for(
                "O1",
                Some(customer(TIER_GOLD)),
                Some(inventory(20)),
                Some(pricing(&amount.to_string(), "0.00", "0.08")),
            );
            let processed = transform_order(&order("O1", amount), &ctx).unwrap();
            assert_eq!(
                processed.final_price,
                BigDecimal::from_str(expected).unwrap(),
                "amount {amount}"
            );
        }
    }

    #[test]
    fn unused_context_is_ignored() {
        let mut ctx = HashMap::new();
        ctx.insert(
            "other".to_string(),
            pricing("999", "0", "0"),
        );
        let ctx = ProcessingContext {
            pricing_data: ctx,
            ..ProcessingContext::empty()
        };
        let processed = transform_order(&order("O1", 10), &ctx).unwrap();
        assert_eq!(processed.final_price, BigDecimal::from_str("0.00").unwrap());
    }
}
