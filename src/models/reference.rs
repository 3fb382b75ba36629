//! Relational reference data joined to orders during preload.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

pub const TIER_STANDARD: &str = "STANDARD";
pub const TIER_PREMIUM: &str = "PREMIUM";
pub const TIER_GOLD: &str = "GOLD";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerData {
    pub customer_id: String,
    pub name: String,
    pub email: String,
    pub tier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryData {
    pub order_id: String,
    pub sku: String,
    pub quantity_available: i32,
    pub warehouse_location: String,
}

/// `discount` and `tax_rate` are fractions in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingData {
    pub order_id: String,
    pub base_price: BigDecimal,
    pub discount: BigDecimal,
    pub tax_rate: BigDecimal,
}
