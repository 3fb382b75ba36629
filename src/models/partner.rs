//! Trading partner and business unit status rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const STATUS_ACTIVE: &str = "ACTIVE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingPartnerStatus {
    pub partner_id: String,
    pub partner_name: String,
    pub status: String,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TradingPartnerStatus {
    /// INACTIVE and SUSPENDED both count as inactive.
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessUnitStatus {
    pub unit_id: String,
    pub unit_name: String,
    pub status: String,
    pub updated_at: Option<DateTime<Utc>>,
}

impl BusinessUnitStatus {
    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }
}
