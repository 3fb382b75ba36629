//! Trading partner / business unit validation with cache-aside lookups.
//!
//! An event is skipped only when BOTH sides are inactive; a missing row
//! counts as inactive. Found statuses are cached; misses are not negatively
//! cached, so the next event retries the store.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::cache::{CacheStats, TypedCache};
use crate::error::PipelineResult;
use crate::models::{BusinessUnitStatus, OrderEvent, TradingPartnerStatus};
use crate::repository::ReferenceDataSource;

/// Outcome of validating one event.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub should_process: bool,
    pub partner_status: Option<TradingPartnerStatus>,
    pub unit_status: Option<BusinessUnitStatus>,
    pub skip_reason: Option<String>,
}

impl ValidationResult {
    fn process(
        partner: Option<TradingPartnerStatus>,
        unit: Option<BusinessUnitStatus>,
    ) -> Self {
        Self {
            should_process: true,
            partner_status: partner,
            unit_status: unit,
            skip_reason: None,
        }
    }

    fn skip(
        partner: Option<TradingPartnerStatus>,
        unit: Option<BusinessUnitStatus>,
        reason: String,
    ) -> Self {
        Self {
            should_process: false,
            partner_status: partner,
            unit_status: unit,
            skip_reason: Some(reason),
        }
    }
}

pub struct PartnerValidationService {
    repository: Arc<dyn ReferenceDataSource>,
    partner_cache: TypedCache<TradingPartnerStatus>,
    unit_cache: TypedCache<BusinessUnitStatus>,
}

impl PartnerValidationService {
    pub fn new(
        repository: Arc<dyn ReferenceDataSource>,
        cache_max_size: u64,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            repository,
            partner_cache: TypedCache::new("trading_partner", cache_max_size, cache_ttl),
            unit_cache: TypedCache::new("business_unit", cache_max_size, cache_ttl),
        }
    }

    /// Decide whether to process or skip the event.
    #[instrument(skip(self, event), fields(event_id = %event.event_id))]
    pub async fn validate_event(&self, event: &OrderEvent) -> PipelineResult<ValidationResult> {
        let partner_name = event.trading_partner_name.as_str();
        let unit_name = event.business_unit_name.as_str();

        let partner = self.partner_status(partner_name).await?;
        let unit = self.unit_status(unit_name).await?;

        let partner_inactive = partner.as_ref().map_or(true, |p| !p.is_active());
        let unit_inactive = unit.as_ref().map_or(true, |u| !u.is_active());

        if partner_inactive && unit_inactive {
            let reason = skip_reason(partner.as_ref(), unit.as_ref(), partner_name, unit_name);
            warn!(reason = %reason, "skipping event");
            return Ok(ValidationResult::skip(partner, unit, reason));
        }

        debug!(
            partner = partner_name,
            partner_status = partner.as_ref().map(|p| p.status.as_str()).unwrap_or("NOT_FOUND"),
            unit = unit_name,
            unit_status = unit.as_ref().map(|u| u.status.as_str()).unwrap_or("NOT_FOUND"),
            "event validation passed"
        );
        Ok(ValidationResult::process(partner, unit))
    }

    async fn partner_status(&self, name: &str) -> PipelineResult<Option<TradingPartnerStatus>> {
        if let Some(cached) = self.partner_cache.get(name) {
            return Ok(Some(cached));
        }
        let from_store = self.repository.find_trading_partner_by_name(name).await?;
        if let Some(status) = &from_store {
            self.partner_cache.insert(name.to_string(), status.clone());
        }
        Ok(from_store)
    }

    async fn unit_status(&self, name: &str) -> PipelineResult<Option<BusinessUnitStatus>> {
        if let Some(cached) = self.unit_cache.get(name) {
            return Ok(Some(cached));
        }
        let from_store = self.repository.find_business_unit_by_name(name).await?;
        if let Some(status) = &from_store {
            self.unit_cache.insert(name.to_string(), status.clone());
        }
        Ok(from_store)
    }

    pub fn invalidate_partner(&self, name: &str) {
        self.partner_cache.invalidate(name);
    }

    pub fn invalidate_unit(&self, name: &str) {
        self.unit_cache.invalidate(name);
    }

    pub fn invalidate_all(&self) {
        self.partner_cache.invalidate_all();
        self.unit_cache.invalidate_all();
    }

    pub fn cache_stats(&self) -> (CacheStats, CacheStats) {
        (self.partner_cache.stats(), self.unit_cache.stats())
    }
}

fn skip_reason(
    partner: Option<&TradingPartnerStatus>,
    unit: Option<&BusinessUnitStatus>,
    partner_name: &str,
    unit_name: &str,
) -> String {
    let partner_part = match partner {
        Some(p) => format!("partner '{partner_name}' {}", p.status),
        None => format!("partner '{partner_name}' NOT_FOUND"),
    };
    let unit_part = match unit {
        Some(u) => format!("unit '{unit_name}' {}", u.status),
        None => format!("unit '{unit_name}' NOT_FOUND"),
    };
    format!("BOTH INACTIVE - {partner_part}, {unit_part}")
}
