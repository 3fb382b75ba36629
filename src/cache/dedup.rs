//! Event deduplication (scope-level idempotency).
//!
//! At-least-once delivery plus rebalance-induced retries can re-deliver an
//! event for the same (trading partner, business unit) scope. A bounded TTL
//! cache of dedup keys suppresses the duplicates for the TTL window.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;

use crate::cache::{CacheStats, TypedCache};
use crate::models::OrderEvent;

/// Tracks processed (partner, unit) scopes; value is the claim timestamp.
#[derive(Debug, Clone)]
pub struct DedupService {
    cache: Arc<TypedCache<i64>>,
}

impl DedupService {
    pub fn new(max_size: u64, ttl: Duration) -> Self {
        Self {
            cache: Arc::new(TypedCache::new("event_dedup", max_size, ttl)),
        }
    }

    /// Atomically claim the event's scope. Returns true iff the key was
    /// absent; a true result holds the claim for the rest of its TTL.
    pub fn try_acquire(&self, event: &OrderEvent) -> bool {
        let key = event.dedup_key();
        let acquired = self.cache.try_insert(&key, Utc::now().timestamp_millis());
        if !acquired {
            warn!(
                trading_partner = %event.trading_partner_name,
                business_unit = %event.business_unit_name,
                "duplicate event detected, skipping"
            );
        }
        acquired
    }

    pub fn is_duplicate(&self, event: &OrderEvent) -> bool {
        self.cache.get(&event.dedup_key()).is_some()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Release a claim early. Test/admin hook.
    pub fn release(&self, event: &OrderEvent) {
        self.cache.invalidate(&event.dedup_key());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(partner: &str, unit: &str) -> OrderEvent {
        OrderEvent {
            event_id: "e1".into(),
            event_type: "SINGLE_ORDER".into(),
            trading_partner_name: partner.into(),
            business_unit_name: unit.into(),
        }
    }

    #[test]
    fn first_acquire_wins_second_loses() {
        let dedup = DedupService::new(100, Duration::from_secs(3600));
        let e = event("ACME", "WEST");
        assert!(dedup.try_acquire(&e));
        assert!(!dedup.try_acquire(&e));
    }

    #[test]
    fn distinct_scopes_do_not_collide() {
        let dedup = DedupService::new(100, Duration::from_secs(3600));
        assert!(dedup.try_acquire(&event("ACME", "WEST")));
        assert!(dedup.try_acquire(&event("ACME", "EAST")));
        assert!(dedup.try_acquire(&event("GLOBEX", "WEST")));
    }

    #[test]
    fn is_duplicate_reflects_claims() {
        let dedup = DedupService::new(100, Duration::from_secs(3600));
        let e = event("ACME", "WEST");
        assert!(!dedup.is_duplicate(&e));
        dedup.try_acquire(&e);
        assert!(dedup.is_duplicate(&e));
    }

    #[test]
    fn release_allows_reacquire() {
        let dedup = DedupService::new(100, Duration::from_secs(3600));
        let e = event("ACME", "WEST");
        assert!(dedup.try_acquire(&e));
        dedup.release(&e);
        assert!(dedup.try_acquire(&e));
    }
}
