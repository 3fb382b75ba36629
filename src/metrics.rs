//! Lock-free pipeline metrics.
//!
//! Counters and cumulative timers updated from the hot path with relaxed
//! atomics; `snapshot()` gives a consistent-enough view for tests and admin
//! surfaces. Export to an external registry is a collaborator concern.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Default)]
pub struct AppMetrics {
    events_received: AtomicU64,
    events_completed: AtomicU64,
    duplicate_events: AtomicU64,
    skipped_events: AtomicU64,
    empty_fetches: AtomicU64,
    orders_processed: AtomicU64,
    orders_failed: AtomicU64,
    messages_published: AtomicU64,
    publish_failures: AtomicU64,
    dead_lettered: AtomicU64,
    preload_millis: AtomicU64,
    processing_millis: AtomicU64,
    publish_millis: AtomicU64,
    event_millis: AtomicU64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_received: u64,
    pub events_completed: u64,
    pub duplicate_events: u64,
    pub skipped_events: u64,
    pub empty_fetches: u64,
    pub orders_processed: u64,
    pub orders_failed: u64,
    pub messages_published: u64,
    pub publish_failures: u64,
    pub dead_lettered: u64,
    pub preload_millis: u64,
    pub processing_millis: u64,
    pub publish_millis: u64,
    pub event_millis: u64,
}

impl AppMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_completed(&self, elapsed: Duration) {
        self.events_completed.fetch_add(1, Ordering::Relaxed);
        self.event_millis
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_duplicate_event(&self) {
        self.duplicate_events.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_skipped_event(&self) {
        self.skipped_events.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_empty_fetch(&self) {
        self.empty_fetches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_orders(&self, processed: usize, failed: usize) {
        self.orders_processed
            .fetch_add(processed as u64, Ordering::Relaxed);
        self.orders_failed.fetch_add(failed as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_publish_success(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dead_lettered(&self, count: usize) {
        self.dead_lettered.fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_preload_time(&self, elapsed: Duration) {
        self.preload_millis
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_processing_time(&self, elapsed: Duration) {
        self.processing_millis
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_publish_time(&self, elapsed: Duration) {
        self.publish_millis
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_completed: self.events_completed.load(Ordering::Relaxed),
            duplicate_events: self.duplicate_events.load(Ordering::Relaxed),
            skipped_events: self.skipped_events.load(Ordering::Relaxed),
            empty_fetches: self.empty_fetches.load(Ordering::Relaxed),
            orders_processed: self.orders_processed.load(Ordering::Relaxed),
            orders_failed: self.orders_failed.load(Ordering::Relaxed),
            messages_published: self.messages_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            preload_millis: self.preload_millis.load(Ordering::Relaxed),
            processing_millis: self.processing_millis.load(Ordering::Relaxed),
            publish_millis: self.publish_millis.load(Ordering::Relaxed),
            event_millis: self.event_millis.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = AppMetrics::new();
        metrics.record_event_received();
        metrics.record_orders(3, 1);
        metrics.record_publish_success();
        metrics.record_publish_failure();
        metrics.record_event_completed(Duration::from_millis(125));

        let snap = metrics.snapshot();
        assert_eq!(snap.events_received, 1);
        assert_eq!(snap.orders_processed, 3);
        assert_eq!(snap.orders_failed, 1);
        assert_eq!(snap.messages_published, 1);
        assert_eq!(snap.publish_failures, 1);
        assert_eq!(snap.event_millis, 125);
    }
}
