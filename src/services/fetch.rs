//! Order fetching from the pending-order document collection.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, instrument};

use crate::error::{PipelineError, PipelineResult};
use crate::models::order::STATUS_PROCESSED;
use crate::models::{Order, OrderEvent};
use crate::repository::OrderDocumentSource;

pub struct OrderFetchService {
    source: Arc<dyn OrderDocumentSource>,
}

impl OrderFetchService {
    pub fn new(source: Arc<dyn OrderDocumentSource>) -> Self {
        Self { source }
    }

    /// Fetch pending orders for the event's scope. Any store failure is
    /// fatal for the event (the caller skips the commit so the broker
    /// redelivers).
    #[instrument(skip(self, event), fields(event_id = %event.event_id))]
    pub async fn fetch_orders_for_event(&self, event: &OrderEvent) -> PipelineResult<Vec<Order>> {
        let started = Instant::now();
        let orders = self
            .source
            .fetch_pending_for_event(event)
            .await
            .map_err(|e| match e {
                fetch @ PipelineError::Fetch(_) => fetch,
                other => PipelineError::Fetch(other.to_string()),
            })?;
        info!(
            order_count = orders.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetched pending orders"
        );
        Ok(orders)
    }

    /// Best-effort status write-back, detached from the commit path.
    pub fn mark_processed_in_background(&self, order_ids: Vec<String>) {
        if order_ids.is_empty() {
            return;
        }
        let source = self.source.clone();
        tokio::spawn(async move {
            if let Err(e) = source.batch_update_status(&order_ids, STATUS_PROCESSED).await {
                error!(
                    count = order_ids.len(),
                    error = %e,
                    "background order status update failed"
                );
            }
        });
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FailingSource;

    #[async_trait]
    impl OrderDocumentSource for FailingSource {
        async fn fetch_pending_for_event(
            &self,
            _event: &OrderEvent,
        ) -> PipelineResult<Vec<Order>> {
            Err(PipelineError::Transient("socket closed".into()))
        }

        async fn batch_update_status(
            &self,
            _ids: &[String],
            _status: &str,
        ) -> PipelineResult<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn store_failures_surface_as_fetch_errors() {
        let service = OrderFetchService::new(Arc::new(FailingSource));
        let event = OrderEvent {
            event_id: "e1".into(),
            event_type: "SINGLE_ORDER".into(),
            trading_partner_name: "ACME".into(),
            business_unit_name: "WEST".into(),
        };
        let result = service.fetch_orders_for_event(&event).await;
        assert!(matches!(result, Err(PipelineError::Fetch(_))));
    }
}
