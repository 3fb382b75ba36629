//! Error types for the order processing pipeline.

use thiserror::Error;

/// Pipeline error taxonomy.
///
/// Transient data-access failures are retried locally; exhausted chunks
/// degrade to absent context keys; fetch and fatal errors prevent the
/// offset commit so the broker redelivers the event.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// Relational read failed and may succeed on retry.
    #[error("transient data access error: {0}")]
    Transient(String),
    /// Retries exceeded for one chunk; partial results are allowed.
    #[error("retries exhausted for '{operation}': {reason}")]
    Exhausted { operation: String, reason: String },
    /// Document store read failed; fatal for the event.
    #[error("order fetch failed: {0}")]
    Fetch(String),
    /// Per-order transform failure; recorded as a FailedOrder.
    #[error("transform failed for order {order_id}: {reason}")]
    Transform { order_id: String, reason: String },
    /// Per-message send failure; counted and logged, never fails the batch.
    #[error("publish failed: {0}")]
    Publish(String),
    /// Queue client failure outside the publish fan-out (setup, read, ack).
    #[error("queue error: {0}")]
    Queue(String),
    #[error("configuration error: {0}")]
    Config(String),
    /// Anything else uncaught in the event handler: skip commit, propagate.
    #[error("fatal pipeline error: {0}")]
    Fatal(String),
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::Transient(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Fatal(format!("JSON serialization error: {err}"))
    }
}

impl PipelineError {
    /// Short class name recorded on FailedOrder / dead-letter entries.
    pub fn exception_type(&self) -> &'static str {
        match self {
            PipelineError::Transient(_) => "TransientDataError",
            PipelineError::Exhausted { .. } => "ExhaustedDataError",
            PipelineError::Fetch(_) => "FetchError",
            PipelineError::Transform { .. } => "TransformError",
            PipelineError::Publish(_) => "PublishError",
            PipelineError::Queue(_) => "QueueError",
            PipelineError::Config(_) => "ConfigError",
            PipelineError::Fatal(_) => "FatalError",
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlx_errors_classify_as_transient() {
        let err: PipelineError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, PipelineError::Transient(_)));
        assert_eq!(err.exception_type(), "TransientDataError");
    }

    #[test]
    fn display_includes_operation_for_exhausted() {
        let err = PipelineError::Exhausted {
            operation: "batch_fetch_customer_data".into(),
            reason: "connection reset".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("batch_fetch_customer_data"));
        assert!(msg.contains("connection reset"));
    }
}
