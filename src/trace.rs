//! Trace context carried through every pipeline stage.
//!
//! A 32-char hex trace id and 16-char hex span id are generated at event
//! entry when no inbound header is present; the trace id is echoed on
//! outbound messages via the `X-Trace-Id` header so downstream consumers
//! can correlate.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TRACE_HEADER: &str = "X-Trace-Id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
}

impl TraceContext {
    /// Fresh context with generated ids.
    pub fn new() -> Self {
        Self {
            trace_id: generate_trace_id(),
            span_id: generate_span_id(),
        }
    }

    /// Reuse an inbound trace id when present, otherwise generate one.
    /// A new span id is always minted for this hop.
    pub fn from_inbound(trace_id: Option<&str>) -> Self {
        match trace_id {
            Some(id) if !id.is_empty() => Self {
                trace_id: id.to_string(),
                span_id: generate_span_id(),
            },
            _ => Self::new(),
        }
    }

    /// Child context: same trace, new span.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: generate_span_id(),
        }
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}

pub fn generate_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn generate_span_id() -> String {
    let full = Uuid::new_v4().simple().to_string();
    full[..16].to_string()
}
