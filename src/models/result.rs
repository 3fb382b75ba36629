//! Pipeline result shapes.

use serde::{Deserialize, Serialize};

use crate::models::processed::{FailedOrder, ProcessedOrder};

/// Transformer output: one entry per input order, success or failure.
#[derive(Debug, Clone, Default)]
pub struct ProcessingOutput {
    pub successes: Vec<ProcessedOrder>,
    pub failures: Vec<FailedOrder>,
}

/// Wall-clock breakdown of one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineTimings {
    pub preload_ms: u64,
    pub processing_ms: u64,
    pub publish_ms: u64,
    pub total_ms: u64,
}

/// Full result for one event: successes + failures + stage timings.
#[derive(Debug, Clone, Default)]
pub struct ProcessingResult {
    pub successes: Vec<ProcessedOrder>,
    pub failures: Vec<FailedOrder>,
    pub timings: PipelineTimings,
}

impl ProcessingResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}
