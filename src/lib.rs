//! # orderflow-core
//!
//! Queue-driven order processing pipeline. Each inbound event names a
//! (trading partner, business unit) scope; the pipeline deduplicates the
//! event, validates the scope, fetches matching pending orders from the
//! document store, preloads relational reference data in parallel batches,
//! applies pure business logic per order under a bounded-concurrency gate,
//! publishes results downstream, and commits the offset only once the full
//! pipeline has succeeded (at-least-once semantics).

pub mod cache;
pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod repository;
pub mod resilience;
pub mod services;
pub mod trace;

pub use config::AppConfig;
pub use error::{PipelineError, PipelineResult};
