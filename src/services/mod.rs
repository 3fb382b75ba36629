//! Pipeline stage services.

pub mod caching_preload;
pub mod dead_letter;
pub mod fetch;
pub mod grouping;
pub mod orchestrator;
pub mod preload;
pub mod processing;
pub mod publishing;
pub mod validation;

pub use caching_preload::{CachingDataService, DataCaches};
pub use dead_letter::{DeadLetterSink, LogDeadLetterSink, RecordingDeadLetterSink};
pub use fetch::OrderFetchService;
pub use grouping::{GroupingResult, GroupingStrategy, OrderGroupingService};
pub use orchestrator::OrderProcessingOrchestrator;
pub use preload::{DataPreloadService, ProcessingContext};
pub use processing::{transform_order, BusinessLogicService};
pub use publishing::{PublishSummary, PublishingService};
pub use validation::{PartnerValidationService, ValidationResult};
