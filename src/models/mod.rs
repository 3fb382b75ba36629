//! Domain model types shared across the pipeline stages.

pub mod event;
pub mod order;
pub mod partner;
pub mod processed;
pub mod reference;
pub mod result;

pub use event::OrderEvent;
pub use order::{Order, OrderDocument, OrderItem};
pub use partner::{BusinessUnitStatus, TradingPartnerStatus, STATUS_ACTIVE};
pub use processed::{FailedOrder, GroupedOrderMessage, ProcessedOrder};
pub use reference::{CustomerData, InventoryData, PricingData};
pub use result::{PipelineTimings, ProcessingOutput, ProcessingResult};
