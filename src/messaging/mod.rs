//! Queue plumbing: the pgmq client and the downstream publisher seam.

pub mod pgmq_client;
pub mod publisher;

pub use pgmq_client::{PgmqClient, QueueMessage};
pub use publisher::{MockQueuePublisher, PgmqQueuePublisher, QueuePublisher, SentMessage};
