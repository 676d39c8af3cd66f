//! # Messaging Module
//!
//! Task execution messages and the queues that carry them to workers. Delivery is
//! at-least-once; consumers must tolerate duplicates.

pub mod errors;
pub mod message;
#[cfg(feature = "postgres")]
pub mod pgmq_client;
pub mod queue;

pub use errors::{MessagingError, MessagingResult};
pub use message::{ReceivedMessage, TaskQueueMessage};
#[cfg(feature = "postgres")]
pub use pgmq_client::PgmqTaskQueue;
pub use queue::{InMemoryTaskQueue, TaskQueue};
