//! # Data Models
//!
//! Job and task records as held by a [`JobStore`](crate::store::JobStore).

pub mod job;
pub mod task;
pub mod task_output;

pub use job::{Job, JobProgress, StageRecord};
pub use task::{Task, TaskCounts};
pub use task_output::TaskOutput;
