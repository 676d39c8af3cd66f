//! # Reference Worker
//!
//! Executes queued tasks with registered [`TaskHandler`]s and reports outcomes back
//! through the task manager. Any number of workers may run against the same queue.

pub mod handler;
pub mod handlers;
pub mod task_worker;

pub use handler::{TaskExecutionError, TaskHandler, TaskHandlerRegistry};
pub use handlers::{
    detect_format, CatalogItemHandler, GreetingHandler, ReplyHandler, ValidateFileHandler,
};
pub use task_worker::{BatchSummary, TaskWorker};
