//! # Task Handlers
//!
//! A [`TaskHandler`] executes one task type. Handlers are async by default so they
//! can do I/O (blob reads, catalog writes) without blocking the worker pool.
//!
//! ```rust
//! use async_trait::async_trait;
//! use geoflow_core::models::{Task, TaskOutput};
//! use geoflow_core::worker::{TaskExecutionError, TaskHandler};
//!
//! struct EchoHandler;
//!
//! #[async_trait]
//! impl TaskHandler for EchoHandler {
//!     fn task_type(&self) -> &str {
//!         "echo"
//!     }
//!
//!     async fn execute(&self, task: &Task) -> Result<TaskOutput, TaskExecutionError> {
//!         Ok(TaskOutput::Extension { data: task.parameters.clone() })
//!     }
//! }
//! ```

use crate::models::{Task, TaskOutput};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Why a handler could not produce an output; recorded as the task's error message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskExecutionError {
    #[error("Invalid task parameters: {0}")]
    InvalidParameters(String),

    #[error("No handler registered for task type '{0}'")]
    HandlerNotFound(String),

    #[error("Task execution failed: {0}")]
    Failed(String),
}

impl TaskExecutionError {
    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::InvalidParameters(message.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Task type this handler executes
    fn task_type(&self) -> &str;

    async fn execute(&self, task: &Task) -> Result<TaskOutput, TaskExecutionError>;
}

/// Task type → handler lookup for a worker
#[derive(Default, Clone)]
pub struct TaskHandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl TaskHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with handlers for every built-in task type
    pub fn with_default_handlers() -> Self {
        let mut registry = Self::new();
        super::handlers::register_defaults(&mut registry);
        registry
    }

    /// Register (or replace) a handler under its own task type
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) -> &mut Self {
        self.handlers.insert(handler.task_type().to_string(), handler);
        self
    }

    pub fn get(&self, task_type: &str) -> Result<Arc<dyn TaskHandler>, TaskExecutionError> {
        self.handlers
            .get(task_type)
            .cloned()
            .ok_or_else(|| TaskExecutionError::HandlerNotFound(task_type.to_string()))
    }

    /// Registered task types, sorted
    pub fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for TaskHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandlerRegistry")
            .field("task_types", &self.task_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::task_types;

    #[test]
    fn test_default_handlers_cover_builtin_task_types() {
        let registry = TaskHandlerRegistry::with_default_handlers();
        assert_eq!(
            registry.task_types(),
            vec![
                task_types::CATALOG_ITEM.to_string(),
                task_types::HELLO_WORLD_GREETING.to_string(),
                task_types::HELLO_WORLD_REPLY.to_string(),
                task_types::VALIDATE_FILE.to_string(),
            ]
        );
    }

    #[test]
    fn test_unknown_task_type() {
        let registry = TaskHandlerRegistry::new();
        let err = registry.get("reproject").err().unwrap();
        assert_eq!(err.to_string(), "No handler registered for task type 'reproject'");
    }
}
