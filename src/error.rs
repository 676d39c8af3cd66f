//! Error types for the Geoflow orchestration core.
//!
//! Every rejection surfaced to a submitter names the offending field or condition;
//! layer-specific errors ([`StoreError`], [`MessagingError`], [`ConfigurationError`])
//! convert into [`GeoflowError`] at the orchestration boundary.

use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use crate::state_machine::{JobStatus, TaskStatus};
use crate::store::StoreError;
use crate::validation::ValidationErrors;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeoflowError {
    /// The submitted request violates the operation's parameter schema
    #[error("Request validation failed: {0}")]
    Validation(ValidationErrors),

    /// No controller is registered for the requested operation type
    #[error("No controller registered for operation type '{operation_type}' (available: {available:?})")]
    ControllerNotFound {
        operation_type: String,
        available: Vec<String>,
    },

    /// A controller produced zero tasks for a job
    #[error("Task creation failed for job {job_id}: {reason}")]
    TaskCreation { job_id: String, reason: String },

    /// Tasks were persisted but could not be placed on the queue
    #[error("Failed to enqueue {failed} of {total} tasks for job {job_id}")]
    Enqueue {
        job_id: String,
        failed: usize,
        total: usize,
    },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// A status write that the job/task lifecycle does not allow
    #[error("Invalid transition for {entity} {id}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GeoflowError {
    /// Create a task creation error
    pub fn task_creation(job_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TaskCreation {
            job_id: job_id.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid task transition error
    pub fn invalid_task_transition(task_id: impl Into<String>, from: TaskStatus, to: TaskStatus) -> Self {
        Self::InvalidTransition {
            entity: "task",
            id: task_id.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create an invalid job transition error
    pub fn invalid_job_transition(job_id: impl Into<String>, from: JobStatus, to: JobStatus) -> Self {
        Self::InvalidTransition {
            entity: "job",
            id: job_id.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Whether the error is the caller's fault (bad request or unknown operation)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::ControllerNotFound { .. } | Self::InvalidTransition { .. }
        )
    }

    /// Whether the error reports a missing job or task
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::JobNotFound(_) | Self::TaskNotFound(_) | Self::ControllerNotFound { .. }
        )
    }
}

impl From<serde_json::Error> for GeoflowError {
    fn from(error: serde_json::Error) -> Self {
        GeoflowError::Serialization(error.to_string())
    }
}

impl From<ValidationErrors> for GeoflowError {
    fn from(errors: ValidationErrors) -> Self {
        GeoflowError::Validation(errors)
    }
}

pub type Result<T> = std::result::Result<T, GeoflowError>;
