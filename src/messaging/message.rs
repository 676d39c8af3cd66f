//! # Task Queue Messages
//!
//! The message a worker receives carries identifiers only. The task's parameters
//! stay in the store, so a redelivered message always executes against the
//! current task record.

use crate::models::{Job, Task};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskQueueMessage {
    pub task_id: String,
    pub parent_job_id: String,
    pub operation_type: String,
    pub task_type: String,
    pub stage: u32,
    pub index: u32,
    pub dataset_id: Option<String>,
    pub resource_id: Option<String>,
    pub version_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Correlates log lines for one delivery chain
    pub correlation_id: Uuid,
}

impl TaskQueueMessage {
    pub fn for_task(task: &Task, job: &Job) -> Self {
        let identifier = |key: &str| {
            job.parameter(key)
                .and_then(|value| value.as_str())
                .map(str::to_string)
        };

        Self {
            task_id: task.task_id.clone(),
            parent_job_id: task.parent_job_id.clone(),
            operation_type: job.job_type.clone(),
            task_type: task.task_type.clone(),
            stage: task.stage,
            index: task.index,
            dataset_id: identifier("dataset_id"),
            resource_id: identifier("resource_id"),
            version_id: identifier("version_id"),
            created_at: Utc::now(),
            correlation_id: Uuid::new_v4(),
        }
    }
}

/// A message handed out by a queue, invisible to other consumers until acked or
/// its visibility timeout lapses
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub message_id: i64,
    /// Number of times this message has been delivered, including this one
    pub read_count: u32,
    pub message: TaskQueueMessage,
}
