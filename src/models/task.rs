//! # Task Model
//!
//! An atomic, independently executable unit of work belonging to exactly one job and
//! one stage of that job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task_output::TaskOutput;
use crate::state_machine::TaskStatus;

/// Stored task record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    /// Back-reference only; a task does not own its job
    pub parent_job_id: String,
    pub job_type: String,
    pub task_type: String,
    /// Position within its stage's fan-out
    pub index: u32,
    pub stage: u32,
    pub status: TaskStatus,
    /// Opaque payload handed to the executor
    pub parameters: serde_json::Value,
    pub result_data: Option<TaskOutput>,
    pub error_message: Option<String>,
    /// Number of repeated `processing` claims (duplicate deliveries)
    #[serde(default)]
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Ordering used wherever task lists must be deterministic
    pub fn sort_key(&self) -> (u32, u32, &str) {
        (self.stage, self.index, self.task_id.as_str())
    }
}

/// Per-status task counts for one job or stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        tasks.into_iter().fold(Self::default(), |mut counts, task| {
            counts.total += 1;
            match task.status {
                TaskStatus::Queued => counts.queued += 1,
                TaskStatus::Processing => counts.processing += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
            counts
        })
    }

    /// Tasks still queued or processing
    pub fn active(&self) -> usize {
        self.queued + self.processing
    }

    pub fn has_active(&self) -> bool {
        self.active() > 0
    }
}
