//! # Orchestration Types
//!
//! Values exchanged between controllers, the job initializer and the task manager.

use crate::models::{Job, StageRecord, Task, TaskOutput};
use crate::state_machine::JobStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A logical stage declared by a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDefinition {
    pub number: u32,
    pub name: &'static str,
    pub task_type: &'static str,
}

/// A task a controller wants created; identity is derived from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub task_type: String,
    pub index: u32,
    pub parameters: serde_json::Value,
}

impl TaskDefinition {
    pub fn new(task_type: impl Into<String>, index: u32, parameters: serde_json::Value) -> Self {
        Self {
            task_type: task_type.into(),
            index,
            parameters,
        }
    }
}

/// Input to a controller's stage factory
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub job: &'a Job,
    /// Stage whose tasks are being created
    pub stage: u32,
    /// Terminal tasks of the preceding stage; empty for stage 1
    pub previous_results: &'a [Task],
}

impl<'a> StageContext<'a> {
    pub fn initial(job: &'a Job) -> Self {
        Self {
            job,
            stage: 1,
            previous_results: &[],
        }
    }

    /// Successful outputs of the preceding stage, in task order
    pub fn previous_outputs(&self) -> impl Iterator<Item = &'a TaskOutput> {
        self.previous_results
            .iter()
            .filter_map(|task| task.result_data.as_ref())
    }
}

/// What `process_job` reports back to the submitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessJobOutcome {
    pub job_id: String,
    pub status: JobStatus,
    pub task_count: usize,
    pub tasks_enqueued: usize,
    /// The job already existed and was returned unchanged
    pub replayed: bool,
    pub warnings: Vec<String>,
}

/// Result of a job completion check
#[derive(Debug, Clone, PartialEq)]
pub enum JobCompletionOutcome {
    /// This check wrote the terminal status
    Finalized { status: JobStatus },
    /// Tasks are still queued or processing; progress refreshed
    InProgress { completed: usize, failed: usize, total: usize },
    /// The job was already terminal (or another worker finalized it first)
    AlreadyTerminal { status: JobStatus },
    /// The job is not accepting completions (pending)
    NotActive { status: JobStatus },
}

impl JobCompletionOutcome {
    pub fn is_finalized(&self) -> bool {
        matches!(self, Self::Finalized { .. })
    }
}

/// Result of `update_task_status`
#[derive(Debug, Clone, PartialEq)]
pub enum TaskUpdateOutcome {
    Updated {
        task: Task,
        /// Stage the job advanced to because of this update
        stage_advanced: Option<u32>,
        /// Completion check result; `None` for non-terminal updates
        completion: Option<JobCompletionOutcome>,
    },
    /// The task was already terminal; nothing was written, but the stage and job
    /// completion checks ran again
    AlreadyTerminal {
        task: Task,
        completion: Option<JobCompletionOutcome>,
    },
}

impl TaskUpdateOutcome {
    pub fn task(&self) -> &Task {
        match self {
            Self::Updated { task, .. } | Self::AlreadyTerminal { task, .. } => task,
        }
    }

    pub fn completion(&self) -> Option<&JobCompletionOutcome> {
        match self {
            Self::Updated { completion, .. } | Self::AlreadyTerminal { completion, .. } => {
                completion.as_ref()
            }
        }
    }

    /// This call wrote the job's terminal status
    pub fn job_finalized(&self) -> bool {
        self.completion().is_some_and(JobCompletionOutcome::is_finalized)
    }
}

/// One successful task result copied into a job result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResultSample {
    pub task_id: String,
    pub stage: u32,
    pub index: u32,
    pub output: TaskOutput,
}

/// One task failure copied into a job result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskErrorSample {
    pub task_id: String,
    pub stage: u32,
    pub index: u32,
    pub error: String,
}

/// Aggregated payload written to `Job::result_data` at finalization.
///
/// Everything in it is derived from immutable terminal task records, so two
/// finalizations of the same job produce identical content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub job_type: String,
    pub status: JobStatus,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub success_rate: f64,
    pub task_results: Vec<TaskResultSample>,
    pub task_errors: Vec<TaskErrorSample>,
    pub stage_history: Vec<StageRecord>,
    pub completed_at: DateTime<Utc>,
    /// Controller-specific aggregates (e.g. `hello_statistics`)
    #[serde(flatten)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl JobResult {
    pub fn insert_extension(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.extensions.insert(key.into(), value);
    }
}

/// Success rate in percent, rounded to two decimals
pub fn success_rate(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (completed as f64 / total as f64 * 10_000.0).round() / 100.0
}
