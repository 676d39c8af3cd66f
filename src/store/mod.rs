//! # Job/Task Store
//!
//! Durable keyed storage for job and task records.
//!
//! ## Atomicity
//!
//! Concurrent executors report completions for tasks of the same job at the same
//! time, so whole-record read-modify-write of a job is never used on the hot path.
//! Instead every mutation is a narrow [`JobPatch`] or [`TaskUpdate`] that the store
//! applies to the current record under its own per-record lock (a map shard lock
//! in memory, `SELECT ... FOR UPDATE` in PostgreSQL). The patch itself carries the
//! guard: terminal records never regress, and stage advancement is a
//! compare-and-set on the current stage, so exactly one racer wins.

pub mod errors;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use errors::{StoreError, StoreResult};
pub use memory::InMemoryJobStore;
#[cfg(feature = "postgres")]
pub use postgres::PgJobStore;

use crate::models::{Job, JobProgress, StageRecord, Task, TaskOutput};
use crate::state_machine::guards::{job_transition_allowed, task_transition_allowed};
use crate::state_machine::{JobStatus, TaskStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Result of a guarded write: the record as stored afterwards, and whether the
/// write took effect
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    Applied(T),
    /// Guard refused the write; carries the unchanged record
    Rejected(T),
}

impl<T> WriteOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn record(&self) -> &T {
        match self {
            Self::Applied(record) | Self::Rejected(record) => record,
        }
    }
}

/// Field-scoped job mutation
#[derive(Debug, Clone, PartialEq)]
pub enum JobPatch {
    /// Lifecycle status change, guarded by [`job_transition_allowed`]
    Status {
        status: JobStatus,
        error_details: Option<String>,
    },
    /// Refresh progress counters
    Progress(JobProgress),
    /// Move from `from_stage` to `from_stage + 1`; only the first caller wins.
    /// Leaves the new stage unconfirmed until [`JobPatch::StageEnqueued`].
    AdvanceStage {
        from_stage: u32,
        record: StageRecord,
        stage_results: serde_json::Value,
        new_task_ids: Vec<String>,
    },
    /// Tasks persisted for the first stage; `pending -> queued`
    MarkQueued {
        task_ids: Vec<String>,
        progress: JobProgress,
    },
    /// Messages for `stage` were sent; clears the unconfirmed-stage marker
    StageEnqueued { stage: u32 },
    AddWarning(String),
    /// Replace a `failed` job with a fresh record for a retry; refused otherwise
    Reset(Box<Job>),
    /// Write the terminal status and aggregated result; no-op on terminal jobs
    Finalize {
        status: JobStatus,
        result_data: serde_json::Value,
        progress: JobProgress,
        final_stage: Option<(StageRecord, serde_json::Value)>,
        completed_at: DateTime<Utc>,
    },
}

impl JobPatch {
    pub fn status(status: JobStatus) -> Self {
        Self::Status {
            status,
            error_details: None,
        }
    }

    pub fn failed(error_details: impl Into<String>) -> Self {
        Self::Status {
            status: JobStatus::Failed,
            error_details: Some(error_details.into()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Progress(_) => "progress",
            Self::AdvanceStage { .. } => "advance_stage",
            Self::MarkQueued { .. } => "mark_queued",
            Self::StageEnqueued { .. } => "stage_enqueued",
            Self::AddWarning(_) => "add_warning",
            Self::Reset(_) => "reset",
            Self::Finalize { .. } => "finalize",
        }
    }

    /// Apply the patch in place; returns `false` if its guard refuses it.
    ///
    /// Callers must hold the record's lock for the duration of this call.
    pub fn apply(self, job: &mut Job) -> bool {
        match self {
            Self::Status {
                status,
                error_details,
            } => {
                if !job_transition_allowed(job.status, status) {
                    return false;
                }
                if job.status.is_terminal() && error_details.is_none() {
                    return false;
                }
                job.status = status;
                if error_details.is_some() {
                    job.error_details = error_details;
                }
            }
            Self::Progress(progress) => {
                if job.status.is_terminal() {
                    return false;
                }
                if job.status == JobStatus::Queued {
                    job.status = JobStatus::Processing;
                }
                job.progress = progress;
            }
            Self::AdvanceStage {
                from_stage,
                record,
                stage_results,
                new_task_ids,
            } => {
                if job.status.is_terminal()
                    || job.current_stage != from_stage
                    || from_stage >= job.total_stages
                {
                    return false;
                }
                if !job.has_stage_record(from_stage) {
                    job.stage_history.push(record);
                }
                job.stage_results.insert(from_stage, stage_results);
                job.current_stage = from_stage + 1;
                job.task_ids.extend(new_task_ids);
                job.pending_enqueue_stage = Some(from_stage + 1);
            }
            Self::MarkQueued { task_ids, progress } => {
                if !job_transition_allowed(job.status, JobStatus::Queued) {
                    return false;
                }
                job.status = JobStatus::Queued;
                job.task_ids.extend(task_ids);
                job.progress = progress;
            }
            Self::StageEnqueued { stage } => {
                if job.pending_enqueue_stage != Some(stage) {
                    return false;
                }
                job.pending_enqueue_stage = None;
            }
            Self::AddWarning(warning) => {
                if job.warnings.contains(&warning) {
                    return false;
                }
                job.warnings.push(warning);
            }
            Self::Reset(fresh) => {
                if job.status != JobStatus::Failed || fresh.job_id != job.job_id {
                    return false;
                }
                *job = *fresh;
                return true;
            }
            Self::Finalize {
                status,
                result_data,
                progress,
                final_stage,
                completed_at,
            } => {
                if job.status.is_terminal() || !job_transition_allowed(job.status, status) {
                    return false;
                }
                if let Some((record, stage_results)) = final_stage {
                    if !job.has_stage_record(record.stage) {
                        job.stage_results.insert(record.stage, stage_results);
                        job.stage_history.push(record);
                    }
                }
                job.status = status;
                job.result_data = Some(result_data);
                job.progress = progress;
                job.updated_at = completed_at;
                return true;
            }
        }
        job.updated_at = Utc::now();
        true
    }
}

/// Status report for one task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskUpdate {
    pub status: TaskStatus,
    pub result_data: Option<TaskOutput>,
    pub error_message: Option<String>,
}

impl TaskUpdate {
    pub fn processing() -> Self {
        Self {
            status: TaskStatus::Processing,
            result_data: None,
            error_message: None,
        }
    }

    pub fn completed(result: TaskOutput) -> Self {
        Self {
            status: TaskStatus::Completed,
            result_data: Some(result),
            error_message: None,
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            result_data: None,
            error_message: Some(error_message.into()),
        }
    }

    /// Apply in place; returns `false` if the task lifecycle refuses the change.
    ///
    /// A repeated `processing` claim counts as a retry.
    pub fn apply(self, task: &mut Task) -> bool {
        if !task_transition_allowed(task.status, self.status) {
            return false;
        }
        let now = Utc::now();
        if task.status == TaskStatus::Processing && self.status == TaskStatus::Processing {
            task.retry_count += 1;
        }
        task.status = self.status;
        if self.result_data.is_some() {
            task.result_data = self.result_data;
        }
        if self.error_message.is_some() {
            task.error_message = self.error_message;
        }
        if self.status.is_terminal() {
            task.completed_at = Some(now);
        }
        task.updated_at = now;
        true
    }
}

/// Persistence boundary for jobs and tasks
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug {
    async fn get_job(&self, job_id: &str) -> StoreResult<Option<Job>>;

    /// Insert-if-absent; returns whether the job was newly created
    async fn create_job(&self, job: &Job) -> StoreResult<bool>;

    /// Apply a guarded patch atomically; errors with `NotFound` if the job is missing
    async fn update_job(&self, job_id: &str, patch: JobPatch) -> StoreResult<WriteOutcome<Job>>;

    /// Insert-if-absent; returns whether the task was newly created
    async fn insert_task(&self, task: &Task) -> StoreResult<bool>;

    async fn get_task(&self, task_id: &str) -> StoreResult<Option<Task>>;

    /// Apply a guarded status update atomically; errors with `NotFound` if missing
    async fn update_task(&self, task_id: &str, update: TaskUpdate)
        -> StoreResult<WriteOutcome<Task>>;

    /// All tasks of a job ordered by (stage, index, task_id)
    async fn list_tasks_for_job(&self, job_id: &str) -> StoreResult<Vec<Task>>;

    /// Tasks of one stage ordered by (index, task_id)
    async fn list_tasks_for_stage(&self, job_id: &str, stage: u32) -> StoreResult<Vec<Task>>;

    /// Remove every task of a job; returns how many were removed
    async fn delete_tasks_for_job(&self, job_id: &str) -> StoreResult<usize>;
}

/// Deterministic ordering shared by all store implementations
pub(crate) fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}
