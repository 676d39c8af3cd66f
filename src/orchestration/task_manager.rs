//! # Task Manager
//!
//! Applies task status reports from executors and drives everything that follows a
//! terminal report: stage advancement for sequential jobs, then the job completion
//! check.
//!
//! ## Stage advancement
//!
//! When the last task of the current stage becomes terminal, every worker that
//! observes it builds the same next-stage task set (identities are deterministic),
//! persists it insert-if-absent, and then races a compare-and-set on the job's
//! stage pointer. Only the winner enqueues the new tasks. A stage that yields no
//! tasks is recorded and advancement continues straight to the following stage.
//!
//! Winning the compare-and-set also marks the new stage unconfirmed on the job,
//! and the marker is cleared once its messages are sent. If the winner stops in
//! between, the message that triggered the advance is redelivered, its task is
//! found terminal, and the re-check re-sends the stage's queued tasks.

use crate::error::{GeoflowError, Result};
use crate::logging::log_task_operation;
use crate::models::{Job, Task};
use crate::orchestration::job_finalizer::JobFinalizer;
use crate::orchestration::stage_summary::{stage_snapshot, summarize_stage};
use crate::orchestration::task_enqueuer::TaskEnqueuer;
use crate::orchestration::types::{StageContext, TaskUpdateOutcome};
use crate::registry::ControllerRegistry;
use crate::state_machine::TaskStatus;
use crate::store::{JobPatch, JobStore, TaskUpdate, WriteOutcome};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct TaskManager {
    store: Arc<dyn JobStore>,
    registry: Arc<ControllerRegistry>,
    enqueuer: TaskEnqueuer,
    finalizer: JobFinalizer,
}

impl TaskManager {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<ControllerRegistry>,
        enqueuer: TaskEnqueuer,
        finalizer: JobFinalizer,
    ) -> Self {
        Self {
            store,
            registry,
            enqueuer,
            finalizer,
        }
    }

    pub fn finalizer(&self) -> &JobFinalizer {
        &self.finalizer
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Task> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| GeoflowError::TaskNotFound(task_id.to_string()))
    }

    /// Record a status report for one task.
    ///
    /// Reports for tasks that are already terminal write nothing, but the stage and
    /// job completion checks still run. The report that made the task terminal may
    /// have failed partway through those checks, and finalization is idempotent.
    #[instrument(skip(self, update), fields(status = %update.status))]
    pub async fn update_task_status(
        &self,
        task_id: &str,
        update: TaskUpdate,
    ) -> Result<TaskUpdateOutcome> {
        let current = self.get_task(task_id).await?;
        if current.is_terminal() {
            debug!(task_id, status = %current.status, "Report for terminal task; re-checking job");
            return self.recheck_terminal_task(current).await;
        }

        let requested = update.status;
        let task = match self.store.update_task(task_id, update).await? {
            WriteOutcome::Applied(task) => task,
            WriteOutcome::Rejected(task) if task.is_terminal() => {
                return self.recheck_terminal_task(task).await;
            }
            WriteOutcome::Rejected(task) => {
                return Err(GeoflowError::invalid_task_transition(
                    task_id,
                    task.status,
                    requested,
                ));
            }
        };

        log_task_operation(
            "update_status",
            &task.task_id,
            Some(&task.parent_job_id),
            Some(task.stage),
            task.status.as_str(),
            task.error_message.as_deref(),
        );

        if !task.is_terminal() {
            return Ok(TaskUpdateOutcome::Updated {
                task,
                stage_advanced: None,
                completion: None,
            });
        }

        let Some(job) = self.parent_job(&task).await? else {
            return Ok(TaskUpdateOutcome::Updated {
                task,
                stage_advanced: None,
                completion: None,
            });
        };

        let stage_advanced = if job.is_staged() {
            self.advance_stages(job).await?
        } else {
            None
        };

        let completion = self
            .finalizer
            .check_and_finalize(&task.parent_job_id)
            .await?;

        Ok(TaskUpdateOutcome::Updated {
            task,
            stage_advanced,
            completion: Some(completion),
        })
    }

    /// Run the checks that follow a terminal report for a task that is already
    /// terminal.
    ///
    /// Also re-sends a stage whose messages were never confirmed sent, which only
    /// happens when the worker that advanced the stage stopped before enqueueing.
    #[instrument(skip(self, task), fields(task_id = %task.task_id))]
    pub async fn recheck_terminal_task(&self, task: Task) -> Result<TaskUpdateOutcome> {
        let Some(job) = self.parent_job(&task).await? else {
            return Ok(TaskUpdateOutcome::AlreadyTerminal {
                task,
                completion: None,
            });
        };

        if job.is_staged() {
            let job = self.resend_unconfirmed_stage(job).await?;
            self.advance_stages(job).await?;
        }

        let completion = self
            .finalizer
            .check_and_finalize(&task.parent_job_id)
            .await?;

        Ok(TaskUpdateOutcome::AlreadyTerminal {
            task,
            completion: Some(completion),
        })
    }

    async fn parent_job(&self, task: &Task) -> Result<Option<Job>> {
        let job = self.store.get_job(&task.parent_job_id).await?;
        if job.is_none() {
            warn!(task_id = %task.task_id, job_id = %task.parent_job_id, "Terminal task has no parent job");
        }
        Ok(job)
    }

    async fn resend_unconfirmed_stage(&self, job: Job) -> Result<Job> {
        let Some(stage) = job.pending_enqueue_stage else {
            return Ok(job);
        };
        if !job.status.is_active() || stage != job.current_stage {
            return Ok(job);
        }

        let unsent: Vec<Task> = self
            .store
            .list_tasks_for_stage(&job.job_id, stage)
            .await?
            .into_iter()
            .filter(|task| task.status == TaskStatus::Queued)
            .collect();
        warn!(
            job_id = %job.job_id,
            stage,
            task_count = unsent.len(),
            "Re-sending stage whose enqueue was never confirmed"
        );
        self.enqueue_stage(&job, stage, &unsent).await?;

        Ok(self.store.get_job(&job.job_id).await?.unwrap_or(job))
    }

    /// Send a stage's messages, fail the tasks that could not be sent, then clear
    /// the job's unconfirmed-stage marker
    async fn enqueue_stage(&self, job: &Job, stage: u32, tasks: &[Task]) -> Result<()> {
        let report = self.enqueuer.enqueue(job, tasks).await;
        if !report.all_enqueued() {
            for (task_id, error) in &report.failed {
                self.store
                    .update_task(task_id, TaskUpdate::failed(format!("enqueue failed: {error}")))
                    .await?;
            }
            let warning = format!(
                "stage {}: {} of {} tasks could not be enqueued",
                stage,
                report.failed.len(),
                report.total()
            );
            warn!(job_id = %job.job_id, warning = %warning, "Partial stage enqueue");
            self.store
                .update_job(&job.job_id, JobPatch::AddWarning(warning))
                .await?;
        }

        self.store
            .update_job(&job.job_id, JobPatch::StageEnqueued { stage })
            .await?;
        Ok(())
    }

    /// Advance through every finished stage; returns the last stage this call moved to
    async fn advance_stages(&self, mut job: Job) -> Result<Option<u32>> {
        let mut advanced_to = None;

        while job.status.is_active() && !job.is_final_stage() {
            let stage = job.current_stage;
            let stage_tasks = self.store.list_tasks_for_stage(&job.job_id, stage).await?;
            if stage_tasks.iter().any(|task| !task.is_terminal()) {
                break;
            }

            let controller = self.registry.get_controller(&job.job_type)?;
            let name = controller
                .stage(stage)
                .map(|definition| definition.name.to_string())
                .unwrap_or_else(|| format!("stage_{stage}"));
            let record = summarize_stage(stage, &name, &stage_tasks);
            let snapshot = stage_snapshot(&stage_tasks);

            let context = StageContext {
                job: &job,
                stage: stage + 1,
                previous_results: &stage_tasks,
            };
            let definitions = controller.create_stage_tasks(&context)?;
            let next_tasks = self.enqueuer.build_tasks(&job, stage + 1, definitions)?;
            self.enqueuer.persist(&next_tasks).await?;

            // Marks stage + 1 unconfirmed until its messages are sent
            let patch = JobPatch::AdvanceStage {
                from_stage: stage,
                record,
                stage_results: snapshot,
                new_task_ids: next_tasks.iter().map(|task| task.task_id.clone()).collect(),
            };
            let updated = match self.store.update_job(&job.job_id, patch).await? {
                WriteOutcome::Applied(updated) => updated,
                WriteOutcome::Rejected(current) => {
                    debug!(
                        job_id = %job.job_id,
                        from_stage = stage,
                        current_stage = current.current_stage,
                        "Stage already advanced by another worker"
                    );
                    return Ok(advanced_to);
                }
            };

            info!(
                job_id = %job.job_id,
                from_stage = stage,
                to_stage = stage + 1,
                task_count = next_tasks.len(),
                "Stage advanced"
            );
            advanced_to = Some(stage + 1);

            self.enqueue_stage(&updated, stage + 1, &next_tasks).await?;
            job = updated;
        }

        Ok(advanced_to)
    }
}
