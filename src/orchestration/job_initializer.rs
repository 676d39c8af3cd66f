//! # Job Initializer
//!
//! Entry point for job submissions: validates the request against its
//! controller's schema, derives the job identity, creates the job and its first
//! stage of tasks, and enqueues them.
//!
//! Submissions are idempotent. Re-submitting a request whose job exists and has
//! not failed returns that job without creating anything; re-submitting a failed
//! job discards its old tasks and runs it again.
//!
//! Job creation is insert-if-absent and a retry is a reset guarded on `failed`,
//! so when identical submissions race exactly one of them creates (or resets) the
//! job and the others are replays.

use crate::config::OrchestrationConfig;
use crate::error::{GeoflowError, Result};
use crate::identity::generate_job_id;
use crate::logging::log_job_operation;
use crate::models::{Job, JobProgress, TaskCounts};
use crate::orchestration::controller::JobController;
use crate::orchestration::task_enqueuer::TaskEnqueuer;
use crate::orchestration::task_manager::TaskManager;
use crate::orchestration::types::{ProcessJobOutcome, StageContext};
use crate::registry::ControllerRegistry;
use crate::state_machine::JobStatus;
use crate::store::{JobPatch, JobStore, TaskUpdate, WriteOutcome};
use crate::validation::{extract_job_type, validate_request, ValidationMode};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct JobInitializer {
    store: Arc<dyn JobStore>,
    registry: Arc<ControllerRegistry>,
    enqueuer: TaskEnqueuer,
    task_manager: TaskManager,
    validation_mode: ValidationMode,
}

/// What stage-1 submission produced
struct Submission {
    task_count: usize,
    tasks_enqueued: usize,
}

impl JobInitializer {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<ControllerRegistry>,
        enqueuer: TaskEnqueuer,
        task_manager: TaskManager,
        config: &OrchestrationConfig,
    ) -> Self {
        Self {
            store,
            registry,
            enqueuer,
            task_manager,
            validation_mode: config.validation_mode,
        }
    }

    /// Validate, create and enqueue a job from a raw submission
    #[instrument(skip(self, request))]
    pub async fn process_job(&self, request: &serde_json::Value) -> Result<ProcessJobOutcome> {
        let job_type = extract_job_type(request)?;
        let controller = self.registry.get_controller(&job_type)?;
        let validated = validate_request(request, &controller.parameter_schema(), self.validation_mode)?;
        let job_id = generate_job_id(&validated)?;

        let job = Job::new(
            job_id.clone(),
            job_type.clone(),
            validated.normalized(),
            controller.total_stages(),
        );

        match self.store.get_job(&job_id).await? {
            None => {
                if !self.store.create_job(&job).await? {
                    return self.replay(&job_id).await;
                }
            }
            Some(existing) if existing.status != JobStatus::Failed => {
                return Ok(Self::replayed(existing));
            }
            Some(_) => {
                // Only one concurrent retry may win the reset
                let reset = self
                    .store
                    .update_job(&job_id, JobPatch::Reset(Box::new(job.clone())))
                    .await?;
                if let WriteOutcome::Rejected(current) = reset {
                    return Ok(Self::replayed(current));
                }
                let removed = self.store.delete_tasks_for_job(&job_id).await?;
                info!(job_id = %job_id, removed_tasks = removed, "Retrying failed job");
            }
        }

        log_job_operation("create", &job_id, Some(&job_type), job.status.as_str(), None);

        let submission = match self.submit(controller.as_ref(), &job).await {
            Ok(submission) => submission,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Job submission failed");
                if let Err(store_error) = self
                    .store
                    .update_job(&job_id, JobPatch::failed(e.to_string()))
                    .await
                {
                    warn!(job_id = %job_id, error = %store_error, "Could not mark job failed");
                }
                log_job_operation(
                    "create",
                    &job_id,
                    Some(&job_type),
                    JobStatus::Failed.as_str(),
                    Some(&e.to_string()),
                );
                return Err(e);
            }
        };

        let job = self.get_job(&job_id).await?;
        Ok(ProcessJobOutcome {
            job_id,
            status: job.status,
            task_count: submission.task_count,
            tasks_enqueued: submission.tasks_enqueued,
            replayed: false,
            warnings: job.warnings,
        })
    }

    async fn replay(&self, job_id: &str) -> Result<ProcessJobOutcome> {
        Ok(Self::replayed(self.get_job(job_id).await?))
    }

    /// Outcome for a submission whose job already exists
    fn replayed(existing: Job) -> ProcessJobOutcome {
        info!(job_id = %existing.job_id, status = %existing.status, "Returning existing job");
        ProcessJobOutcome {
            task_count: existing.task_ids.len(),
            job_id: existing.job_id,
            status: existing.status,
            tasks_enqueued: 0,
            replayed: true,
            warnings: existing.warnings,
        }
    }

    /// Create, persist and enqueue the first stage
    async fn submit(&self, controller: &dyn JobController, job: &Job) -> Result<Submission> {
        let definitions = controller.create_stage_tasks(&StageContext::initial(job))?;
        if definitions.is_empty() {
            return Err(GeoflowError::task_creation(
                job.job_id.clone(),
                "controller produced no tasks for stage 1",
            ));
        }

        let tasks = self.enqueuer.build_tasks(job, 1, definitions)?;
        self.enqueuer.persist(&tasks).await?;

        let counts = TaskCounts::from_tasks(&tasks);
        let marked = self
            .store
            .update_job(
                &job.job_id,
                JobPatch::MarkQueued {
                    task_ids: tasks.iter().map(|task| task.task_id.clone()).collect(),
                    progress: JobProgress::from_counts(&counts),
                },
            )
            .await?;
        if !marked.is_applied() {
            return Err(GeoflowError::invalid_job_transition(
                job.job_id.clone(),
                marked.record().status,
                JobStatus::Queued,
            ));
        }

        let report = self.enqueuer.enqueue(marked.record(), &tasks).await;
        debug!(
            job_id = %job.job_id,
            enqueued = report.enqueued.len(),
            failed = report.failed.len(),
            "Stage 1 enqueue finished"
        );

        if report.none_enqueued() {
            for (task_id, error) in &report.failed {
                self.store
                    .update_task(task_id, TaskUpdate::failed(format!("enqueue failed: {error}")))
                    .await?;
            }
            return Err(GeoflowError::Enqueue {
                job_id: job.job_id.clone(),
                failed: report.failed.len(),
                total: report.total(),
            });
        }

        self.store
            .update_job(&job.job_id, JobPatch::status(JobStatus::Processing))
            .await?;

        if !report.all_enqueued() {
            let warning = format!(
                "{} of {} tasks could not be enqueued",
                report.failed.len(),
                report.total()
            );
            warn!(job_id = %job.job_id, warning = %warning, "Partial enqueue");
            self.store
                .update_job(&job.job_id, JobPatch::AddWarning(warning))
                .await?;

            // Unenqueued tasks would otherwise stay queued forever and block completion
            for (task_id, error) in &report.failed {
                self.task_manager
                    .update_task_status(task_id, TaskUpdate::failed(format!("enqueue failed: {error}")))
                    .await?;
            }
        }

        log_job_operation(
            "submit",
            &job.job_id,
            Some(&job.job_type),
            JobStatus::Processing.as_str(),
            Some(&format!("{} tasks enqueued", report.enqueued.len())),
        );

        Ok(Submission {
            task_count: tasks.len(),
            tasks_enqueued: report.enqueued.len(),
        })
    }

    /// Progress counters derived from the job's tasks; zeros if the store fails
    pub async fn get_job_progress(&self, job_id: &str) -> JobProgress {
        match self.store.list_tasks_for_job(job_id).await {
            Ok(tasks) => JobProgress::from_counts(&TaskCounts::from_tasks(&tasks)),
            Err(e) => {
                warn!(job_id, error = %e, "Failed to read job progress");
                JobProgress::default()
            }
        }
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| GeoflowError::JobNotFound(job_id.to_string()))
    }
}
