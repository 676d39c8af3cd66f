//! # Job Finalizer
//!
//! Decides whether a job is complete and, if so, writes its terminal status and
//! aggregated result.
//!
//! ## Completion rule
//!
//! A job is complete only when it is on its final stage and none of its tasks is
//! queued or processing. Counting `completed + failed` against the tasks seen so far
//! is never enough, because a later stage may still be about to create tasks.
//! Next-stage tasks are persisted before the stage pointer moves, so once
//! `current_stage` is final every task the job will ever have already exists.
//!
//! ## Cost
//!
//! [`FullScanCompletionChecker`] reads every task of the job on every terminal task
//! update: O(T) per completion and O(T²) per job. A warning is logged above the
//! configured task threshold. Alternative strategies plug in through
//! [`JobCompletionChecker`].

use crate::config::OrchestrationConfig;
use crate::error::{GeoflowError, Result};
use crate::logging::log_job_operation;
use crate::models::{Job, JobProgress, Task, TaskCounts};
use crate::orchestration::stage_summary::{finished_at, stage_snapshot, summarize_stage};
use crate::orchestration::types::{
    success_rate, JobCompletionOutcome, JobResult, TaskErrorSample, TaskResultSample,
};
use crate::registry::ControllerRegistry;
use crate::state_machine::{JobStatus, TaskStatus};
use crate::store::{JobPatch, JobStore, WriteOutcome};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Task census used for one completion decision
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionEvaluation {
    pub counts: TaskCounts,
    pub is_complete: bool,
    /// All tasks of the job in (stage, index, task_id) order
    pub tasks: Vec<Task>,
}

#[async_trait]
pub trait JobCompletionChecker: Send + Sync + std::fmt::Debug {
    async fn evaluate(&self, job: &Job) -> Result<CompletionEvaluation>;
}

/// Re-reads every task of the job
#[derive(Debug, Clone)]
pub struct FullScanCompletionChecker {
    store: Arc<dyn JobStore>,
    warn_threshold: usize,
}

impl FullScanCompletionChecker {
    pub fn new(store: Arc<dyn JobStore>, warn_threshold: usize) -> Self {
        Self {
            store,
            warn_threshold,
        }
    }
}

#[async_trait]
impl JobCompletionChecker for FullScanCompletionChecker {
    async fn evaluate(&self, job: &Job) -> Result<CompletionEvaluation> {
        let tasks = self.store.list_tasks_for_job(&job.job_id).await?;
        let counts = TaskCounts::from_tasks(&tasks);

        if counts.total > self.warn_threshold {
            warn!(
                job_id = %job.job_id,
                total_tasks = counts.total,
                threshold = self.warn_threshold,
                "Completion scan over a large job; each terminal task update re-reads every task"
            );
        }

        let is_complete = job.status.is_active() && job.is_final_stage() && !counts.has_active();
        Ok(CompletionEvaluation {
            counts,
            is_complete,
            tasks,
        })
    }
}

/// Terminal status implied by a fully finished job's task counts
pub fn final_status(counts: &TaskCounts) -> JobStatus {
    if counts.failed == 0 {
        JobStatus::Completed
    } else if counts.completed == 0 {
        JobStatus::Failed
    } else {
        JobStatus::CompletedWithErrors
    }
}

#[derive(Debug, Clone)]
pub struct JobFinalizer {
    store: Arc<dyn JobStore>,
    registry: Arc<ControllerRegistry>,
    checker: Arc<dyn JobCompletionChecker>,
    max_result_samples: usize,
    max_error_samples: usize,
}

impl JobFinalizer {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<ControllerRegistry>,
        config: &OrchestrationConfig,
    ) -> Self {
        let checker = Arc::new(FullScanCompletionChecker::new(
            store.clone(),
            config.completion_scan_warn_threshold,
        ));
        Self::with_checker(store, registry, checker, config)
    }

    pub fn with_checker(
        store: Arc<dyn JobStore>,
        registry: Arc<ControllerRegistry>,
        checker: Arc<dyn JobCompletionChecker>,
        config: &OrchestrationConfig,
    ) -> Self {
        Self {
            store,
            registry,
            checker,
            max_result_samples: config.max_result_samples,
            max_error_samples: config.max_error_samples,
        }
    }

    /// Finalize the job if every task is terminal, otherwise refresh its progress.
    ///
    /// Safe to call any number of times from any number of workers: at most one
    /// call writes the terminal status, and the result it writes depends only on
    /// terminal task records.
    #[instrument(skip(self))]
    pub async fn check_and_finalize(&self, job_id: &str) -> Result<JobCompletionOutcome> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| GeoflowError::JobNotFound(job_id.to_string()))?;

        if job.status.is_terminal() {
            debug!(job_id, status = %job.status, "Job already terminal");
            return Ok(JobCompletionOutcome::AlreadyTerminal { status: job.status });
        }
        if !job.status.is_active() {
            return Ok(JobCompletionOutcome::NotActive { status: job.status });
        }

        let evaluation = self.checker.evaluate(&job).await?;
        let counts = evaluation.counts;

        if !evaluation.is_complete {
            let outcome = self
                .store
                .update_job(job_id, JobPatch::Progress(JobProgress::from_counts(&counts)))
                .await?;
            if !outcome.is_applied() && outcome.record().status.is_terminal() {
                return Ok(JobCompletionOutcome::AlreadyTerminal {
                    status: outcome.record().status,
                });
            }
            debug!(
                job_id,
                completed = counts.completed,
                failed = counts.failed,
                total = counts.total,
                stage = job.current_stage,
                "Job still in progress"
            );
            return Ok(JobCompletionOutcome::InProgress {
                completed: counts.completed,
                failed: counts.failed,
                total: counts.total,
            });
        }

        self.finalize(&job, counts, &evaluation.tasks).await
    }

    async fn finalize(
        &self,
        job: &Job,
        counts: TaskCounts,
        tasks: &[Task],
    ) -> Result<JobCompletionOutcome> {
        let status = final_status(&counts);
        let controller = match self.registry.get_controller(&job.job_type) {
            Ok(controller) => Some(controller),
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "Finalizing without controller aggregation");
                None
            }
        };

        let final_stage = if job.has_stage_record(job.current_stage) {
            None
        } else {
            let stage_tasks: Vec<Task> = tasks
                .iter()
                .filter(|task| task.stage == job.current_stage)
                .cloned()
                .collect();
            let name = controller
                .as_ref()
                .and_then(|c| c.stage(job.current_stage))
                .map(|stage| stage.name.to_string())
                .unwrap_or_else(|| format!("stage_{}", job.current_stage));
            Some((
                summarize_stage(job.current_stage, &name, &stage_tasks),
                stage_snapshot(&stage_tasks),
            ))
        };

        let mut stage_history = job.stage_history.clone();
        if let Some((record, _)) = &final_stage {
            stage_history.push(record.clone());
        }

        let completed_at = tasks
            .iter()
            .filter(|task| task.is_terminal())
            .map(finished_at)
            .max()
            .unwrap_or(job.created_at);

        let mut result = JobResult {
            job_id: job.job_id.clone(),
            job_type: job.job_type.clone(),
            status,
            total_tasks: counts.total,
            completed_tasks: counts.completed,
            failed_tasks: counts.failed,
            success_rate: success_rate(counts.completed, counts.total),
            task_results: self.result_samples(tasks),
            task_errors: self.error_samples(tasks),
            stage_history,
            completed_at,
            extensions: BTreeMap::new(),
        };
        if let Some(controller) = &controller {
            controller.aggregate_results(job, tasks, &mut result);
        }

        let patch = JobPatch::Finalize {
            status,
            result_data: serde_json::to_value(&result)?,
            progress: JobProgress::from_counts(&counts),
            final_stage,
            completed_at,
        };

        match self.store.update_job(&job.job_id, patch).await? {
            WriteOutcome::Applied(updated) => {
                info!(
                    job_id = %job.job_id,
                    status = %updated.status,
                    completed = counts.completed,
                    failed = counts.failed,
                    total = counts.total,
                    "Job finalized"
                );
                let details = format!("{}/{} tasks completed", counts.completed, counts.total);
                log_job_operation(
                    "finalize",
                    &job.job_id,
                    Some(&job.job_type),
                    updated.status.as_str(),
                    Some(&details),
                );
                Ok(JobCompletionOutcome::Finalized {
                    status: updated.status,
                })
            }
            WriteOutcome::Rejected(current) => {
                debug!(job_id = %job.job_id, status = %current.status, "Job finalized by another worker");
                Ok(JobCompletionOutcome::AlreadyTerminal {
                    status: current.status,
                })
            }
        }
    }

    fn result_samples(&self, tasks: &[Task]) -> Vec<TaskResultSample> {
        tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Completed)
            .filter_map(|task| {
                task.result_data.clone().map(|output| TaskResultSample {
                    task_id: task.task_id.clone(),
                    stage: task.stage,
                    index: task.index,
                    output,
                })
            })
            .take(self.max_result_samples)
            .collect()
    }

    fn error_samples(&self, tasks: &[Task]) -> Vec<TaskErrorSample> {
        tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Failed)
            .map(|task| TaskErrorSample {
                task_id: task.task_id.clone(),
                stage: task.stage,
                index: task.index,
                error: task
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "task failed without an error message".to_string()),
            })
            .take(self.max_error_samples)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskOutput;
    use crate::store::{InMemoryJobStore, TaskUpdate};
    use chrono::Utc;
    use serde_json::json;

    fn task(job_id: &str, index: u32) -> Task {
        let now = Utc::now();
        Task {
            task_id: format!("{job_id}-t{index}"),
            parent_job_id: job_id.to_string(),
            job_type: "hello_world".to_string(),
            task_type: "hello_world_greeting".to_string(),
            index,
            stage: 1,
            status: TaskStatus::Queued,
            parameters: json!({}),
            result_data: None,
            error_message: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    async fn setup(task_count: u32) -> (Arc<InMemoryJobStore>, JobFinalizer, Vec<String>) {
        let store = Arc::new(InMemoryJobStore::new());
        let mut job = Job::new("job", "hello_world", json!({"n": task_count}), 1);
        job.status = JobStatus::Processing;
        store.create_job(&job).await.unwrap();

        let mut ids = Vec::new();
        for index in 0..task_count {
            let task = task("job", index);
            store.insert_task(&task).await.unwrap();
            ids.push(task.task_id);
        }

        let finalizer = JobFinalizer::new(
            store.clone(),
            Arc::new(ControllerRegistry::with_default_controllers()),
            &OrchestrationConfig::default(),
        );
        (store, finalizer, ids)
    }

    fn greeting(index: u32) -> TaskOutput {
        TaskOutput::Greeting {
            index,
            message: "Hello World".to_string(),
        }
    }

    #[test]
    fn test_final_status_rules() {
        let counts = |completed, failed| TaskCounts {
            total: completed + failed,
            completed,
            failed,
            ..TaskCounts::default()
        };
        assert_eq!(final_status(&counts(3, 0)), JobStatus::Completed);
        assert_eq!(final_status(&counts(0, 2)), JobStatus::Failed);
        assert_eq!(final_status(&counts(3, 1)), JobStatus::CompletedWithErrors);
    }

    #[tokio::test]
    async fn test_in_progress_refreshes_progress() {
        let (store, finalizer, ids) = setup(2).await;
        store
            .update_task(&ids[0], TaskUpdate::completed(greeting(0)))
            .await
            .unwrap();

        let outcome = finalizer.check_and_finalize("job").await.unwrap();
        assert_eq!(
            outcome,
            JobCompletionOutcome::InProgress {
                completed: 1,
                failed: 0,
                total: 2
            }
        );
        let job = store.get_job("job").await.unwrap().unwrap();
        assert_eq!(job.progress.completed_tasks, 1);
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_refinalization_is_identical() {
        let (store, finalizer, ids) = setup(2).await;
        store
            .update_task(&ids[0], TaskUpdate::completed(greeting(0)))
            .await
            .unwrap();
        store
            .update_task(&ids[1], TaskUpdate::failed("boom"))
            .await
            .unwrap();

        let first = finalizer.check_and_finalize("job").await.unwrap();
        assert_eq!(
            first,
            JobCompletionOutcome::Finalized {
                status: JobStatus::CompletedWithErrors
            }
        );
        let snapshot = store.get_job("job").await.unwrap().unwrap();

        let second = finalizer.check_and_finalize("job").await.unwrap();
        assert!(matches!(second, JobCompletionOutcome::AlreadyTerminal { .. }));
        let again = store.get_job("job").await.unwrap().unwrap();
        assert_eq!(snapshot, again);

        let result = again.result_data.unwrap();
        assert_eq!(result["task_errors"].as_array().unwrap().len(), 1);
        assert_eq!(result["hello_statistics"]["hellos_failed"], 1);
        assert_eq!(again.stage_history.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_job() {
        let (_, finalizer, _) = setup(0).await;
        let err = finalizer.check_and_finalize("nope").await.unwrap_err();
        assert!(matches!(err, GeoflowError::JobNotFound(_)));
    }
}
