//! # Task Enqueuer
//!
//! Turns controller task definitions into task records, persists them
//! insert-if-absent, and sends one queue message per task while tracking which
//! sends failed.

use crate::error::Result;
use crate::identity::generate_task_id;
use crate::messaging::{TaskQueue, TaskQueueMessage};
use crate::models::{Job, Task};
use crate::orchestration::types::TaskDefinition;
use crate::state_machine::TaskStatus;
use crate::store::JobStore;
use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Per-task outcome of enqueueing a batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueReport {
    pub enqueued: Vec<String>,
    /// (task id, error message)
    pub failed: Vec<(String, String)>,
}

impl EnqueueReport {
    pub fn total(&self) -> usize {
        self.enqueued.len() + self.failed.len()
    }

    pub fn all_enqueued(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn none_enqueued(&self) -> bool {
        self.enqueued.is_empty() && !self.failed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct TaskEnqueuer {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn TaskQueue>,
    queue_name: String,
}

impl TaskEnqueuer {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn TaskQueue>, queue_name: impl Into<String>) -> Self {
        Self {
            store,
            queue,
            queue_name: queue_name.into(),
        }
    }

    /// Build task records for one stage. Definitions that hash to the same task id
    /// collapse into one task.
    pub fn build_tasks(&self, job: &Job, stage: u32, definitions: Vec<TaskDefinition>) -> Result<Vec<Task>> {
        let now = Utc::now();
        let mut seen = BTreeSet::new();
        let mut tasks = Vec::with_capacity(definitions.len());

        for definition in definitions {
            let task_id = generate_task_id(
                &job.job_id,
                &definition.task_type,
                stage,
                definition.index,
                &definition.parameters,
            )?;
            if !seen.insert(task_id.clone()) {
                warn!(job_id = %job.job_id, task_id = %task_id, "Duplicate task definition skipped");
                continue;
            }
            tasks.push(Task {
                task_id,
                parent_job_id: job.job_id.clone(),
                job_type: job.job_type.clone(),
                task_type: definition.task_type,
                index: definition.index,
                stage,
                status: TaskStatus::Queued,
                parameters: definition.parameters,
                result_data: None,
                error_message: None,
                retry_count: 0,
                created_at: now,
                updated_at: now,
                completed_at: None,
            });
        }
        Ok(tasks)
    }

    /// Insert-if-absent; returns how many tasks were newly created
    #[instrument(skip(self, tasks), fields(task_count = tasks.len()))]
    pub async fn persist(&self, tasks: &[Task]) -> Result<usize> {
        let mut created = 0;
        for task in tasks {
            if self.store.insert_task(task).await? {
                created += 1;
            } else {
                debug!(task_id = %task.task_id, "Task already exists");
            }
        }
        Ok(created)
    }

    /// Send one message per task; a failed send never aborts the batch
    #[instrument(skip(self, job, tasks), fields(job_id = %job.job_id, task_count = tasks.len()))]
    pub async fn enqueue(&self, job: &Job, tasks: &[Task]) -> EnqueueReport {
        let sends = tasks.iter().map(|task| {
            let message = TaskQueueMessage::for_task(task, job);
            async move { (task, self.queue.send(&self.queue_name, &message).await) }
        });

        let mut report = EnqueueReport::default();
        for (task, sent) in join_all(sends).await {
            match sent {
                Ok(message_id) => {
                    debug!(task_id = %task.task_id, message_id, "Task enqueued");
                    report.enqueued.push(task.task_id.clone());
                }
                Err(e) => {
                    warn!(task_id = %task.task_id, error = %e, "Failed to enqueue task");
                    report.failed.push((task.task_id.clone(), e.to_string()));
                }
            }
        }
        report
    }
}
