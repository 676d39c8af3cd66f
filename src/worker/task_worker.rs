//! # Task Worker
//!
//! Reference executor loop: receive task messages, run the matching handler and
//! report the outcome through the [`TaskManager`].
//!
//! Delivery is at-least-once. A message for a task that is already terminal does
//! not run the handler again; the job checks that follow a terminal report are
//! repeated and the message is acknowledged once they succeed. A message whose
//! report or checks failed is left unacknowledged so the queue redelivers it after
//! the visibility timeout.

use super::handler::{TaskExecutionError, TaskHandlerRegistry};
use crate::config::GeoflowConfig;
use crate::error::{GeoflowError, Result};
use crate::messaging::{ReceivedMessage, TaskQueue};
use crate::orchestration::{OrchestrationSystem, TaskManager, TaskUpdateOutcome};
use crate::store::TaskUpdate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// Counts for one receive batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub received: usize,
    pub completed: usize,
    pub failed: usize,
    /// Duplicate deliveries and messages for tasks that no longer exist
    pub skipped: usize,
    /// Left on the queue for redelivery
    pub errored: usize,
}

impl BatchSummary {
    fn absorb(&mut self, other: BatchSummary) {
        self.received += other.received;
        self.completed += other.completed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.errored += other.errored;
    }
}

enum MessageOutcome {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct TaskWorker {
    worker_id: String,
    queue: Arc<dyn TaskQueue>,
    queue_name: String,
    task_manager: TaskManager,
    handlers: Arc<TaskHandlerRegistry>,
    visibility_timeout: Duration,
    batch_size: usize,
    poll_interval: Duration,
}

impl TaskWorker {
    pub fn new(
        worker_id: impl Into<String>,
        queue: Arc<dyn TaskQueue>,
        task_manager: TaskManager,
        handlers: Arc<TaskHandlerRegistry>,
        config: &GeoflowConfig,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            queue,
            queue_name: config.queue.tasks_queue.clone(),
            task_manager,
            handlers,
            visibility_timeout: config.queue.visibility_timeout(),
            batch_size: config.worker.batch_size,
            poll_interval: config.worker.poll_interval(),
        }
    }

    /// Worker over a wired system's queue and task manager
    pub fn for_system(
        worker_id: impl Into<String>,
        system: &OrchestrationSystem,
        handlers: Arc<TaskHandlerRegistry>,
    ) -> Self {
        Self::new(
            worker_id,
            system.queue.clone(),
            system.task_manager.clone(),
            handlers,
            &system.config,
        )
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Receive and process one batch
    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn run_once(&self) -> Result<BatchSummary> {
        let messages = self
            .queue
            .receive(&self.queue_name, self.visibility_timeout, self.batch_size)
            .await?;

        let mut summary = BatchSummary {
            received: messages.len(),
            ..BatchSummary::default()
        };
        for received in messages {
            match self.process_message(&received).await {
                Ok(outcome) => {
                    match outcome {
                        MessageOutcome::Completed => summary.completed += 1,
                        MessageOutcome::Failed => summary.failed += 1,
                        MessageOutcome::Skipped => summary.skipped += 1,
                    }
                    if let Err(e) = self.queue.ack(&self.queue_name, received.message_id).await {
                        warn!(message_id = received.message_id, error = %e, "Failed to ack message");
                    }
                }
                Err(e) => {
                    error!(
                        task_id = %received.message.task_id,
                        message_id = received.message_id,
                        error = %e,
                        "Task report failed; leaving message for redelivery"
                    );
                    summary.errored += 1;
                }
            }
        }
        Ok(summary)
    }

    /// Process batches until a receive comes back empty
    pub async fn run_until_idle(&self) -> Result<BatchSummary> {
        let mut total = BatchSummary::default();
        loop {
            let batch = self.run_once().await?;
            if batch.received == 0 {
                return Ok(total);
            }
            total.absorb(batch);
        }
    }

    /// Poll until `shutdown` flips to `true`
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<BatchSummary> {
        info!(worker_id = %self.worker_id, queue = %self.queue_name, "Worker started");
        let mut total = BatchSummary::default();

        while !*shutdown.borrow() {
            let batch = match self.run_once().await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(worker_id = %self.worker_id, error = %e, "Receive failed");
                    BatchSummary::default()
                }
            };
            let idle = batch.received == 0;
            total.absorb(batch);

            if idle {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        info!(
            worker_id = %self.worker_id,
            completed = total.completed,
            failed = total.failed,
            skipped = total.skipped,
            "Worker stopped"
        );
        Ok(total)
    }

    async fn process_message(&self, received: &ReceivedMessage) -> Result<MessageOutcome> {
        let message = &received.message;
        let task = match self.task_manager.get_task(&message.task_id).await {
            Ok(task) => task,
            Err(GeoflowError::TaskNotFound(_)) => {
                warn!(task_id = %message.task_id, "Message for unknown task");
                return Ok(MessageOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };
        if task.is_terminal() {
            debug!(
                task_id = %task.task_id,
                read_count = received.read_count,
                "Duplicate delivery for terminal task"
            );
            let rechecked = self.task_manager.recheck_terminal_task(task).await?;
            if rechecked.job_finalized() {
                info!(job_id = %rechecked.task().parent_job_id, "Job finalized on redelivery");
            }
            return Ok(MessageOutcome::Skipped);
        }

        let claimed = self
            .task_manager
            .update_task_status(&task.task_id, TaskUpdate::processing())
            .await?;
        if let TaskUpdateOutcome::AlreadyTerminal { .. } = claimed {
            return Ok(MessageOutcome::Skipped);
        }
        let task = claimed.task().clone();

        let result = match self.handlers.get(&task.task_type) {
            Ok(handler) => handler.execute(&task).await,
            Err(e) => Err(e),
        };

        let (update, outcome) = match result {
            Ok(output) => (TaskUpdate::completed(output), MessageOutcome::Completed),
            Err(e) => {
                if matches!(e, TaskExecutionError::HandlerNotFound(_)) {
                    warn!(task_id = %task.task_id, task_type = %task.task_type, "No handler for task type");
                }
                (TaskUpdate::failed(e.to_string()), MessageOutcome::Failed)
            }
        };

        match self.task_manager.update_task_status(&task.task_id, update).await? {
            TaskUpdateOutcome::AlreadyTerminal { .. } => Ok(MessageOutcome::Skipped),
            updated => {
                if updated.job_finalized() {
                    info!(job_id = %task.parent_job_id, "Job finalized by this worker");
                }
                Ok(outcome)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{JobStatus, TaskStatus};
    use crate::store::JobStore;
    use serde_json::json;

    async fn system() -> OrchestrationSystem {
        OrchestrationSystem::in_memory(GeoflowConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_worker_drains_hello_world() {
        let system = system().await;
        let outcome = system
            .job_initializer
            .process_job(&json!({"job_type": "hello_world", "system": true, "n": 3}))
            .await
            .unwrap();

        let worker = TaskWorker::for_system(
            "w1",
            &system,
            Arc::new(TaskHandlerRegistry::with_default_handlers()),
        );
        let summary = worker.run_until_idle().await.unwrap();
        assert_eq!(summary.completed, 3);

        let job = system.job_initializer.get_job(&outcome.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_missing_handler_fails_task() {
        let system = system().await;
        let outcome = system
            .job_initializer
            .process_job(&json!({"job_type": "hello_world", "system": true, "n": 1}))
            .await
            .unwrap();

        let worker = TaskWorker::for_system("w1", &system, Arc::new(TaskHandlerRegistry::new()));
        let summary = worker.run_until_idle().await.unwrap();
        assert_eq!(summary.failed, 1);

        let tasks = system.store.list_tasks_for_job(&outcome.job_id).await.unwrap();
        assert_eq!(tasks[0].status, TaskStatus::Failed);
        assert!(tasks[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("No handler registered"));
        let job = system.job_initializer.get_job(&outcome.job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_worker() {
        let system = system().await;
        let worker = TaskWorker::for_system(
            "w1",
            &system,
            Arc::new(TaskHandlerRegistry::with_default_handlers()),
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(rx).await });
        tx.send(true).unwrap();
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.received, 0);
    }
}
