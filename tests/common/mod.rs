//! Shared fixtures for integration tests: wired in-memory systems, request
//! builders and failure-injecting queue and store wrappers.

#![allow(dead_code)]

pub mod builders;
pub mod flaky_queue;
pub mod flaky_store;

pub use builders::*;
pub use flaky_queue::FlakyQueue;
pub use flaky_store::FlakyStore;

use geoflow_core::config::GeoflowConfig;
use geoflow_core::messaging::{InMemoryTaskQueue, TaskQueue};
use geoflow_core::orchestration::{OrchestrationSystem, TaskUpdateOutcome};
use geoflow_core::registry::ControllerRegistry;
use geoflow_core::store::{InMemoryJobStore, JobStore, TaskUpdate};
use geoflow_core::worker::{TaskHandlerRegistry, TaskWorker};
use geoflow_core::{Task, TaskOutput};
use std::sync::Arc;

/// Fully in-memory system with the built-in controllers
pub async fn system() -> OrchestrationSystem {
    OrchestrationSystem::in_memory(GeoflowConfig::default())
        .await
        .expect("in-memory system")
}

/// In-memory store with a caller-provided queue
pub async fn system_with_queue(queue: Arc<dyn TaskQueue>) -> OrchestrationSystem {
    OrchestrationSystem::assemble(
        GeoflowConfig::default(),
        Arc::new(InMemoryJobStore::new()),
        queue,
        Arc::new(ControllerRegistry::with_default_controllers()),
    )
    .await
    .expect("system with custom queue")
}

/// In-memory queue over a caller-provided store; messages left unacknowledged are
/// visible again on the next receive
pub async fn system_with_store(store: Arc<dyn JobStore>) -> OrchestrationSystem {
    let mut config = GeoflowConfig::default();
    config.queue.visibility_timeout_seconds = 0;
    OrchestrationSystem::assemble(
        config,
        store,
        Arc::new(InMemoryTaskQueue::new()),
        Arc::new(ControllerRegistry::with_default_controllers()),
    )
    .await
    .expect("system with custom store")
}

/// In-memory system with a caller-provided controller registry
pub async fn system_with_registry(registry: ControllerRegistry) -> OrchestrationSystem {
    OrchestrationSystem::assemble(
        GeoflowConfig::default(),
        Arc::new(InMemoryJobStore::new()),
        Arc::new(InMemoryTaskQueue::new()),
        Arc::new(registry),
    )
    .await
    .expect("system with custom registry")
}

pub fn worker(system: &OrchestrationSystem, id: &str) -> TaskWorker {
    TaskWorker::for_system(
        id,
        system,
        Arc::new(TaskHandlerRegistry::with_default_handlers()),
    )
}

pub async fn tasks_for(system: &OrchestrationSystem, job_id: &str) -> Vec<Task> {
    system
        .store
        .list_tasks_for_job(job_id)
        .await
        .expect("list tasks")
}

pub async fn tasks_for_stage(system: &OrchestrationSystem, job_id: &str, stage: u32) -> Vec<Task> {
    system
        .store
        .list_tasks_for_stage(job_id, stage)
        .await
        .expect("list stage tasks")
}

/// Report a greeting task as completed, bypassing the worker
pub async fn complete_greeting(system: &OrchestrationSystem, task: &Task) -> TaskUpdateOutcome {
    system
        .task_manager
        .update_task_status(
            &task.task_id,
            TaskUpdate::completed(TaskOutput::Greeting {
                index: task.index,
                message: "Hello World".to_string(),
            }),
        )
        .await
        .expect("complete task")
}

pub async fn fail_task(system: &OrchestrationSystem, task: &Task, error: &str) -> TaskUpdateOutcome {
    system
        .task_manager
        .update_task_status(&task.task_id, TaskUpdate::failed(error))
        .await
        .expect("fail task")
}
