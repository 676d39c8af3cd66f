//! A [`JobStore`] whose task scans fail on demand.

use async_trait::async_trait;
use geoflow_core::store::{
    InMemoryJobStore, JobPatch, JobStore, StoreError, StoreResult, TaskUpdate, WriteOutcome,
};
use geoflow_core::{Job, Task};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryJobStore,
    /// Remaining `list_tasks_for_job` calls that fail
    failing_scans: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` whole-job task scans
    pub fn fail_next_scans(&self, count: usize) {
        self.failing_scans.store(count, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.failing_scans
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn get_job(&self, job_id: &str) -> StoreResult<Option<Job>> {
        self.inner.get_job(job_id).await
    }

    async fn create_job(&self, job: &Job) -> StoreResult<bool> {
        self.inner.create_job(job).await
    }

    async fn update_job(&self, job_id: &str, patch: JobPatch) -> StoreResult<WriteOutcome<Job>> {
        self.inner.update_job(job_id, patch).await
    }

    async fn insert_task(&self, task: &Task) -> StoreResult<bool> {
        self.inner.insert_task(task).await
    }

    async fn get_task(&self, task_id: &str) -> StoreResult<Option<Task>> {
        self.inner.get_task(task_id).await
    }

    async fn update_task(
        &self,
        task_id: &str,
        update: TaskUpdate,
    ) -> StoreResult<WriteOutcome<Task>> {
        self.inner.update_task(task_id, update).await
    }

    async fn list_tasks_for_job(&self, job_id: &str) -> StoreResult<Vec<Task>> {
        if self.take_failure() {
            return Err(StoreError::unavailable("injected scan failure"));
        }
        self.inner.list_tasks_for_job(job_id).await
    }

    async fn list_tasks_for_stage(&self, job_id: &str, stage: u32) -> StoreResult<Vec<Task>> {
        self.inner.list_tasks_for_stage(job_id, stage).await
    }

    async fn delete_tasks_for_job(&self, job_id: &str) -> StoreResult<usize> {
        self.inner.delete_tasks_for_job(job_id).await
    }
}
