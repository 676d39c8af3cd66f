//! In-memory job store.
//!
//! Backs tests, the demo binary and single-process deployments. Each record lives
//! in a `DashMap` entry, so a patch holds exactly that entry's shard lock while it
//! runs and concurrent patches to one record are serialized.

use super::{sort_tasks, JobPatch, JobStore, StoreError, StoreResult, TaskUpdate, WriteOutcome};
use crate::models::{Job, Task};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug, Default, Clone)]
pub struct InMemoryJobStore {
    jobs: Arc<DashMap<String, Job>>,
    tasks: Arc<DashMap<String, Task>>,
    /// parent job id -> task ids
    job_tasks: Arc<DashMap<String, BTreeSet<String>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    fn task_ids_for(&self, job_id: &str) -> Vec<String> {
        self.job_tasks
            .get(job_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn get_job(&self, job_id: &str) -> StoreResult<Option<Job>> {
        Ok(self.jobs.get(job_id).map(|job| job.clone()))
    }

    async fn create_job(&self, job: &Job) -> StoreResult<bool> {
        Ok(match self.jobs.entry(job.job_id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(job.clone());
                true
            }
        })
    }

    async fn update_job(&self, job_id: &str, patch: JobPatch) -> StoreResult<WriteOutcome<Job>> {
        let mut entry = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::job_not_found(job_id))?;
        let applied = patch.apply(entry.value_mut());
        let job = entry.value().clone();
        Ok(if applied {
            WriteOutcome::Applied(job)
        } else {
            WriteOutcome::Rejected(job)
        })
    }

    async fn insert_task(&self, task: &Task) -> StoreResult<bool> {
        let inserted = match self.tasks.entry(task.task_id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(task.clone());
                true
            }
        };
        if inserted {
            self.job_tasks
                .entry(task.parent_job_id.clone())
                .or_default()
                .insert(task.task_id.clone());
        }
        Ok(inserted)
    }

    async fn get_task(&self, task_id: &str) -> StoreResult<Option<Task>> {
        Ok(self.tasks.get(task_id).map(|task| task.clone()))
    }

    async fn update_task(
        &self,
        task_id: &str,
        update: TaskUpdate,
    ) -> StoreResult<WriteOutcome<Task>> {
        let mut entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::task_not_found(task_id))?;
        let applied = update.apply(entry.value_mut());
        let task = entry.value().clone();
        Ok(if applied {
            WriteOutcome::Applied(task)
        } else {
            WriteOutcome::Rejected(task)
        })
    }

    async fn list_tasks_for_job(&self, job_id: &str) -> StoreResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .task_ids_for(job_id)
            .iter()
            .filter_map(|id| self.tasks.get(id).map(|task| task.clone()))
            .collect();
        sort_tasks(&mut tasks);
        Ok(tasks)
    }

    async fn list_tasks_for_stage(&self, job_id: &str, stage: u32) -> StoreResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .task_ids_for(job_id)
            .iter()
            .filter_map(|id| self.tasks.get(id).map(|task| task.clone()))
            .filter(|task| task.stage == stage)
            .collect();
        sort_tasks(&mut tasks);
        Ok(tasks)
    }

    async fn delete_tasks_for_job(&self, job_id: &str) -> StoreResult<usize> {
        let Some((_, ids)) = self.job_tasks.remove(job_id) else {
            return Ok(0);
        };
        Ok(ids
            .iter()
            .filter(|id| self.tasks.remove(*id).is_some())
            .count())
    }
}
