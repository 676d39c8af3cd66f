//! # Job Model
//!
//! The user-facing unit of orchestration. A job fans out into tasks, possibly across
//! several sequential stages, and carries the aggregated result once every task of
//! its final stage is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::task::TaskCounts;
use crate::state_machine::JobStatus;

/// Stored job record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub job_type: String,
    pub status: JobStatus,
    /// Normalized, validated request parameters
    pub parameters: serde_json::Value,
    pub current_stage: u32,
    pub total_stages: u32,
    /// Append-only, at most one record per stage
    #[serde(default)]
    pub stage_history: Vec<StageRecord>,
    /// Snapshot of each completed stage's task results, keyed by stage number
    #[serde(default)]
    pub stage_results: BTreeMap<u32, serde_json::Value>,
    #[serde(default)]
    pub task_ids: BTreeSet<String>,
    #[serde(default)]
    pub progress: JobProgress,
    pub result_data: Option<serde_json::Value>,
    pub error_details: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Stage whose tasks are persisted but whose messages are not confirmed sent
    #[serde(default)]
    pub pending_enqueue_stage: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a fresh `pending` job on its first stage
    pub fn new(
        job_id: impl Into<String>,
        job_type: impl Into<String>,
        parameters: serde_json::Value,
        total_stages: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            job_type: job_type.into(),
            status: JobStatus::Pending,
            parameters,
            current_stage: 1,
            total_stages: total_stages.max(1),
            stage_history: Vec::new(),
            stage_results: BTreeMap::new(),
            task_ids: BTreeSet::new(),
            progress: JobProgress::default(),
            result_data: None,
            error_details: None,
            warnings: Vec::new(),
            pending_enqueue_stage: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_staged(&self) -> bool {
        self.total_stages > 1
    }

    pub fn is_final_stage(&self) -> bool {
        self.current_stage >= self.total_stages
    }

    pub fn stage_record(&self, stage: u32) -> Option<&StageRecord> {
        self.stage_history.iter().find(|record| record.stage == stage)
    }

    pub fn has_stage_record(&self, stage: u32) -> bool {
        self.stage_record(stage).is_some()
    }

    /// Request parameter lookup
    pub fn parameter(&self, key: &str) -> Option<&serde_json::Value> {
        self.parameters.get(key)
    }
}

/// Completion record for one stage of a sequential job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: u32,
    pub name: String,
    pub task_count: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    /// Wall-clock span from the earliest task creation to the latest task update
    pub duration_seconds: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Progress counters for a job, derived from its tasks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub processing_tasks: usize,
    pub queued_tasks: usize,
    pub progress_percentage: f64,
}

impl JobProgress {
    pub fn from_counts(counts: &TaskCounts) -> Self {
        let finished = counts.completed + counts.failed;
        let progress_percentage = if counts.total == 0 {
            0.0
        } else {
            (finished as f64 / counts.total as f64 * 10_000.0).round() / 100.0
        };

        Self {
            total_tasks: counts.total,
            completed_tasks: counts.completed,
            failed_tasks: counts.failed,
            processing_tasks: counts.processing,
            queued_tasks: counts.queued,
            progress_percentage,
        }
    }
}
