//! Stage records and result snapshots built from a stage's terminal tasks.
//!
//! Both are pure functions of the task records, so every worker that observes a
//! finished stage computes the same record.

use crate::models::{StageRecord, Task};
use crate::state_machine::TaskStatus;
use chrono::{DateTime, Utc};
use serde_json::json;

/// Completion time of a terminal task
pub(crate) fn finished_at(task: &Task) -> DateTime<Utc> {
    task.completed_at.unwrap_or(task.updated_at)
}

/// Summarize one stage; duration spans earliest creation to latest completion
pub fn summarize_stage(stage: u32, name: &str, tasks: &[Task]) -> StageRecord {
    let started_at = tasks.iter().map(|task| task.created_at).min();
    let completed_at = tasks.iter().map(finished_at).max();
    let duration_seconds = match (started_at, completed_at) {
        (Some(start), Some(end)) if end > start => {
            (end - start).num_milliseconds() as f64 / 1000.0
        }
        _ => 0.0,
    };

    StageRecord {
        stage,
        name: name.to_string(),
        task_count: tasks.len(),
        completed_tasks: tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Completed)
            .count(),
        failed_tasks: tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Failed)
            .count(),
        duration_seconds,
        started_at,
        completed_at,
    }
}

/// Per-task results of one stage, in task order
pub fn stage_snapshot(tasks: &[Task]) -> serde_json::Value {
    serde_json::Value::Array(
        tasks
            .iter()
            .map(|task| {
                json!({
                    "task_id": task.task_id,
                    "index": task.index,
                    "status": task.status,
                    "result": task.result_data,
                    "error": task.error_message,
                })
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn task(index: u32, status: TaskStatus, offset_ms: i64) -> Task {
        let base = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        Task {
            task_id: format!("t{index}"),
            parent_job_id: "job".to_string(),
            job_type: "hello_world".to_string(),
            task_type: "hello_world_greeting".to_string(),
            index,
            stage: 1,
            status,
            parameters: json!({}),
            result_data: None,
            error_message: (status == TaskStatus::Failed).then(|| "boom".to_string()),
            retry_count: 0,
            created_at: base,
            updated_at: base + Duration::milliseconds(offset_ms),
            completed_at: Some(base + Duration::milliseconds(offset_ms)),
        }
    }

    #[test]
    fn test_summary_counts_and_duration() {
        let tasks = vec![
            task(0, TaskStatus::Completed, 500),
            task(1, TaskStatus::Failed, 1500),
        ];
        let record = summarize_stage(1, "greeting", &tasks);

        assert_eq!(record.task_count, 2);
        assert_eq!(record.completed_tasks, 1);
        assert_eq!(record.failed_tasks, 1);
        assert_eq!(record.duration_seconds, 1.5);
    }

    #[test]
    fn test_empty_stage() {
        let record = summarize_stage(2, "cataloging", &[]);
        assert_eq!(record.task_count, 0);
        assert_eq!(record.duration_seconds, 0.0);
        assert!(record.started_at.is_none());
    }

    #[test]
    fn test_snapshot_is_ordered_array() {
        let tasks = vec![
            task(0, TaskStatus::Completed, 10),
            task(1, TaskStatus::Failed, 20),
        ];
        let snapshot = stage_snapshot(&tasks);
        assert_eq!(snapshot[1]["error"], "boom");
        assert_eq!(snapshot[0]["status"], "completed");
    }
}
