//! Job completion: last-task-wins in any order, terminal status rules and
//! idempotent re-finalization.

mod common;

use common::*;
use geoflow_core::messaging::TaskQueue;
use geoflow_core::orchestration::{JobCompletionOutcome, TaskUpdateOutcome};
use geoflow_core::store::TaskUpdate;
use geoflow_core::{JobStatus, Task, TaskStatus};
use std::sync::Arc;

/// Orders in which the four tasks of a job report back
const ORDERS: &[[usize; 4]] = &[
    [0, 1, 2, 3],
    [3, 2, 1, 0],
    [1, 3, 0, 2],
    [2, 0, 3, 1],
];

async fn report(system: &geoflow_core::OrchestrationSystem, task: &Task, fail: bool) -> TaskUpdateOutcome {
    if fail {
        fail_task(system, task, "injected failure").await
    } else {
        complete_greeting(system, task).await
    }
}

async fn run_in_order(failing: &[usize], order: &[usize; 4]) -> (JobStatus, usize) {
    let system = system().await;
    let outcome = system
        .job_initializer
        .process_job(&hello_request(4))
        .await
        .unwrap();
    let tasks = tasks_for(&system, &outcome.job_id).await;

    let mut finalizations = 0;
    for (position, &i) in order.iter().enumerate() {
        let update = report(&system, &tasks[i], failing.contains(&i)).await;
        let TaskUpdateOutcome::Updated { completion, .. } = &update else {
            panic!("first report for a task must apply");
        };
        match completion {
            Some(JobCompletionOutcome::Finalized { .. }) => {
                finalizations += 1;
                assert_eq!(position, 3, "job finalized before its last task");
            }
            Some(JobCompletionOutcome::InProgress { total, .. }) => assert_eq!(*total, 4),
            other => panic!("unexpected completion outcome {other:?}"),
        }
    }

    let job = system.job_initializer.get_job(&outcome.job_id).await.unwrap();
    (job.status, finalizations)
}

#[tokio::test]
async fn test_last_task_wins_in_any_order() {
    for order in ORDERS {
        assert_eq!(run_in_order(&[], order).await, (JobStatus::Completed, 1));
        assert_eq!(run_in_order(&[0, 1, 2, 3], order).await, (JobStatus::Failed, 1));
        assert_eq!(
            run_in_order(&[2], order).await,
            (JobStatus::CompletedWithErrors, 1)
        );
    }
}

#[tokio::test]
async fn test_partial_failure_scenario() {
    let system = system().await;
    let outcome = system
        .job_initializer
        .process_job(&hello_request_failing(4, &[1]))
        .await
        .unwrap();

    worker(&system, "w1").run_until_idle().await.unwrap();

    let job = system.job_initializer.get_job(&outcome.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::CompletedWithErrors);

    let result = job.result_data.unwrap();
    let errors = result["task_errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["index"], 1);
    assert!(errors[0]["error"].as_str().unwrap().contains("failed on request"));
    assert_eq!(result["task_results"].as_array().unwrap().len(), 3);
    assert_eq!(result["success_rate"], 75.0);
    assert_eq!(result["hello_statistics"]["hellos_failed"], 1);
}

#[tokio::test]
async fn test_refinalization_produces_identical_job() {
    let system = system().await;
    let outcome = system
        .job_initializer
        .process_job(&hello_request_failing(3, &[0]))
        .await
        .unwrap();
    worker(&system, "w1").run_until_idle().await.unwrap();
    let finalized = system.job_initializer.get_job(&outcome.job_id).await.unwrap();

    let finalizer = system.task_manager.finalizer();
    for _ in 0..2 {
        let again = finalizer.check_and_finalize(&outcome.job_id).await.unwrap();
        assert_eq!(
            again,
            JobCompletionOutcome::AlreadyTerminal {
                status: JobStatus::CompletedWithErrors
            }
        );
    }

    let after = system.job_initializer.get_job(&outcome.job_id).await.unwrap();
    assert_eq!(finalized, after);
}

#[tokio::test]
async fn test_duplicate_terminal_report_is_ignored() {
    let system = system().await;
    let outcome = system
        .job_initializer
        .process_job(&hello_request(1))
        .await
        .unwrap();
    let task = tasks_for(&system, &outcome.job_id).await.remove(0);

    assert!(complete_greeting(&system, &task).await.job_finalized());
    let finalized = system.job_initializer.get_job(&outcome.job_id).await.unwrap();

    let late = system
        .task_manager
        .update_task_status(&task.task_id, TaskUpdate::failed("late failure"))
        .await
        .unwrap();
    assert!(matches!(late, TaskUpdateOutcome::AlreadyTerminal { .. }));

    let after = system.job_initializer.get_job(&outcome.job_id).await.unwrap();
    assert_eq!(after.status, JobStatus::Completed);
    assert_eq!(finalized, after);
}

#[tokio::test]
async fn test_redelivered_processing_counts_retry() {
    let system = system().await;
    let outcome = system
        .job_initializer
        .process_job(&hello_request(2))
        .await
        .unwrap();
    let task = tasks_for(&system, &outcome.job_id).await.remove(0);

    for _ in 0..3 {
        system
            .task_manager
            .update_task_status(&task.task_id, TaskUpdate::processing())
            .await
            .unwrap();
    }
    let task = system.task_manager.get_task(&task.task_id).await.unwrap();
    assert_eq!(task.retry_count, 2);

    let progress = system.job_initializer.get_job_progress(&outcome.job_id).await;
    assert_eq!(progress.processing_tasks, 1);
    assert_eq!(progress.queued_tasks, 1);
}

#[tokio::test]
async fn test_interrupted_completion_check_finishes_on_redelivery() {
    let store = Arc::new(FlakyStore::new());
    let system = system_with_store(store.clone()).await;
    let outcome = system
        .job_initializer
        .process_job(&hello_request(1))
        .await
        .unwrap();

    store.fail_next_scans(1);
    let summary = worker(&system, "w1").run_once().await.unwrap();
    assert_eq!(summary.errored, 1);

    let task = tasks_for(&system, &outcome.job_id).await.remove(0);
    assert_eq!(task.status, TaskStatus::Completed);
    let stranded = system.job_initializer.get_job(&outcome.job_id).await.unwrap();
    assert_eq!(stranded.status, JobStatus::Processing);

    let summary = worker(&system, "w2").run_until_idle().await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.errored, 0);
    assert_eq!(summary.completed, 0);

    let job = system.job_initializer.get_job(&outcome.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result_data.unwrap()["completed_tasks"], 1);
    assert_eq!(
        system.queue.depth(&system.config.queue.tasks_queue).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_interrupted_completion_check_finishes_on_repeated_report() {
    let store = Arc::new(FlakyStore::new());
    let system = system_with_store(store.clone()).await;
    let outcome = system
        .job_initializer
        .process_job(&hello_request(1))
        .await
        .unwrap();
    let task = tasks_for(&system, &outcome.job_id).await.remove(0);

    store.fail_next_scans(1);
    let report = TaskUpdate::completed(geoflow_core::TaskOutput::Greeting {
        index: 0,
        message: "Hello World".to_string(),
    });
    assert!(system
        .task_manager
        .update_task_status(&task.task_id, report.clone())
        .await
        .is_err());

    let repeated = system
        .task_manager
        .update_task_status(&task.task_id, report)
        .await
        .unwrap();
    assert!(matches!(repeated, TaskUpdateOutcome::AlreadyTerminal { .. }));
    assert!(repeated.job_finalized());

    let job = system.job_initializer.get_job(&outcome.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
}
