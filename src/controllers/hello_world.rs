//! `hello_world`: fan out `n` greeting tasks in a single stage.
//!
//! ```json
//! {"job_type": "hello_world", "system": true, "n": 3, "message": "Hello World"}
//! ```
//!
//! `fail_indices` makes the greeting handler fail for the listed indices, which is
//! how partial-failure behavior is exercised end to end.

use super::{param_str, param_u32, unknown_stage};
use crate::constants::{operations, task_types};
use crate::error::Result;
use crate::models::{Job, Task, TaskOutput};
use crate::orchestration::controller::JobController;
use crate::orchestration::types::{
    success_rate, JobResult, StageContext, StageDefinition, TaskDefinition,
};
use crate::state_machine::TaskStatus;
use crate::validation::{FieldSpec, FieldType, ParameterSchema};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

pub const DEFAULT_GREETINGS: u32 = 3;
pub const MAX_GREETINGS: i64 = 1000;
pub const DEFAULT_MESSAGE: &str = "Hello World";

#[derive(Debug, Default, Clone, Copy)]
pub struct HelloWorldController;

pub fn factory() -> Arc<dyn JobController> {
    Arc::new(HelloWorldController)
}

/// Request schema shared by the hello world operations
pub(crate) fn hello_schema() -> ParameterSchema {
    ParameterSchema::new()
        .field(
            FieldSpec::integer("n")
                .range(1, MAX_GREETINGS)
                .with_default(json!(DEFAULT_GREETINGS)),
        )
        .field(FieldSpec::string("message").with_default(json!(DEFAULT_MESSAGE)))
        .field(FieldSpec::array_of("fail_indices", FieldType::Integer))
        .deprecated("number_of_tasks", "n")
}

/// One greeting task per index in `0..n`
pub(crate) fn greeting_tasks(job: &Job) -> Vec<TaskDefinition> {
    let n = param_u32(job, "n", DEFAULT_GREETINGS);
    let message = param_str(job, "message", DEFAULT_MESSAGE);
    let fail_indices: BTreeSet<u64> = job
        .parameter("fail_indices")
        .and_then(|value| value.as_array())
        .map(|items| items.iter().filter_map(|item| item.as_u64()).collect())
        .unwrap_or_default();

    (0..n)
        .map(|index| {
            TaskDefinition::new(
                task_types::HELLO_WORLD_GREETING,
                index,
                json!({
                    "index": index,
                    "message": message,
                    "should_fail": fail_indices.contains(&u64::from(index)),
                }),
            )
        })
        .collect()
}

/// `hello_statistics` over the greeting tasks of a job
pub(crate) fn hello_statistics(job: &Job, tasks: &[Task]) -> serde_json::Value {
    let greetings: Vec<&Task> = tasks
        .iter()
        .filter(|task| task.task_type == task_types::HELLO_WORLD_GREETING)
        .collect();
    let completed = greetings
        .iter()
        .filter(|task| {
            task.status == TaskStatus::Completed
                && matches!(task.result_data, Some(TaskOutput::Greeting { .. }))
        })
        .count();
    let failed = greetings
        .iter()
        .filter(|task| task.status == TaskStatus::Failed)
        .count();
    let requested = param_u32(job, "n", greetings.len() as u32);

    json!({
        "total_hellos_requested": requested,
        "hellos_completed_successfully": completed,
        "hellos_failed": failed,
        "success_rate": success_rate(completed, requested as usize),
    })
}

impl JobController for HelloWorldController {
    fn job_type(&self) -> &'static str {
        operations::HELLO_WORLD
    }

    fn parameter_schema(&self) -> ParameterSchema {
        hello_schema()
    }

    fn stages(&self) -> Vec<StageDefinition> {
        vec![StageDefinition {
            number: 1,
            name: "greeting",
            task_type: task_types::HELLO_WORLD_GREETING,
        }]
    }

    fn create_stage_tasks(&self, context: &StageContext<'_>) -> Result<Vec<TaskDefinition>> {
        match context.stage {
            1 => Ok(greeting_tasks(context.job)),
            stage => Err(unknown_stage(context.job, stage)),
        }
    }

    fn aggregate_results(&self, job: &Job, tasks: &[Task], result: &mut JobResult) {
        result.insert_extension("hello_statistics", hello_statistics(job, tasks));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(parameters: serde_json::Value) -> Job {
        Job::new("job", operations::HELLO_WORLD, parameters, 1)
    }

    #[test]
    fn test_creates_one_task_per_greeting() {
        let job = job(json!({"n": 3, "message": "Hi", "fail_indices": [1]}));
        let tasks = HelloWorldController
            .create_stage_tasks(&StageContext::initial(&job))
            .unwrap();

        assert_eq!(tasks.len(), 3);
        assert_eq!(
            tasks.iter().map(|t| t.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(tasks[0].parameters["message"], "Hi");
        assert_eq!(tasks[1].parameters["should_fail"], true);
        assert_eq!(tasks[2].parameters["should_fail"], false);
    }

    #[test]
    fn test_unknown_stage_is_a_task_creation_error() {
        let job = job(json!({"n": 1}));
        let context = StageContext {
            job: &job,
            stage: 2,
            previous_results: &[],
        };
        let err = HelloWorldController.create_stage_tasks(&context).unwrap_err();
        assert!(err.to_string().contains("no stage 2"));
    }

    #[test]
    fn test_schema_defaults() {
        let raw = json!({"job_type": "hello_world", "system": true});
        let request = crate::validation::validate_request(
            &raw,
            &HelloWorldController.parameter_schema(),
            crate::validation::ValidationMode::Strict,
        )
        .unwrap();

        assert_eq!(request.parameter("n"), Some(&json!(3)));
        assert_eq!(request.parameter("message"), Some(&json!("Hello World")));
    }
}
