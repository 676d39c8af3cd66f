//! `hello_world_sequential`: greetings in stage 1, then a single reply in stage 2
//! that is only created once every greeting is terminal.

use super::hello_world::{greeting_tasks, hello_schema, hello_statistics, DEFAULT_MESSAGE};
use super::{param_str, unknown_stage};
use crate::constants::{operations, task_types};
use crate::error::Result;
use crate::models::{Job, Task, TaskOutput};
use crate::orchestration::controller::JobController;
use crate::orchestration::types::{JobResult, StageContext, StageDefinition, TaskDefinition};
use crate::validation::ParameterSchema;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Default, Clone, Copy)]
pub struct HelloWorldSequentialController;

pub fn factory() -> Arc<dyn JobController> {
    Arc::new(HelloWorldSequentialController)
}

impl JobController for HelloWorldSequentialController {
    fn job_type(&self) -> &'static str {
        operations::HELLO_WORLD_SEQUENTIAL
    }

    fn parameter_schema(&self) -> ParameterSchema {
        hello_schema()
    }

    fn stages(&self) -> Vec<StageDefinition> {
        vec![
            StageDefinition {
                number: 1,
                name: "greeting",
                task_type: task_types::HELLO_WORLD_GREETING,
            },
            StageDefinition {
                number: 2,
                name: "reply",
                task_type: task_types::HELLO_WORLD_REPLY,
            },
        ]
    }

    fn create_stage_tasks(&self, context: &StageContext<'_>) -> Result<Vec<TaskDefinition>> {
        match context.stage {
            1 => Ok(greeting_tasks(context.job)),
            2 => {
                let greetings_received = context
                    .previous_outputs()
                    .filter(|output| matches!(output, TaskOutput::Greeting { .. }))
                    .count();
                Ok(vec![TaskDefinition::new(
                    task_types::HELLO_WORLD_REPLY,
                    0,
                    json!({
                        "greetings_received": greetings_received,
                        "message": param_str(context.job, "message", DEFAULT_MESSAGE),
                    }),
                )])
            }
            stage => Err(unknown_stage(context.job, stage)),
        }
    }

    fn aggregate_results(&self, job: &Job, tasks: &[Task], result: &mut JobResult) {
        result.insert_extension("hello_statistics", hello_statistics(job, tasks));

        let reply = tasks.iter().find_map(|task| match &task.result_data {
            Some(TaskOutput::Reply { message, .. }) => Some(message.clone()),
            _ => None,
        });
        if let Some(reply) = reply {
            result.insert_extension("reply", json!(reply));
        }
    }
}
