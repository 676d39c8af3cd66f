//! # Job Controllers
//!
//! A controller owns one operation type: its request schema, its stages, the
//! tasks each stage fans out into, and any operation-specific aggregation of the
//! final results. Controllers are stateless and shared behind `Arc`.

use super::types::{JobResult, StageContext, StageDefinition, TaskDefinition};
use crate::error::Result;
use crate::models::{Job, Task};
use crate::validation::ParameterSchema;

pub trait JobController: Send + Sync {
    /// Operation type this controller handles
    fn job_type(&self) -> &'static str;

    /// Schema for the controller-specific request fields
    fn parameter_schema(&self) -> ParameterSchema;

    /// Stages in execution order, numbered from 1
    fn stages(&self) -> Vec<StageDefinition>;

    fn total_stages(&self) -> u32 {
        (self.stages().len() as u32).max(1)
    }

    fn stage(&self, number: u32) -> Option<StageDefinition> {
        self.stages().into_iter().find(|stage| stage.number == number)
    }

    /// Tasks for `context.stage`. Stage 1 must yield at least one task; later
    /// stages may yield none.
    fn create_stage_tasks(&self, context: &StageContext<'_>) -> Result<Vec<TaskDefinition>>;

    /// Add operation-specific aggregates to the job result
    fn aggregate_results(&self, _job: &Job, _tasks: &[Task], _result: &mut JobResult) {}
}

impl std::fmt::Debug for dyn JobController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobController")
            .field("job_type", &self.job_type())
            .field("total_stages", &self.total_stages())
            .finish()
    }
}
