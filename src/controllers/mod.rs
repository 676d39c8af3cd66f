//! # Built-in Controllers
//!
//! - `hello_world`: single-stage greeting fan-out, the reference for the pattern
//! - `hello_world_sequential`: greetings, then one reply built from their results
//! - `catalog_files`: validate every submitted file, then catalog the valid ones

pub mod catalog_files;
pub mod hello_world;
pub mod hello_world_sequential;

pub use catalog_files::CatalogFilesController;
pub use hello_world::HelloWorldController;
pub use hello_world_sequential::HelloWorldSequentialController;

use crate::constants::operations;
use crate::error::GeoflowError;
use crate::models::Job;
use crate::registry::ControllerRegistry;

/// Register every built-in controller
pub fn register_defaults(registry: &mut ControllerRegistry) {
    registry
        .register(operations::HELLO_WORLD, hello_world::factory)
        .register(
            operations::HELLO_WORLD_SEQUENTIAL,
            hello_world_sequential::factory,
        )
        .register(operations::CATALOG_FILES, catalog_files::factory);
}

fn param_str<'a>(job: &'a Job, key: &str, default: &'a str) -> &'a str {
    job.parameter(key)
        .and_then(|value| value.as_str())
        .unwrap_or(default)
}

fn param_u32(job: &Job, key: &str, default: u32) -> u32 {
    job.parameter(key)
        .and_then(|value| value.as_u64())
        .and_then(|value| u32::try_from(value).ok())
        .unwrap_or(default)
}

fn unknown_stage(job: &Job, stage: u32) -> GeoflowError {
    GeoflowError::task_creation(
        job.job_id.clone(),
        format!("{} has no stage {stage}", job.job_type),
    )
}
