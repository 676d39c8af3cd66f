//! `catalog_files`: validate each submitted file, then register every valid file as
//! a catalog item.
//!
//! ```json
//! {
//!   "job_type": "catalog_files",
//!   "dataset_id": "landsat", "resource_id": "scenes", "version_id": "v1",
//!   "container": "bronze",
//!   "files": ["scene_001.tif", "roads.parquet"],
//!   "collection_id": "landsat-c2"
//! }
//! ```
//!
//! Stage 2 fans out from stage 1's results: a file that fails validation produces
//! no cataloging task, and a submission with no valid files finishes with an empty
//! cataloging stage.

use super::{param_str, unknown_stage};
use crate::constants::{operations, task_types};
use crate::error::Result;
use crate::models::{Job, Task, TaskOutput};
use crate::orchestration::controller::JobController;
use crate::orchestration::types::{JobResult, StageContext, StageDefinition, TaskDefinition};
use crate::validation::{FieldSpec, FieldType, ParameterSchema};
use serde_json::json;
use std::sync::Arc;

pub const DEFAULT_COLLECTION: &str = "default";
pub const TARGET_FORMATS: &[&str] = &["cog", "geoparquet", "original"];

#[derive(Debug, Default, Clone, Copy)]
pub struct CatalogFilesController;

pub fn factory() -> Arc<dyn JobController> {
    Arc::new(CatalogFilesController)
}

fn files(job: &Job) -> Vec<String> {
    job.parameter("files")
        .and_then(|value| value.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

impl JobController for CatalogFilesController {
    fn job_type(&self) -> &'static str {
        operations::CATALOG_FILES
    }

    fn parameter_schema(&self) -> ParameterSchema {
        ParameterSchema::new()
            .field(FieldSpec::string("container").required())
            .field(FieldSpec::array_of("files", FieldType::String).required().non_empty())
            .field(FieldSpec::string("collection_id").with_default(json!(DEFAULT_COLLECTION)))
            .field(
                FieldSpec::string("target_format")
                    .one_of(TARGET_FORMATS.iter().map(|f| json!(f)).collect())
                    .with_default(json!("original")),
            )
            .deprecated("blob_names", "files")
    }

    fn stages(&self) -> Vec<StageDefinition> {
        vec![
            StageDefinition {
                number: 1,
                name: "validation",
                task_type: task_types::VALIDATE_FILE,
            },
            StageDefinition {
                number: 2,
                name: "cataloging",
                task_type: task_types::CATALOG_ITEM,
            },
        ]
    }

    fn create_stage_tasks(&self, context: &StageContext<'_>) -> Result<Vec<TaskDefinition>> {
        let job = context.job;
        let container = param_str(job, "container", "");
        let target_format = param_str(job, "target_format", "original");

        match context.stage {
            1 => Ok(files(job)
                .into_iter()
                .enumerate()
                .map(|(index, path)| {
                    TaskDefinition::new(
                        task_types::VALIDATE_FILE,
                        index as u32,
                        json!({
                            "container": container,
                            "path": path,
                            "target_format": target_format,
                        }),
                    )
                })
                .collect()),
            2 => {
                let collection_id = param_str(job, "collection_id", DEFAULT_COLLECTION);
                Ok(context
                    .previous_outputs()
                    .filter_map(|output| match output {
                        TaskOutput::FileValidated {
                            path,
                            valid: true,
                            format,
                            ..
                        } => Some((path.clone(), format.clone())),
                        _ => None,
                    })
                    .enumerate()
                    .map(|(index, (path, detected))| {
                        let format = if target_format == "original" {
                            detected.unwrap_or_else(|| "unknown".to_string())
                        } else {
                            target_format.to_string()
                        };
                        TaskDefinition::new(
                            task_types::CATALOG_ITEM,
                            index as u32,
                            json!({
                                "container": container,
                                "path": path,
                                "collection_id": collection_id,
                                "format": format,
                            }),
                        )
                    })
                    .collect())
            }
            stage => Err(unknown_stage(job, stage)),
        }
    }

    fn aggregate_results(&self, job: &Job, tasks: &[Task], result: &mut JobResult) {
        let mut valid = 0usize;
        let mut invalid = 0usize;
        let mut item_ids = Vec::new();
        for task in tasks {
            match &task.result_data {
                Some(TaskOutput::FileValidated { valid: true, .. }) => valid += 1,
                Some(TaskOutput::FileValidated { valid: false, .. }) => invalid += 1,
                Some(TaskOutput::ItemCatalogued { item_id, .. }) => item_ids.push(item_id.clone()),
                _ => {}
            }
        }
        item_ids.sort();

        result.insert_extension(
            "catalog_summary",
            json!({
                "collection_id": param_str(job, "collection_id", DEFAULT_COLLECTION),
                "files_submitted": files(job).len(),
                "files_valid": valid,
                "files_invalid": invalid,
                "items_catalogued": item_ids.len(),
                "item_ids": item_ids,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::TaskStatus;
    use chrono::Utc;

    fn job() -> Job {
        Job::new(
            "job",
            operations::CATALOG_FILES,
            json!({
                "container": "bronze",
                "files": ["a.tif", "notes.txt", "b.parquet"],
                "collection_id": "landsat",
                "target_format": "original",
            }),
            2,
        )
    }

    fn validated(index: u32, path: &str, valid: bool, format: Option<&str>) -> Task {
        let now = Utc::now();
        Task {
            task_id: format!("v{index}"),
            parent_job_id: "job".to_string(),
            job_type: operations::CATALOG_FILES.to_string(),
            task_type: task_types::VALIDATE_FILE.to_string(),
            index,
            stage: 1,
            status: TaskStatus::Completed,
            parameters: json!({}),
            result_data: Some(TaskOutput::FileValidated {
                path: path.to_string(),
                valid,
                format: format.map(str::to_string),
                size_bytes: None,
                reason: None,
            }),
            error_message: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            completed_at: Some(now),
        }
    }

    #[test]
    fn test_validation_stage_one_task_per_file() {
        let job = job();
        let tasks = CatalogFilesController
            .create_stage_tasks(&StageContext::initial(&job))
            .unwrap();

        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[1].parameters["path"], "notes.txt");
        assert_eq!(tasks[1].parameters["container"], "bronze");
    }

    #[test]
    fn test_cataloging_stage_skips_invalid_files() {
        let job = job();
        let previous = vec![
            validated(0, "a.tif", true, Some("geotiff")),
            validated(1, "notes.txt", false, None),
            validated(2, "b.parquet", true, Some("geoparquet")),
        ];
        let context = StageContext {
            job: &job,
            stage: 2,
            previous_results: &previous,
        };

        let tasks = CatalogFilesController.create_stage_tasks(&context).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].index, 0);
        assert_eq!(tasks[1].index, 1);
        assert_eq!(tasks[1].parameters["format"], "geoparquet");
        assert_eq!(tasks[0].parameters["collection_id"], "landsat");
    }

    #[test]
    fn test_cataloging_stage_may_be_empty() {
        let job = job();
        let previous = vec![validated(0, "notes.txt", false, None)];
        let context = StageContext {
            job: &job,
            stage: 2,
            previous_results: &previous,
        };
        assert!(CatalogFilesController
            .create_stage_tasks(&context)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_schema_rejects_empty_file_list() {
        let raw = json!({
            "job_type": "catalog_files",
            "system": true,
            "container": "bronze",
            "files": [],
        });
        let errors = crate::validation::validate_request(
            &raw,
            &CatalogFilesController.parameter_schema(),
            crate::validation::ValidationMode::Strict,
        )
        .unwrap_err();
        assert_eq!(errors.fields(), vec!["files"]);
    }
}
