//! Handlers for the built-in task types.
//!
//! The file handlers only inspect names and parameters; reading blobs and writing
//! catalog records belong to the storage services that sit outside this crate.

use super::handler::{TaskExecutionError, TaskHandler, TaskHandlerRegistry};
use crate::constants::task_types;
use crate::models::{Task, TaskOutput};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub fn register_defaults(registry: &mut TaskHandlerRegistry) {
    registry
        .register(Arc::new(GreetingHandler))
        .register(Arc::new(ReplyHandler))
        .register(Arc::new(ValidateFileHandler))
        .register(Arc::new(CatalogItemHandler));
}

fn str_param<'a>(task: &'a Task, key: &str) -> Result<&'a str, TaskExecutionError> {
    task.parameters
        .get(key)
        .and_then(|value| value.as_str())
        .ok_or_else(|| TaskExecutionError::invalid_parameters(format!("missing string parameter '{key}'")))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GreetingHandler;

#[async_trait]
impl TaskHandler for GreetingHandler {
    fn task_type(&self) -> &str {
        task_types::HELLO_WORLD_GREETING
    }

    async fn execute(&self, task: &Task) -> Result<TaskOutput, TaskExecutionError> {
        let should_fail = task
            .parameters
            .get("should_fail")
            .and_then(|value| value.as_bool())
            .unwrap_or(false);
        if should_fail {
            return Err(TaskExecutionError::failed(format!(
                "greeting {} failed on request",
                task.index
            )));
        }

        let message = str_param(task, "message").unwrap_or("Hello World");
        Ok(TaskOutput::Greeting {
            index: task.index,
            message: format!("{message} from greeting {}", task.index),
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReplyHandler;

#[async_trait]
impl TaskHandler for ReplyHandler {
    fn task_type(&self) -> &str {
        task_types::HELLO_WORLD_REPLY
    }

    async fn execute(&self, task: &Task) -> Result<TaskOutput, TaskExecutionError> {
        let greetings_received = task
            .parameters
            .get("greetings_received")
            .and_then(|value| value.as_u64())
            .ok_or_else(|| TaskExecutionError::invalid_parameters("missing 'greetings_received'"))?
            as usize;

        Ok(TaskOutput::Reply {
            greetings_received,
            message: format!("Received {greetings_received} greetings"),
        })
    }
}

/// Format detected from a file extension
pub fn detect_format(path: &str) -> Option<&'static str> {
    let extension = path.rsplit_once('.')?.1.to_ascii_lowercase();
    match extension.as_str() {
        "tif" | "tiff" => Some("geotiff"),
        "parquet" => Some("geoparquet"),
        "gpkg" => Some("geopackage"),
        "geojson" | "json" => Some("geojson"),
        "shp" => Some("shapefile"),
        _ => None,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ValidateFileHandler;

#[async_trait]
impl TaskHandler for ValidateFileHandler {
    fn task_type(&self) -> &str {
        task_types::VALIDATE_FILE
    }

    async fn execute(&self, task: &Task) -> Result<TaskOutput, TaskExecutionError> {
        let path = str_param(task, "path")?;
        if path.trim().is_empty() {
            return Err(TaskExecutionError::invalid_parameters("empty file path"));
        }
        if path.split('/').any(|segment| segment == "..") {
            return Err(TaskExecutionError::invalid_parameters(format!(
                "path '{path}' escapes its container"
            )));
        }

        let format = detect_format(path);
        Ok(TaskOutput::FileValidated {
            path: path.to_string(),
            valid: format.is_some(),
            format: format.map(str::to_string),
            size_bytes: None,
            reason: format
                .is_none()
                .then(|| format!("unsupported file type: {path}")),
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CatalogItemHandler;

#[async_trait]
impl TaskHandler for CatalogItemHandler {
    fn task_type(&self) -> &str {
        task_types::CATALOG_ITEM
    }

    async fn execute(&self, task: &Task) -> Result<TaskOutput, TaskExecutionError> {
        let container = str_param(task, "container")?;
        let path = str_param(task, "path")?;
        let collection_id = str_param(task, "collection_id")?;
        let format = str_param(task, "format")?;

        let mut hasher = Sha256::new();
        hasher.update(collection_id.as_bytes());
        hasher.update(b"/");
        hasher.update(container.as_bytes());
        hasher.update(b"/");
        hasher.update(path.as_bytes());
        let digest = hex::encode(hasher.finalize());

        Ok(TaskOutput::ItemCatalogued {
            item_id: format!("{collection_id}-{}", &digest[..12]),
            collection_id: collection_id.to_string(),
            path: path.to_string(),
            format: format.to_string(),
        })
    }
}
