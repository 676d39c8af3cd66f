//! Request builders for the built-in operations.

use serde_json::{json, Value};

/// Builder for job submission payloads
#[derive(Debug, Clone)]
pub struct JobRequestBuilder {
    request: serde_json::Map<String, Value>,
}

impl JobRequestBuilder {
    pub fn new(job_type: &str) -> Self {
        let mut request = serde_json::Map::new();
        request.insert("job_type".to_string(), json!(job_type));
        Self { request }
    }

    /// System job: no dataset/resource/version identifiers required
    pub fn system(mut self) -> Self {
        self.request.insert("system".to_string(), json!(true));
        self
    }

    pub fn for_dataset(mut self, dataset_id: &str, resource_id: &str, version_id: &str) -> Self {
        self.request.insert("dataset_id".to_string(), json!(dataset_id));
        self.request.insert("resource_id".to_string(), json!(resource_id));
        self.request.insert("version_id".to_string(), json!(version_id));
        self
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.request.insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.request)
    }
}

pub fn hello_request(n: u32) -> Value {
    JobRequestBuilder::new("hello_world")
        .system()
        .with("n", json!(n))
        .build()
}

pub fn hello_request_failing(n: u32, fail_indices: &[u32]) -> Value {
    JobRequestBuilder::new("hello_world")
        .system()
        .with("n", json!(n))
        .with("fail_indices", json!(fail_indices))
        .build()
}

pub fn sequential_request(n: u32) -> Value {
    JobRequestBuilder::new("hello_world_sequential")
        .system()
        .with("n", json!(n))
        .build()
}

pub fn catalog_request(files: &[&str]) -> Value {
    JobRequestBuilder::new("catalog_files")
        .for_dataset("landsat", "scenes", "v1")
        .with("container", json!("bronze"))
        .with("files", json!(files))
        .with("collection_id", json!("landsat-c2"))
        .build()
}
