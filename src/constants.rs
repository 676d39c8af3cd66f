//! # System Constants
//!
//! Fixed names and limits shared across the orchestration core.

/// Length of a job identifier (hex-encoded SHA-256)
pub const JOB_ID_LENGTH: usize = 64;

/// Length a task identifier hash is truncated to
pub const TASK_ID_LENGTH: usize = 16;

/// Keys excluded from task identity hashing because they change between retries
pub const VOLATILE_PARAMETER_KEYS: &[&str] = &[
    "created_at",
    "updated_at",
    "timestamp",
    "requested_at",
    "submitted_at",
];

/// Standard request fields that participate in job identity
pub mod request_fields {
    pub const JOB_TYPE: &str = "job_type";
    pub const DATASET_ID: &str = "dataset_id";
    pub const RESOURCE_ID: &str = "resource_id";
    pub const VERSION_ID: &str = "version_id";
    pub const SYSTEM: &str = "system";

    /// All standard fields, in canonical order
    pub const ALL: &[&str] = &[JOB_TYPE, DATASET_ID, RESOURCE_ID, VERSION_ID, SYSTEM];

    /// Domain identifiers required unless the request is a system request
    pub const DOMAIN_IDENTIFIERS: &[&str] = &[DATASET_ID, RESOURCE_ID, VERSION_ID];
}

/// Built-in operation and task type names
pub mod operations {
    pub const HELLO_WORLD: &str = "hello_world";
    pub const HELLO_WORLD_SEQUENTIAL: &str = "hello_world_sequential";
    pub const CATALOG_FILES: &str = "catalog_files";
}

pub mod task_types {
    pub const HELLO_WORLD_GREETING: &str = "hello_world_greeting";
    pub const HELLO_WORLD_REPLY: &str = "hello_world_reply";
    pub const VALIDATE_FILE: &str = "validate_file";
    pub const CATALOG_ITEM: &str = "catalog_item";
}

/// Default limits for aggregation and completion scanning
pub mod defaults {
    /// Maximum number of task results copied into a job's result payload
    pub const MAX_RESULT_SAMPLES: usize = 10;
    /// Maximum number of task errors copied into a job's result payload
    pub const MAX_ERROR_SAMPLES: usize = 20;
    /// Task count above which each completion scan logs a warning.
    ///
    /// Every completion re-reads every task of the job (O(T) per completion, O(T²)
    /// per job). Fan-out beyond this needs a counter or completion index instead.
    pub const COMPLETION_SCAN_WARN_THRESHOLD: usize = 5_000;
    /// Default queue carrying task execution messages
    pub const TASKS_QUEUE: &str = "geoflow_tasks";
    /// Seconds a received message stays invisible before redelivery
    pub const VISIBILITY_TIMEOUT_SECONDS: u64 = 300;
}
