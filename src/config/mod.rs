//! # Configuration
//!
//! Typed configuration for the orchestration core, loaded by [`ConfigManager`] from
//! `config/geoflow.yaml`, an optional `config/geoflow.{environment}.yaml` override
//! and `GEOFLOW__SECTION__KEY` environment variables, in that order.
//!
//! Every field has a default so partial files are valid.

pub mod error;
pub mod loader;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::defaults;
use crate::validation::ValidationMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoflowConfig {
    pub orchestration: OrchestrationConfig,
    pub queue: QueueConfig,
    pub store: StoreConfig,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Whether request fields outside a controller's schema are rejected
    pub validation_mode: ValidationMode,
    /// Task results copied into a job's result payload
    pub max_result_samples: usize,
    /// Task errors copied into a job's result payload
    pub max_error_samples: usize,
    /// Task count above which completion scans log a warning
    pub completion_scan_warn_threshold: usize,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            validation_mode: ValidationMode::Strict,
            max_result_samples: defaults::MAX_RESULT_SAMPLES,
            max_error_samples: defaults::MAX_ERROR_SAMPLES,
            completion_scan_warn_threshold: defaults::COMPLETION_SCAN_WARN_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackend {
    #[default]
    Memory,
    Pgmq,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    pub tasks_queue: String,
    pub visibility_timeout_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Memory,
            tasks_queue: defaults::TASKS_QUEUE.to_string(),
            visibility_timeout_seconds: defaults::VISIBILITY_TIMEOUT_SECONDS,
        }
    }
}

impl QueueConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Falls back to `DATABASE_URL` when unset
    pub database_url: Option<String>,
    pub max_connections: u32,
    /// Create tables on startup
    pub run_migrations: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url: None,
            max_connections: 10,
            run_migrations: true,
        }
    }
}

impl StoreConfig {
    pub fn resolved_database_url(&self) -> Option<String> {
        self.database_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| std::env::var("DATABASE_URL").ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker loops started by the demo binary
    pub concurrency: usize,
    /// Messages received per poll
    pub batch_size: usize,
    /// Sleep between empty polls
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            batch_size: 10,
            poll_interval_ms: 100,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Explicit filter directive; environment-derived when unset
    pub level: Option<String>,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl GeoflowConfig {
    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.orchestration.max_result_samples == 0 {
            return Err(ConfigurationError::invalid_value(
                "orchestration.max_result_samples",
                "0",
                "sample size must be greater than 0",
            ));
        }

        if self.orchestration.max_error_samples == 0 {
            return Err(ConfigurationError::invalid_value(
                "orchestration.max_error_samples",
                "0",
                "sample size must be greater than 0",
            ));
        }

        if self.queue.tasks_queue.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "queue.tasks_queue",
                "queue configuration",
            ));
        }

        if self.worker.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.batch_size",
                "0",
                "batch size must be greater than 0",
            ));
        }

        if self.worker.concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.concurrency",
                "0",
                "at least one worker is required",
            ));
        }

        let needs_database =
            self.store.backend == StoreBackend::Postgres || self.queue.backend == QueueBackend::Pgmq;
        if needs_database {
            if self.store.resolved_database_url().is_none() {
                return Err(ConfigurationError::missing_required_field(
                    "store.database_url",
                    "postgres store or pgmq queue (or set DATABASE_URL)",
                ));
            }
            if self.store.max_connections == 0 {
                return Err(ConfigurationError::invalid_value(
                    "store.max_connections",
                    "0",
                    "pool size must be greater than 0",
                ));
            }
        }

        Ok(())
    }
}
