#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, GeoParquet in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Geoflow Core
//!
//! Job→Task orchestration core for the geospatial ingest and cataloging pipeline.
//!
//! ## Overview
//!
//! A client submits a **job** (an operation over a dataset, resource and version).
//! The job's controller validates the request and fans it out into **tasks**,
//! possibly across several sequential stages. Independent workers pull task
//! messages from a queue, execute them and report back; whichever worker reports
//! the last task of a stage advances the job, and whichever reports the last task
//! of the final stage finalizes it.
//!
//! Job and task identities are SHA-256 hashes of the canonicalized request, so
//! submissions and task creation are idempotent and racing workers that repeat a
//! step write identical content.
//!
//! ## Module Organization
//!
//! - [`validation`] - request schemas, violations and the validated request
//! - [`identity`] - deterministic job and task identities
//! - [`models`] - job and task records, progress and task outputs
//! - [`state_machine`] - lifecycle statuses and transition guards
//! - [`store`] - job/task persistence (in memory and PostgreSQL)
//! - [`messaging`] - task queue messages and queues (in memory and pgmq)
//! - [`orchestration`] - job initializer, task manager, stage advancement, finalizer
//! - [`registry`] - operation type → controller routing
//! - [`controllers`] - built-in operations
//! - [`worker`] - reference task executor
//! - [`config`] - YAML + environment configuration
//! - [`logging`] - structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use geoflow_core::config::GeoflowConfig;
//! use geoflow_core::orchestration::OrchestrationSystem;
//! use serde_json::json;
//!
//! # async fn example() -> geoflow_core::Result<()> {
//! let system = OrchestrationSystem::in_memory(GeoflowConfig::default()).await?;
//! let outcome = system
//!     .job_initializer
//!     .process_job(&json!({"job_type": "hello_world", "system": true, "n": 3}))
//!     .await?;
//! assert_eq!(outcome.task_count, 3);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod controllers;
pub mod error;
pub mod identity;
pub mod logging;
pub mod messaging;
pub mod models;
pub mod orchestration;
pub mod registry;
pub mod state_machine;
pub mod store;
pub mod validation;
pub mod worker;

pub use config::{ConfigManager, GeoflowConfig};
pub use error::{GeoflowError, Result};
pub use identity::{generate_job_id, generate_task_id};
pub use models::{Job, JobProgress, StageRecord, Task, TaskCounts, TaskOutput};
pub use orchestration::{
    JobCompletionOutcome, JobController, JobInitializer, OrchestrationSystem, ProcessJobOutcome,
    TaskManager, TaskUpdateOutcome,
};
pub use registry::ControllerRegistry;
pub use state_machine::{JobStatus, TaskStatus};
pub use store::{JobStore, TaskUpdate};
pub use validation::{ValidatedRequest, ValidationErrors, ValidationMode};
pub use worker::{TaskHandler, TaskHandlerRegistry, TaskWorker};
