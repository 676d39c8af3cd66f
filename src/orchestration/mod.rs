//! # Orchestration Core
//!
//! Job submission, task status handling, stage advancement and job completion.
//!
//! ## Flow
//!
//! 1. [`JobInitializer::process_job`] validates a request, derives the job id,
//!    creates the job and its stage-1 tasks and enqueues them.
//! 2. Executors report task outcomes through [`TaskManager::update_task_status`].
//! 3. A terminal report advances sequential jobs to their next stage once the
//!    current stage is finished, then asks the [`JobFinalizer`] whether the job is
//!    complete.
//!
//! There is no scheduler and no coordinator process: whichever worker reports the
//! last task of a stage or job does the follow-up work, and deterministic
//! identities make redundant follow-ups harmless.

pub mod bootstrap;
pub mod controller;
pub mod job_finalizer;
pub mod job_initializer;
pub mod stage_summary;
pub mod task_enqueuer;
pub mod task_manager;
pub mod types;

pub use bootstrap::OrchestrationSystem;
pub use controller::JobController;
pub use job_finalizer::{
    final_status, CompletionEvaluation, FullScanCompletionChecker, JobCompletionChecker,
    JobFinalizer,
};
pub use job_initializer::JobInitializer;
pub use stage_summary::{stage_snapshot, summarize_stage};
pub use task_enqueuer::{EnqueueReport, TaskEnqueuer};
pub use task_manager::TaskManager;
pub use types::{
    JobCompletionOutcome, JobResult, ProcessJobOutcome, StageContext, StageDefinition,
    TaskDefinition, TaskErrorSample, TaskResultSample, TaskUpdateOutcome,
};
