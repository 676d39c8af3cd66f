//! Transition guards for jobs and tasks.
//!
//! Stores apply these checks inside their single-record update so that racing
//! workers can never move a terminal record back into an active state.

use super::states::{JobStatus, TaskStatus};

/// Whether a task may move from `from` to `to`
///
/// Executors may skip `processing`, and a redelivered message may claim an
/// already-processing task again. Terminal tasks never change.
pub fn task_transition_allowed(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::*;
    match (from, to) {
        (Completed | Failed, _) => false,
        (Queued, Processing | Completed | Failed) => true,
        (Processing, Processing | Completed | Failed) => true,
        (_, Queued) => false,
    }
}

/// Whether a job status patch from `from` to `to` may be applied
///
/// Re-writing the same terminal status is allowed so repeated finalization is a
/// harmless overwrite. Retrying a failed job goes through a full record reset,
/// not through this guard.
pub fn job_transition_allowed(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    if from.is_terminal() {
        return from == to;
    }
    match (from, to) {
        (Pending, Queued | Processing | Failed) => true,
        (Queued, Queued | Processing) => true,
        (Processing, Processing) => true,
        (Queued | Processing, Completed | CompletedWithErrors | Failed) => true,
        _ => false,
    }
}
