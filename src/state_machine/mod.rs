// Job and task lifecycle states.
//
// Statuses are plain enums persisted as snake_case strings; the guards decide which
// single-record status writes a store may apply.

pub mod guards;
pub mod states;

pub use guards::{job_transition_allowed, task_transition_allowed};
pub use states::{JobStatus, TaskStatus};
