//! Planning and applying component changes.
//!
//! The flow of a pass is `diff` → detection of releases that cannot be
//! updated in place → forced-update integration → apply (delete, update,
//! create).

mod detector;
mod diff;
mod executor;
mod forced;
mod plan;

pub use detector::{ScheduledWorkloadDetector, DEFAULT_MARKER};
pub use diff::{describe_changes, diff, is_only_secret_value_diff, ComponentDiff, DiffDetail};
pub use executor::{
    ApplyReport, ComponentOutcome, Executor, ExecutorOptions, FailurePolicy, OutcomeStatus,
};
pub use forced::integrate_forced_updates;
pub use plan::{ApplyPhase, ApplyPlan, PlannedAction};
