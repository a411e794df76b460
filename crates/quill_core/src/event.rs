use crate::job::JobSnapshot;
use crate::run::RunMode;

/// Typed transitions emitted by the orchestrator, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The run mode changed.
    RunModeChanged { mode: RunMode },
    /// A job changed status, content or telemetry.
    JobUpdated(JobSnapshot),
    /// `start()` found no eligible unit.
    NothingToDo,
}
