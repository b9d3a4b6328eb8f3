use serde::{Deserialize, Serialize};

/// Lifecycle status of a research [`Task`](crate::Task). See
/// [`validate_transition`] for the full transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    RunningSync,
    RunningAsync,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Error raised by [`validate_transition`] for a disallowed status change.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot transition from terminal state {0:?}")]
    Terminal(TaskStatus),
    #[error("invalid transition: {from:?} -> {to:?}")]
    Invalid { from: TaskStatus, to: TaskStatus },
}

/// Returns `true` if the status is terminal (no further transitions allowed).
/// Free-function form of [`TaskStatus::is_terminal`], mirroring
/// `turul_mcp_task_storage::state_machine::is_terminal`.
pub fn is_terminal(status: TaskStatus) -> bool {
    status.is_terminal()
}

/// Validate a status transition against the lifecycle graph:
///
/// ```text
/// Pending       -> RunningSync | Cancelled | Failed
/// RunningSync   -> Completed | RunningAsync | Cancelled | Failed
/// RunningAsync  -> Completed | Failed | Cancelled
/// Completed/Failed/Cancelled -> (terminal, no further transitions)
/// ```
///
/// `Pending -> Failed` covers a submit failure before the sync/async race
/// ever starts; `RunningSync -> Failed` covers expiry or a provider error
/// observed while still inside the sync wait window, before
/// `detach_to_async` would have moved the task to `RunningAsync`. A
/// same-state request is a no-op, not an error.
pub fn validate_transition(from: TaskStatus, to: TaskStatus) -> Result<(), TransitionError> {
    use TaskStatus::*;
    if from.is_terminal() {
        return Err(TransitionError::Terminal(from));
    }
    if from == to {
        return Ok(());
    }
    let allowed = match from {
        Pending => matches!(to, RunningSync | Cancelled | Failed),
        RunningSync => matches!(to, Completed | RunningAsync | Cancelled | Failed),
        RunningAsync => matches!(to, Completed | Failed | Cancelled),
        Completed | Failed | Cancelled => unreachable!("terminal states returned above"),
    };
    if allowed {
        Ok(())
    } else {
        Err(TransitionError::Invalid { from, to })
    }
}
