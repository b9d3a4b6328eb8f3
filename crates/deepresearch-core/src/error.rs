//! Unified error taxonomy for the orchestrator.
//!
//! Mirrors the pattern used in `turul-mcp-task-storage`/`turul-mcp-client`:
//! one `thiserror` enum per crate boundary, composed here into a single
//! top-level kind since every layer above storage needs to answer "what kind
//! of failure is this" the same way.

use crate::TaskStatus;

/// Top-level error kind surfaced by the engine and tool surface.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid input: {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("provider reported failure: {0}")]
    ProviderFailed(String),

    #[error("provider session expired")]
    SessionExpired,

    #[error("no task found for id {0}")]
    NotFound(String),

    #[error("task {task_id} is not completed (status: {status:?}, progress: {progress})")]
    NotCompleted {
        task_id: String,
        status: TaskStatus,
        progress: u8,
    },

    #[error("task {0} is already in a terminal state")]
    AlreadyTerminal(String),

    #[error("background executor capacity exceeded")]
    CapacityExceeded,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("io error: {path}: {message}")]
    Io { path: String, message: String },
}

impl EngineError {
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable kind name, used as the `error` field of the
    /// response envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "InvalidInput",
            Self::ProviderUnavailable(_) => "ProviderUnavailable",
            Self::ProviderFailed(_) => "ProviderFailed",
            Self::SessionExpired => "SessionExpired",
            Self::NotFound(_) => "NotFound",
            Self::NotCompleted { .. } => "NotCompleted",
            Self::AlreadyTerminal(_) => "AlreadyTerminal",
            Self::CapacityExceeded => "CapacityExceeded",
            Self::Storage(_) => "Storage",
            Self::Io { .. } => "IO",
        }
    }

    /// Whether this error drives the task state machine to FAILED when it
    /// occurs mid-lifecycle.
    pub fn drives_failure(&self) -> bool {
        matches!(
            self,
            Self::ProviderFailed(_) | Self::SessionExpired
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_match_taxonomy() {
        assert_eq!(EngineError::invalid_input("query", "too short").kind(), "InvalidInput");
        assert_eq!(EngineError::SessionExpired.kind(), "SessionExpired");
        assert!(EngineError::SessionExpired.drives_failure());
        assert!(!EngineError::CapacityExceeded.drives_failure());
    }
}
