//! # Deep Research Orchestrator — Core Domain Types
//!
//! Shared domain types, the task lifecycle state machine, and the unified
//! error taxonomy for the research task orchestrator. Every other crate in
//! the workspace depends on this one and nothing else flows the other way,
//! matching `turul-mcp-protocol`'s role as the dependency leaf every other
//! crate in its workspace shares.

pub mod error;
pub mod estimate;
pub mod status;
pub mod task;

pub use error::EngineError;
pub use estimate::{Complexity, CostEstimate, Range};
pub use status::{is_terminal, validate_transition, TaskStatus, TransitionError};
pub use task::{
    validate_max_wait_hours, validate_query, ResearchResult, ResultMetadata, ResultMode, Source,
    Task, TokenUsage, MAX_WAIT_HOURS_MAX, MAX_WAIT_HOURS_MIN, QUERY_MAX_LEN, QUERY_MIN_LEN,
};
