use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TaskStatus;

/// Minimum and maximum accepted query length, in characters.
pub const QUERY_MIN_LEN: usize = 3;
pub const QUERY_MAX_LEN: usize = 10_000;

/// Minimum and maximum accepted `max_wait_hours`.
pub const MAX_WAIT_HOURS_MIN: u32 = 1;
pub const MAX_WAIT_HOURS_MAX: u32 = 24;

/// The central entity: one research request tracked from submission to
/// terminal outcome. Persistence model only — in-process executor handles
/// (cancellation tokens, status watches) are tracked separately by the
/// executor, matching `turul-mcp-task-storage::TaskRecord`'s split from
/// executor runtime state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub provider_handle: Option<String>,
    pub query: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub current_action: String,
    pub notify_on_done: bool,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
    pub error_message: Option<String>,
    pub model: String,
    pub max_wait_hours: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Generate a fresh caller-visible task identifier (version-4 UUID, per
    /// "Identifiers").
    pub fn generate_task_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn new(query: String, notify_on_done: bool, max_wait_hours: u32, model: String) -> Self {
        let now = Utc::now();
        Self {
            task_id: Self::generate_task_id(),
            provider_handle: None,
            query,
            status: TaskStatus::Pending,
            progress: 0,
            current_action: "queued".to_string(),
            notify_on_done,
            tokens_in: 0,
            tokens_out: 0,
            cost_usd: 0.0,
            error_message: None,
            model,
            max_wait_hours,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn elapsed_minutes(&self) -> f64 {
        (Utc::now() - self.created_at).num_milliseconds() as f64 / 60_000.0
    }
}

/// A single cited source returned by the provider. Value object, not
/// independently identified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub relevance_score: f64,
}

/// Token accounting for a completed (or partially completed) task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

/// One-to-one with a completed (or partially-saved) [`Task`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    pub task_id: String,
    pub report: String,
    pub sources: Vec<Source>,
    pub metadata: ResultMetadata,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub duration_minutes: f64,
    pub cost_usd: f64,
    pub mode: ResultMode,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultMode {
    Sync,
    Async,
}

/// Validate a query's length against 3..10_000 char bound.
pub fn validate_query(query: &str) -> Result<(), String> {
    let len = query.chars().count();
    if len < QUERY_MIN_LEN || len > QUERY_MAX_LEN {
        return Err(format!(
            "query must be {}..={} characters, got {}",
            QUERY_MIN_LEN, QUERY_MAX_LEN, len
        ));
    }
    Ok(())
}

/// Validate `max_wait_hours` against 1..24 bound.
pub fn validate_max_wait_hours(hours: u32) -> Result<(), String> {
    if hours < MAX_WAIT_HOURS_MIN || hours > MAX_WAIT_HOURS_MAX {
        return Err(format!(
            "max_wait_hours must be {}..={}, got {}",
            MAX_WAIT_HOURS_MIN, MAX_WAIT_HOURS_MAX, hours
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_length_boundaries() {
        assert!(validate_query(&"a".repeat(2)).is_err());
        assert!(validate_query(&"a".repeat(3)).is_ok());
        assert!(validate_query(&"a".repeat(10_000)).is_ok());
        assert!(validate_query(&"a".repeat(10_001)).is_err());
    }

    #[test]
    fn max_wait_hours_boundaries() {
        assert!(validate_max_wait_hours(0).is_err());
        assert!(validate_max_wait_hours(1).is_ok());
        assert!(validate_max_wait_hours(24).is_ok());
        assert!(validate_max_wait_hours(25).is_err());
    }

    #[test]
    fn new_task_starts_pending_with_zero_progress() {
        let task = Task::new("what is 2+2?".to_string(), true, 8, "default".to_string());
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0);
        assert!(task.provider_handle.is_none());
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn token_usage_total_sums_input_and_output() {
        let usage = TokenUsage { input: 120, output: 480 };
        assert_eq!(usage.total(), 600);
    }
}
