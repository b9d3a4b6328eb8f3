//! Unified error type for state store operations.
//!
//! Mirrors `turul-mcp-task-storage::error::TaskStorageError`, extended with
//! a transient/structural classification so the retry wrapper in
//! [`crate::retry`] knows which failures are worth retrying.

use deepresearch_core::TaskStatus;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("cannot downgrade task {task_id} from terminal state {current:?} to {requested:?}")]
    TerminalDowngrade {
        task_id: String,
        current: TaskStatus,
        requested: TaskStatus,
    },

    #[error("no result row for task {0}")]
    ResultNotFound(String),

    #[error("transient contention: {0}")]
    Transient(String),

    #[error("structural storage error: {0}")]
    Structural(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Whether this failure is worth retrying under the backoff policy —
    /// distinguishes transient lock/busy conditions from structural errors,
    /// which propagate immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        if is_busy_or_locked(&err) {
            StorageError::Transient(err.to_string())
        } else {
            StorageError::Structural(err.to_string())
        }
    }
}

fn is_busy_or_locked(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            // SQLite reports contention as "database is locked" / "database
            // table is locked" messages; there is no stable error code to
            // match on via sqlx's generic DatabaseError, so we match text.
            let message = db_err.message();
            message.contains("database is locked") || message.contains("database table is locked")
        }
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_flag_reflects_variant() {
        assert!(StorageError::Transient("busy".into()).is_transient());
        assert!(!StorageError::Structural("bad schema".into()).is_transient());
        assert!(!StorageError::TaskNotFound("x".into()).is_transient());
    }
}
