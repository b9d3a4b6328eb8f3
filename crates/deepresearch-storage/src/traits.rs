//! The `StateStore` trait — durable storage of task records and
//! their terminal results, backing both the in-process hybrid engine and
//! startup recovery. Shaped on `turul-mcp-task-storage::TaskStorage`,
//! retargeted from the MCP protocol's `TaskRecord`/`TaskOutcome` to
//! `deepresearch_core::{Task, ResearchResult}`.

use async_trait::async_trait;
use deepresearch_core::{ResearchResult, Task};

use crate::error::StorageError;

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist a task record, inserting it if `task_id` is new or replacing
    /// it in place if not.
    async fn save_task(&self, task: &Task) -> Result<(), StorageError>;

    /// Fetch a task by id, or [`StorageError::TaskNotFound`].
    async fn get_task(&self, task_id: &str) -> Result<Task, StorageError>;

    /// Persist a full overwrite of an existing task record (status,
    /// progress, token/cost accounting, etc). Implementations validate the
    /// status transition themselves via `deepresearch_core::validate_transition`
    /// and enforce terminal immutability, rejecting a different requested
    /// status on an already-terminal task with
    /// [`StorageError::TerminalDowngrade`].
    async fn update_task(&self, task: &Task) -> Result<(), StorageError>;

    /// All tasks not yet in a terminal status, used by
    /// `recover_on_startup` to resume or fail interrupted work.
    async fn get_incomplete_tasks(&self) -> Result<Vec<Task>, StorageError>;

    /// Persist the terminal result for a completed task.
    async fn save_result(&self, result: &ResearchResult) -> Result<(), StorageError>;

    /// Fetch a previously saved result, or [`StorageError::ResultNotFound`].
    async fn get_result(&self, task_id: &str) -> Result<ResearchResult, StorageError>;
}
