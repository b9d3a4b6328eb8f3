//! In-process `StateStore` backed by a `RwLock<HashMap>`. Grounded on
//! `turul-mcp-task-storage::InMemoryTaskStorage` — same lock shape,
//! retargeted to `Task`/`ResearchResult`. `save_task` is insert-or-replace by
//! `task_id`; `update_task` enforces the transition graph and terminal
//! immutability on top of that.
//!
//! Intended for tests and single-process deployments without a durability
//! requirement; state is lost on process restart, so `recover_on_startup`
//! is a no-op against this backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use deepresearch_core::{validate_transition, ResearchResult, Task, TaskStatus};
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::traits::StateStore;

#[derive(Default)]
pub struct InMemoryStateStore {
    tasks: Arc<RwLock<HashMap<String, Task>>>,
    results: Arc<RwLock<HashMap<String, ResearchResult>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save_task(&self, task: &Task) -> Result<(), StorageError> {
        self.tasks
            .write()
            .await
            .insert(task.task_id.clone(), task.clone());
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, StorageError> {
        self.tasks
            .read()
            .await
            .get(task_id)
            .cloned()
            .ok_or_else(|| StorageError::TaskNotFound(task_id.to_string()))
    }

    async fn update_task(&self, task: &Task) -> Result<(), StorageError> {
        let mut tasks = self.tasks.write().await;
        let existing = tasks
            .get(&task.task_id)
            .ok_or_else(|| StorageError::TaskNotFound(task.task_id.clone()))?;

        // Terminal immutability: once a task is terminal, a different
        // status is rejected outright; only `error_message` may still
        // change alongside the same status.
        let next = if existing.status.is_terminal() {
            if task.status != existing.status {
                return Err(StorageError::TerminalDowngrade {
                    task_id: task.task_id.clone(),
                    current: existing.status,
                    requested: task.status,
                });
            }
            let mut frozen = existing.clone();
            frozen.error_message = task.error_message.clone();
            frozen
        } else {
            if existing.status != task.status {
                validate_transition(existing.status, task.status)
                    .map_err(|e| StorageError::Structural(e.to_string()))?;
            }
            task.clone()
        };
        tasks.insert(task.task_id.clone(), next);
        Ok(())
    }

    async fn get_incomplete_tasks(&self) -> Result<Vec<Task>, StorageError> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| !matches!(t.status, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled))
            .cloned()
            .collect())
    }

    async fn save_result(&self, result: &ResearchResult) -> Result<(), StorageError> {
        self.results
            .write()
            .await
            .insert(result.task_id.clone(), result.clone());
        Ok(())
    }

    async fn get_result(&self, task_id: &str) -> Result<ResearchResult, StorageError> {
        self.results
            .read()
            .await
            .get(task_id)
            .cloned()
            .ok_or_else(|| StorageError::ResultNotFound(task_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepresearch_core::{ResultMetadata, ResultMode};

    fn sample_task() -> Task {
        Task::new("what is the capital of France".to_string(), false, 1, "default".to_string())
    }

    #[tokio::test]
    async fn save_then_get_roundtrips() {
        let store = InMemoryStateStore::new();
        let task = sample_task();
        store.save_task(&task).await.unwrap();
        let fetched = store.get_task(&task.task_id).await.unwrap();
        assert_eq!(fetched.task_id, task.task_id);
        assert_eq!(fetched.query, task.query);
    }

    #[tokio::test]
    async fn save_task_upserts_by_task_id() {
        let store = InMemoryStateStore::new();
        let mut task = sample_task();
        store.save_task(&task).await.unwrap();

        task.query = "what is the capital of Germany".to_string();
        task.status = TaskStatus::RunningSync;
        store.save_task(&task).await.unwrap();

        let fetched = store.get_task(&task.task_id).await.unwrap();
        assert_eq!(fetched.query, "what is the capital of Germany");
        assert_eq!(fetched.status, TaskStatus::RunningSync);
    }

    #[tokio::test]
    async fn get_missing_task_errors() {
        let store = InMemoryStateStore::new();
        let err = store.get_task("nope").await.unwrap_err();
        assert!(matches!(err, StorageError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn update_missing_task_errors() {
        let store = InMemoryStateStore::new();
        let task = sample_task();
        let err = store.update_task(&task).await.unwrap_err();
        assert!(matches!(err, StorageError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn update_overwrites_existing() {
        let store = InMemoryStateStore::new();
        let mut task = sample_task();
        store.save_task(&task).await.unwrap();
        task.progress = 50;
        task.status = TaskStatus::RunningSync;
        store.update_task(&task).await.unwrap();
        let fetched = store.get_task(&task.task_id).await.unwrap();
        assert_eq!(fetched.progress, 50);
    }

    #[tokio::test]
    async fn terminal_task_accepts_same_status_error_message_update() {
        let store = InMemoryStateStore::new();
        let mut task = sample_task();
        store.save_task(&task).await.unwrap();

        task.status = TaskStatus::Completed;
        task.progress = 100;
        store.update_task(&task).await.unwrap();

        let mut note = task.clone();
        note.progress = 10;
        note.error_message = Some("bookkeeping note".to_string());
        store.update_task(&note).await.unwrap();

        let fetched = store.get_task(&task.task_id).await.unwrap();
        assert_eq!(fetched.status, TaskStatus::Completed);
        assert_eq!(fetched.progress, 100);
        assert_eq!(fetched.error_message.as_deref(), Some("bookkeeping note"));
    }

    #[tokio::test]
    async fn terminal_task_rejects_a_different_requested_status() {
        let store = InMemoryStateStore::new();
        let mut task = sample_task();
        store.save_task(&task).await.unwrap();

        task.status = TaskStatus::Completed;
        store.update_task(&task).await.unwrap();

        let mut regression_attempt = task.clone();
        regression_attempt.status = TaskStatus::RunningAsync;
        let err = store.update_task(&regression_attempt).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::TerminalDowngrade {
                current: TaskStatus::Completed,
                requested: TaskStatus::RunningAsync,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn update_rejects_a_transition_outside_the_lifecycle_graph() {
        let store = InMemoryStateStore::new();
        let mut task = sample_task();
        task.status = TaskStatus::RunningAsync;
        store.save_task(&task).await.unwrap();

        let mut backward = task.clone();
        backward.status = TaskStatus::RunningSync;
        let err = store.update_task(&backward).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn incomplete_tasks_excludes_terminal_statuses() {
        let store = InMemoryStateStore::new();
        let mut running = sample_task();
        running.status = TaskStatus::RunningAsync;
        store.save_task(&running).await.unwrap();

        let mut done = sample_task();
        done.status = TaskStatus::Completed;
        store.save_task(&done).await.unwrap();

        let incomplete = store.get_incomplete_tasks().await.unwrap();
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].task_id, running.task_id);
    }

    #[tokio::test]
    async fn save_and_fetch_result() {
        let store = InMemoryStateStore::new();
        let task = sample_task();
        let result = ResearchResult {
            task_id: task.task_id.clone(),
            report: "Paris.".to_string(),
            sources: vec![],
            metadata: ResultMetadata {
                duration_minutes: 0.2,
                cost_usd: 0.01,
                mode: ResultMode::Sync,
                model: "default".to_string(),
                started_at: chrono::Utc::now(),
                completed_at: chrono::Utc::now(),
            },
            created_at: chrono::Utc::now(),
        };
        store.save_result(&result).await.unwrap();
        let fetched = store.get_result(&task.task_id).await.unwrap();
        assert_eq!(fetched.report, "Paris.");
    }

    #[tokio::test]
    async fn get_missing_result_errors() {
        let store = InMemoryStateStore::new();
        let err = store.get_result("nope").await.unwrap_err();
        assert!(matches!(err, StorageError::ResultNotFound(_)));
    }
}
