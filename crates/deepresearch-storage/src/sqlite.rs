//! SQLite-backed `StateStore`. Shaped on
//! `turul-mcp-task-storage::SqliteTaskStorage` — same connect-options and
//! migration shape, same JSON-blob-in-TEXT-column encoding for nested
//! structures — retargeted to `Task`/`ResearchResult` and wrapped with
//! [`crate::retry::with_retry`]

use std::path::PathBuf;

use async_trait::async_trait;
use deepresearch_core::{
    validate_transition, ResearchResult, ResultMetadata, ResultMode, Source, Task, TaskStatus,
};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::error::StorageError;
use crate::retry::with_retry;
use crate::traits::StateStore;

#[derive(Debug, Clone)]
pub struct SqliteStateStoreConfig {
    /// Database file path. Use `:memory:` with `cache=shared` handled
    /// internally so pooled connections see the same database.
    pub database_path: PathBuf,
    pub max_connections: u32,
    pub create_database_if_missing: bool,
}

impl Default for SqliteStateStoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("deep_research.db"),
            max_connections: 10,
            create_database_if_missing: true,
        }
    }
}

pub struct SqliteStateStore {
    pool: SqlitePool,
}

fn status_to_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::RunningSync => "running_sync",
        TaskStatus::RunningAsync => "running_async",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::Cancelled => "cancelled",
    }
}

fn str_to_status(s: &str) -> Result<TaskStatus, StorageError> {
    match s {
        "pending" => Ok(TaskStatus::Pending),
        "running_sync" => Ok(TaskStatus::RunningSync),
        "running_async" => Ok(TaskStatus::RunningAsync),
        "completed" => Ok(TaskStatus::Completed),
        "failed" => Ok(TaskStatus::Failed),
        "cancelled" => Ok(TaskStatus::Cancelled),
        other => Err(StorageError::Structural(format!(
            "unknown task status in database: {other}"
        ))),
    }
}

fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<Task, StorageError> {
    let status_str: String = row.get("status");
    Ok(Task {
        task_id: row.get("task_id"),
        provider_handle: row.get("provider_handle"),
        query: row.get("query"),
        status: str_to_status(&status_str)?,
        progress: row.get::<i64, _>("progress") as u8,
        current_action: row.get("current_action"),
        notify_on_done: row.get::<i64, _>("notify_on_done") != 0,
        tokens_in: row.get::<i64, _>("tokens_in") as u64,
        tokens_out: row.get::<i64, _>("tokens_out") as u64,
        cost_usd: row.get("cost_usd"),
        error_message: row.get("error_message"),
        model: row.get("model"),
        max_wait_hours: row.get::<i64, _>("max_wait_hours") as u32,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        completed_at: row.get("completed_at"),
    })
}

fn row_to_result(row: &sqlx::sqlite::SqliteRow) -> Result<ResearchResult, StorageError> {
    let sources_json: String = row.get("sources");
    let sources: Vec<Source> = serde_json::from_str(&sources_json)?;
    let mode_str: String = row.get("mode");
    let mode = match mode_str.as_str() {
        "sync" => ResultMode::Sync,
        "async" => ResultMode::Async,
        other => {
            return Err(StorageError::Structural(format!(
                "unknown result mode in database: {other}"
            )))
        }
    };

    Ok(ResearchResult {
        task_id: row.get("task_id"),
        report: row.get("report"),
        sources,
        metadata: ResultMetadata {
            duration_minutes: row.get("duration_minutes"),
            cost_usd: row.get("cost_usd"),
            mode,
            model: row.get("model"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        },
        created_at: row.get("created_at"),
    })
}

impl SqliteStateStore {
    pub async fn new() -> Result<Self, StorageError> {
        Self::with_config(SqliteStateStoreConfig::default()).await
    }

    pub async fn with_config(config: SqliteStateStoreConfig) -> Result<Self, StorageError> {
        info!(path = %config.database_path.display(), "opening sqlite state store");

        let db_path_str = config.database_path.to_string_lossy();
        let pool = if db_path_str == ":memory:" {
            let unique_name = uuid::Uuid::new_v4();
            let uri = format!("file:{unique_name}?mode=memory&cache=shared");
            SqlitePool::connect(&uri).await?
        } else {
            if let Some(parent) = config.database_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        StorageError::Structural(format!("failed to create database directory: {e}"))
                    })?;
                }
            }
            let connect_options = SqliteConnectOptions::new()
                .filename(&config.database_path)
                .create_if_missing(config.create_database_if_missing)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);
            SqlitePool::connect_with(connect_options).await?
        };

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        debug!("running state store migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                provider_handle TEXT,
                query TEXT NOT NULL,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL,
                current_action TEXT,
                notify_on_done INTEGER NOT NULL,
                tokens_in INTEGER NOT NULL,
                tokens_out INTEGER NOT NULL,
                cost_usd REAL NOT NULL,
                error_message TEXT,
                model TEXT NOT NULL,
                max_wait_hours INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks (status)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS results (
                task_id TEXT PRIMARY KEY,
                report TEXT NOT NULL,
                sources TEXT NOT NULL,
                duration_minutes REAL NOT NULL,
                cost_usd REAL NOT NULL,
                mode TEXT NOT NULL,
                model TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("state store migrations complete");
        Ok(())
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn save_task(&self, task: &Task) -> Result<(), StorageError> {
        with_retry(|| async {
            sqlx::query(
                r#"
                INSERT INTO tasks (
                    task_id, provider_handle, query, status, progress, current_action,
                    notify_on_done, tokens_in, tokens_out, cost_usd, error_message,
                    model, max_wait_hours, created_at, updated_at, completed_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(task_id) DO UPDATE SET
                    provider_handle = excluded.provider_handle,
                    query = excluded.query,
                    status = excluded.status,
                    progress = excluded.progress,
                    current_action = excluded.current_action,
                    notify_on_done = excluded.notify_on_done,
                    tokens_in = excluded.tokens_in,
                    tokens_out = excluded.tokens_out,
                    cost_usd = excluded.cost_usd,
                    error_message = excluded.error_message,
                    model = excluded.model,
                    max_wait_hours = excluded.max_wait_hours,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at,
                    completed_at = excluded.completed_at
                "#,
            )
            .bind(&task.task_id)
            .bind(&task.provider_handle)
            .bind(&task.query)
            .bind(status_to_str(task.status))
            .bind(task.progress as i64)
            .bind(&task.current_action)
            .bind(task.notify_on_done as i64)
            .bind(task.tokens_in as i64)
            .bind(task.tokens_out as i64)
            .bind(task.cost_usd)
            .bind(&task.error_message)
            .bind(&task.model)
            .bind(task.max_wait_hours as i64)
            .bind(task.created_at)
            .bind(task.updated_at)
            .bind(task.completed_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, StorageError> {
        with_retry(|| async {
            let row = sqlx::query("SELECT * FROM tasks WHERE task_id = ?")
                .bind(task_id)
                .fetch_optional(&self.pool)
                .await?;
            match row {
                Some(row) => row_to_task(&row),
                None => Err(StorageError::TaskNotFound(task_id.to_string())),
            }
        })
        .await
    }

    async fn update_task(&self, task: &Task) -> Result<(), StorageError> {
        with_retry(|| async {
            // Terminal immutability: once a stored task is terminal, a
            // different requested status is rejected with
            // `StorageError::TerminalDowngrade`; only `error_message` may
            // still change alongside the same status.
            let existing_status: Option<String> =
                sqlx::query("SELECT status FROM tasks WHERE task_id = ?")
                    .bind(&task.task_id)
                    .fetch_optional(&self.pool)
                    .await?
                    .map(|row| row.get("status"));

            let Some(existing_status) = existing_status else {
                return Err(StorageError::TaskNotFound(task.task_id.clone()));
            };
            let existing_status = str_to_status(&existing_status)?;

            if existing_status.is_terminal() {
                if task.status != existing_status {
                    return Err(StorageError::TerminalDowngrade {
                        task_id: task.task_id.clone(),
                        current: existing_status,
                        requested: task.status,
                    });
                }
                let result = sqlx::query("UPDATE tasks SET error_message = ? WHERE task_id = ?")
                    .bind(&task.error_message)
                    .bind(&task.task_id)
                    .execute(&self.pool)
                    .await?;
                return if result.rows_affected() == 0 {
                    Err(StorageError::TaskNotFound(task.task_id.clone()))
                } else {
                    Ok(())
                };
            }

            if task.status != existing_status {
                validate_transition(existing_status, task.status)
                    .map_err(|e| StorageError::Structural(e.to_string()))?;
            }

            let result = sqlx::query(
                r#"
                UPDATE tasks SET
                    provider_handle = ?, query = ?, status = ?, progress = ?,
                    current_action = ?, notify_on_done = ?, tokens_in = ?, tokens_out = ?,
                    cost_usd = ?, error_message = ?, model = ?, max_wait_hours = ?,
                    updated_at = ?, completed_at = ?
                WHERE task_id = ?
                "#,
            )
            .bind(&task.provider_handle)
            .bind(&task.query)
            .bind(status_to_str(task.status))
            .bind(task.progress as i64)
            .bind(&task.current_action)
            .bind(task.notify_on_done as i64)
            .bind(task.tokens_in as i64)
            .bind(task.tokens_out as i64)
            .bind(task.cost_usd)
            .bind(&task.error_message)
            .bind(&task.model)
            .bind(task.max_wait_hours as i64)
            .bind(task.updated_at)
            .bind(task.completed_at)
            .bind(&task.task_id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                Err(StorageError::TaskNotFound(task.task_id.clone()))
            } else {
                Ok(())
            }
        })
        .await
    }

    async fn get_incomplete_tasks(&self) -> Result<Vec<Task>, StorageError> {
        with_retry(|| async {
            let rows = sqlx::query(
                "SELECT * FROM tasks WHERE status NOT IN ('completed', 'failed', 'cancelled')",
            )
            .fetch_all(&self.pool)
            .await?;
            rows.iter().map(row_to_task).collect()
        })
        .await
    }

    async fn save_result(&self, result: &ResearchResult) -> Result<(), StorageError> {
        let sources_json = serde_json::to_string(&result.sources)?;
        let mode_str = match result.metadata.mode {
            ResultMode::Sync => "sync",
            ResultMode::Async => "async",
        };

        with_retry(|| async {
            sqlx::query(
                r#"
                INSERT INTO results (
                    task_id, report, sources, duration_minutes, cost_usd, mode,
                    model, started_at, completed_at, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(task_id) DO UPDATE SET
                    report = excluded.report,
                    sources = excluded.sources,
                    duration_minutes = excluded.duration_minutes,
                    cost_usd = excluded.cost_usd,
                    mode = excluded.mode,
                    model = excluded.model,
                    started_at = excluded.started_at,
                    completed_at = excluded.completed_at,
                    created_at = excluded.created_at
                "#,
            )
            .bind(&result.task_id)
            .bind(&result.report)
            .bind(&sources_json)
            .bind(result.metadata.duration_minutes)
            .bind(result.metadata.cost_usd)
            .bind(mode_str)
            .bind(&result.metadata.model)
            .bind(result.metadata.started_at)
            .bind(result.metadata.completed_at)
            .bind(result.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn get_result(&self, task_id: &str) -> Result<ResearchResult, StorageError> {
        with_retry(|| async {
            let row = sqlx::query("SELECT * FROM results WHERE task_id = ?")
                .bind(task_id)
                .fetch_optional(&self.pool)
                .await?;
            match row {
                Some(row) => row_to_result(&row),
                None => Err(StorageError::ResultNotFound(task_id.to_string())),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepresearch_core::Task as CoreTask;

    async fn test_store() -> SqliteStateStore {
        SqliteStateStore::with_config(SqliteStateStoreConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 5,
            create_database_if_missing: true,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn save_then_get_roundtrips() {
        let store = test_store().await;
        let task = CoreTask::new("sqlite roundtrip query".to_string(), false, 1, "default".to_string());
        store.save_task(&task).await.unwrap();
        let fetched = store.get_task(&task.task_id).await.unwrap();
        assert_eq!(fetched.query, task.query);
        assert_eq!(fetched.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn update_changes_status_and_progress() {
        let store = test_store().await;
        let mut task = CoreTask::new("update me".to_string(), false, 1, "default".to_string());
        store.save_task(&task).await.unwrap();

        task.status = TaskStatus::RunningAsync;
        task.progress = 40;
        store.update_task(&task).await.unwrap();

        let fetched = store.get_task(&task.task_id).await.unwrap();
        assert_eq!(fetched.status, TaskStatus::RunningAsync);
        assert_eq!(fetched.progress, 40);
    }

    #[tokio::test]
    async fn update_unknown_task_errors() {
        let store = test_store().await;
        let task = CoreTask::new("never saved".to_string(), false, 1, "default".to_string());
        let err = store.update_task(&task).await.unwrap_err();
        assert!(matches!(err, StorageError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn terminal_task_accepts_same_status_error_message_update() {
        let store = test_store().await;
        let mut task = CoreTask::new("terminal guard".to_string(), false, 1, "default".to_string());
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
        let store = test_store().await;
        let mut task = CoreTask::new("terminal guard".to_string(), false, 1, "default".to_string());
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
    async fn save_task_upserts_by_task_id() {
        let store = test_store().await;
        let mut task = CoreTask::new("upsert me".to_string(), false, 1, "default".to_string());
        store.save_task(&task).await.unwrap();

        task.query = "upsert me again".to_string();
        task.status = TaskStatus::RunningSync;
        store.save_task(&task).await.unwrap();

        let fetched = store.get_task(&task.task_id).await.unwrap();
        assert_eq!(fetched.query, "upsert me again");
        assert_eq!(fetched.status, TaskStatus::RunningSync);
    }

    #[tokio::test]
    async fn incomplete_tasks_excludes_terminal() {
        let store = test_store().await;
        let running = CoreTask::new("running".to_string(), false, 1, "default".to_string());
        store.save_task(&running).await.unwrap();

        let mut done = CoreTask::new("done".to_string(), false, 1, "default".to_string());
        done.status = TaskStatus::Completed;
        store.save_task(&done).await.unwrap();

        let incomplete = store.get_incomplete_tasks().await.unwrap();
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].task_id, running.task_id);
    }

    #[tokio::test]
    async fn result_upsert_then_fetch() {
        let store = test_store().await;
        let task = CoreTask::new("result query".to_string(), false, 1, "default".to_string());
        store.save_task(&task).await.unwrap();

        let result = ResearchResult {
            task_id: task.task_id.clone(),
            report: "The answer is 42.".to_string(),
            sources: vec![Source {
                title: "Example".to_string(),
                url: "https://example.com".to_string(),
                snippet: "an excerpt".to_string(),
                relevance_score: 0.9,
            }],
            metadata: ResultMetadata {
                duration_minutes: 3.5,
                cost_usd: 0.12,
                mode: ResultMode::Async,
                model: "default".to_string(),
                started_at: chrono::Utc::now(),
                completed_at: chrono::Utc::now(),
            },
            created_at: chrono::Utc::now(),
        };
        store.save_result(&result).await.unwrap();

        let fetched = store.get_result(&task.task_id).await.unwrap();
        assert_eq!(fetched.report, "The answer is 42.");
        assert_eq!(fetched.sources.len(), 1);
    }

    #[tokio::test]
    async fn get_missing_result_errors() {
        let store = test_store().await;
        let err = store.get_result("missing").await.unwrap_err();
        assert!(matches!(err, StorageError::ResultNotFound(_)));
    }
}
