//! # Research Engine
//!
//! The orchestration core: the lifecycle state machine, and the
//! sole writer to [`StateStore`] for non-initial writes. Shaped directly on
//! `turul-mcp-server::task::runtime::TaskRuntime`, which already "bridges
//! task storage with runtime execution state" by owning an
//! `Arc<dyn TaskStorage>` and an `Arc<dyn TaskExecutor>` and exposing
//! `register_task`/`update_status`/`complete_task`/`cancel_task`/
//! `await_terminal`/`recover_stuck_tasks`. `ResearchEngine` generalizes that
//! exact shape to additionally own a `ProviderClient` and a `Notifier`, and
//! implements the full state machine (`start`, the background
//! polling unit in [`poll`], `cancel`, `recover_on_startup`, `estimate`,
//! `save_to_markdown`).

pub mod markdown;
pub mod poll;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use deepresearch_core::{
    validate_max_wait_hours, validate_query, CostEstimate, EngineError, ResearchResult, Task,
    TaskStatus, TokenUsage,
};
use deepresearch_estimate::EstimatorConfig;
use deepresearch_executor::{BackgroundExecutor, CancellationHandle, ExecutorConfig, PollingUnit};
use deepresearch_notify::Notifier;
use deepresearch_provider::{ProviderClient, ProviderError};
use deepresearch_storage::{StateStore, StorageError};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub use markdown::{MarkdownError, SaveOutcome};
pub use poll::LoopOutcome;

/// Per-task `save_partial` preferences recorded by [`ResearchEngine::cancel`]
/// and consulted by the running poll loop the moment it observes
/// cancellation (see [`poll::run_poll_loop`] for why this can't be a plain
/// argument baked in at spawn time).
pub type CancelPreferences = Arc<RwLock<HashMap<String, bool>>>;

/// Tunable constants of the engine. Mirrors the shape of
/// `turul-mcp-server`'s `SqliteTaskConfig`-style config structs: a plain
/// struct with a `Default` impl carrying the lifecycle's fixed numeric
/// constants.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// How long `start` waits for a synchronous provider completion before
    /// handing off to the background unit.
    pub sync_budget: Duration,
    /// Interval between polls of an in-flight task.
    pub poll_interval: Duration,
    /// Minimum free space required to attempt `save_to_markdown` (default
    /// 10 MB).
    pub min_free_space_bytes: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_budget: Duration::from_secs(30),
            poll_interval: Duration::from_secs(10),
            min_free_space_bytes: 10 * 1024 * 1024,
        }
    }
}

/// The `start` result: a sum type modeling "Hybrid sync/async
/// response shape" — `SyncCompleted(results)` or `AsyncStarted(task_id)`.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Sync { task_id: String, result: ResearchResult },
    Async { task_id: String },
}

/// Result shape for the `status` tool.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusView {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub current_action: String,
    pub elapsed_minutes: f64,
    pub tokens: TokenUsage,
    pub cost_so_far: f64,
    pub estimated_completion_minutes: Option<f64>,
}

/// Result shape for the `cancel` tool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CancelOutcome {
    pub partial_results_saved: bool,
    pub progress_at_cancellation: u8,
    pub cost_usd: f64,
}

/// The orchestration core. Owns all collaborators explicitly — no hidden
/// module-level mutable state, matching `TaskRuntime::new(storage, executor)`.
pub struct ResearchEngine {
    storage: Arc<dyn StateStore>,
    executor: Arc<BackgroundExecutor>,
    provider: Arc<dyn ProviderClient>,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
    cancel_prefs: CancelPreferences,
}

impl ResearchEngine {
    pub fn new(
        storage: Arc<dyn StateStore>,
        provider: Arc<dyn ProviderClient>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self::with_executor(
            storage,
            Arc::new(BackgroundExecutor::new(ExecutorConfig::default())),
            provider,
            notifier,
            config,
        )
    }

    pub fn with_executor(
        storage: Arc<dyn StateStore>,
        executor: Arc<BackgroundExecutor>,
        provider: Arc<dyn ProviderClient>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            storage,
            executor,
            provider,
            notifier,
            config,
            cancel_prefs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn storage(&self) -> &Arc<dyn StateStore> {
        &self.storage
    }

    /// `start(query, notify_on_done, max_wait_hours, model)`.
    pub async fn start(
        &self,
        query: String,
        notify_on_done: bool,
        max_wait_hours: u32,
        model: String,
    ) -> Result<StartOutcome, EngineError> {
        validate_query(&query).map_err(|message| EngineError::invalid_input("query", message))?;
        validate_max_wait_hours(max_wait_hours)
            .map_err(|message| EngineError::invalid_input("max_wait_hours", message))?;

        let mut task = Task::new(query.clone(), notify_on_done, max_wait_hours, model.clone());
        let task_id = task.task_id.clone();
        self.storage
            .save_task(&task)
            .await
            .map_err(storage_err)?;

        let submission = self.provider.submit(&query, &model).await;
        let submitted = match submission {
            Ok(outcome) => outcome,
            Err(err) => {
                let message = err.to_string();
                task.status = TaskStatus::Failed;
                task.error_message = Some(message.clone());
                task.completed_at = Some(Utc::now());
                task.updated_at = Utc::now();
                let _ = self.storage.update_task(&task).await;
                return Err(provider_err(err));
            }
        };

        task.provider_handle = Some(submitted.handle);
        task.status = TaskStatus::RunningSync;
        task.updated_at = Utc::now();
        self.storage
            .update_task(&task)
            .await
            .map_err(storage_err)?;

        // A single polling unit drives this task for its entire life,
        // whether the sync race below wins or times out.
        self.spawn_unit(&task_id).await?;

        tokio::select! {
            _ = self.executor.await_done(&task_id) => {
                self.finish_sync_race(&task_id).await
            }
            _ = tokio::time::sleep(self.config.sync_budget) => {
                self.detach_to_async(&task_id).await
            }
        }
    }

    async fn finish_sync_race(&self, task_id: &str) -> Result<StartOutcome, EngineError> {
        let task = self.storage.get_task(task_id).await.map_err(storage_err)?;
        match task.status {
            TaskStatus::Completed => {
                let result = self.storage.get_result(task_id).await.map_err(storage_err)?;
                Ok(StartOutcome::Sync {
                    task_id: task_id.to_string(),
                    result,
                })
            }
            TaskStatus::Failed => Err(EngineError::ProviderFailed(
                task.error_message.unwrap_or_else(|| "research task failed".to_string()),
            )),
            TaskStatus::Cancelled => Err(EngineError::ProviderFailed(
                "task was cancelled before it completed".to_string(),
            )),
            _ => self.detach_to_async(task_id).await,
        }
    }

    /// Timeout path: advance to `RunningAsync` (idempotent, never
    /// downgrades) and return the handle to the caller.
    /// The background unit spawned in `start` keeps driving the task.
    async fn detach_to_async(&self, task_id: &str) -> Result<StartOutcome, EngineError> {
        let task = self.storage.get_task(task_id).await.map_err(storage_err)?;
        if task.status == TaskStatus::RunningSync {
            let mut updated = task;
            updated.status = TaskStatus::RunningAsync;
            updated.updated_at = Utc::now();
            self.storage
                .update_task(&updated)
                .await
                .map_err(storage_err)?;
        }
        Ok(StartOutcome::Async {
            task_id: task_id.to_string(),
        })
    }

    /// Spawn the single polling unit for `task_id`, wired to notify on
    /// terminal transitions — except a `Completed` outcome
    /// whose `Result::metadata.mode` is `Sync`, since "no notification is
    /// emitted on the sync path".
    async fn spawn_unit(&self, task_id: &str) -> Result<(), EngineError> {
        let storage = Arc::clone(&self.storage);
        let provider = Arc::clone(&self.provider);
        let notifier = Arc::clone(&self.notifier);
        let config = self.config;
        let cancel_prefs = Arc::clone(&self.cancel_prefs);
        let task_id_owned = task_id.to_string();

        let unit: PollingUnit = Box::new(move |cancellation: CancellationHandle| {
            Box::pin(async move {
                let outcome = poll::run_poll_loop(
                    &storage,
                    &provider,
                    &config,
                    &task_id_owned,
                    &cancellation,
                    &cancel_prefs,
                )
                .await;
                notify_for_outcome(&storage, &notifier, &task_id_owned, &outcome).await;
            })
        });

        self.executor
            .start(task_id, unit)
            .await
            .map_err(|_| EngineError::CapacityExceeded)
    }

    /// `status(task_id)`.
    pub async fn status(&self, task_id: &str) -> Result<StatusView, EngineError> {
        let task = self.storage.get_task(task_id).await.map_err(storage_err)?;
        let estimate = if task.status.is_terminal() {
            None
        } else {
            let est = deepresearch_estimate::estimate_with_config(&task.query, EstimatorConfig::default());
            remaining_minutes(&est, &task)
        };

        Ok(StatusView {
            task_id: task.task_id.clone(),
            status: task.status,
            progress: task.progress,
            current_action: task.current_action.clone(),
            elapsed_minutes: task.elapsed_minutes(),
            tokens: TokenUsage {
                input: task.tokens_in,
                output: task.tokens_out,
            },
            cost_so_far: task.cost_usd,
            estimated_completion_minutes: estimate,
        })
    }

    /// `get(task_id)`.
    pub async fn get(&self, task_id: &str) -> Result<(Task, ResearchResult), EngineError> {
        let task = self.storage.get_task(task_id).await.map_err(storage_err)?;
        match self.storage.get_result(task_id).await {
            Ok(result) => Ok((task, result)),
            Err(StorageError::ResultNotFound(_)) => Err(EngineError::NotCompleted {
                task_id: task.task_id,
                status: task.status,
                progress: task.progress,
            }),
            Err(other) => Err(storage_err(other)),
        }
    }

    /// `cancel(task_id, save_partial)`.
    pub async fn cancel(&self, task_id: &str, save_partial: bool) -> Result<CancelOutcome, EngineError> {
        let task = self.storage.get_task(task_id).await.map_err(storage_err)?;
        if task.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal(task_id.to_string()));
        }

        self.cancel_prefs
            .write()
            .await
            .insert(task_id.to_string(), save_partial);

        let was_running = self.executor.cancel(task_id).await;
        if was_running {
            self.executor.await_done(task_id).await;
        } else {
            // No unit tracked (e.g. a task created but never spawned, or
            // already torn down) — perform the transition directly.
            let mut updated = task.clone();
            updated.status = TaskStatus::Cancelled;
            updated.completed_at = Some(Utc::now());
            updated.updated_at = Utc::now();
            self.storage.update_task(&updated).await.map_err(storage_err)?;
        }

        let final_task = self.storage.get_task(task_id).await.map_err(storage_err)?;
        let partial_results_saved = self.storage.get_result(task_id).await.is_ok();
        self.cancel_prefs.write().await.remove(task_id);

        Ok(CancelOutcome {
            partial_results_saved,
            progress_at_cancellation: final_task.progress,
            cost_usd: final_task.cost_usd,
        })
    }

    /// `estimate(query)`.
    pub fn estimate(&self, query: &str) -> Result<CostEstimate, EngineError> {
        validate_query(query).map_err(|message| EngineError::invalid_input("query", message))?;
        let est_config = EstimatorConfig {
            sync_budget_seconds: self.config.sync_budget.as_secs(),
        };
        Ok(deepresearch_estimate::estimate_with_config(query, est_config))
    }

    /// `save_to_markdown(task_id, out_dir, prefix, include_metadata,
    /// include_sources)`.
    pub async fn save_to_markdown(
        &self,
        task_id: &str,
        out_dir: &std::path::Path,
        prefix: &str,
        include_metadata: bool,
        include_sources: bool,
    ) -> Result<SaveOutcome, EngineError> {
        let task = self.storage.get_task(task_id).await.map_err(storage_err)?;
        let result = match self.storage.get_result(task_id).await {
            Ok(result) => result,
            Err(StorageError::ResultNotFound(_)) => {
                return Err(EngineError::NotCompleted {
                    task_id: task.task_id,
                    status: task.status,
                    progress: task.progress,
                })
            }
            Err(other) => return Err(storage_err(other)),
        };

        markdown::save_to_markdown(
            &task,
            &result,
            out_dir,
            prefix,
            include_metadata,
            include_sources,
            self.config.min_free_space_bytes,
        )
        .map_err(|err| match err {
            MarkdownError::Io { path, message } => EngineError::Io { path, message },
        })
    }

    /// `recover_on_startup()`.
    pub async fn recover_on_startup(&self) -> Result<usize, EngineError> {
        let incomplete = self
            .storage
            .get_incomplete_tasks()
            .await
            .map_err(storage_err)?;

        let mut recovered = 0;
        for task in incomplete {
            if task.provider_handle.is_some() {
                self.spawn_unit(&task.task_id).await?;
                recovered += 1;
                debug!(task_id = %task.task_id, "recovered task, re-attached polling unit");
            } else {
                let mut updated = task.clone();
                updated.status = TaskStatus::Failed;
                updated.error_message = Some("interrupted before submission".to_string());
                updated.completed_at = Some(Utc::now());
                updated.updated_at = Utc::now();
                if let Err(err) = self.storage.update_task(&updated).await {
                    warn!(task_id = %task.task_id, error = %err, "failed to mark pre-submit crash as failed");
                }
            }
        }

        if recovered > 0 {
            info!(count = recovered, "re-attached background polling units on startup");
        }

        Ok(recovered)
    }
}

async fn notify_for_outcome(
    storage: &Arc<dyn StateStore>,
    notifier: &Arc<dyn Notifier>,
    task_id: &str,
    outcome: &LoopOutcome,
) {
    let task = match storage.get_task(task_id).await {
        Ok(task) => task,
        Err(_) => return,
    };
    if !task.notify_on_done {
        return;
    }

    match outcome {
        LoopOutcome::Completed(result) if result.metadata.mode == deepresearch_core::ResultMode::Async => {
            notifier
                .notify("Research task complete", &format!("\"{}\" is ready.", task.query))
                .await;
        }
        LoopOutcome::Completed(_) => {
            // Sync win.
        }
        LoopOutcome::Failed { message } => {
            notifier
                .notify("Research task failed", &format!("\"{}\": {message}", task.query))
                .await;
        }
        LoopOutcome::Cancelled { .. } => {
            // Cancellation is caller-initiated; the caller already knows.
        }
    }
}

fn remaining_minutes(estimate: &CostEstimate, task: &Task) -> Option<f64> {
    let elapsed = task.elapsed_minutes();
    let remaining = estimate.duration_minutes.likely - elapsed;
    Some(remaining.max(0.0))
}

fn storage_err(err: StorageError) -> EngineError {
    match err {
        StorageError::TaskNotFound(id) => EngineError::NotFound(id),
        StorageError::ResultNotFound(id) => EngineError::NotFound(id),
        other => EngineError::Storage(other.to_string()),
    }
}

fn provider_err(err: ProviderError) -> EngineError {
    if err.is_retryable() {
        EngineError::ProviderUnavailable(err.to_string())
    } else {
        EngineError::ProviderFailed(err.to_string())
    }
}
