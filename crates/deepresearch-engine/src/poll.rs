//! The background polling unit that drives a single [`Task`] forward by
//! repeated [`ProviderClient::poll`] calls until it reaches a terminal
//! outcome or observes cancellation.
//!
//! Shared by three call sites in [`crate::ResearchEngine`]: the synchronous
//! race in `start`, the background continuation spawned on sync timeout, and
//! `recover_on_startup`'s re-attached units. All three drive the exact same
//! loop; only what happens with the returned [`LoopOutcome`] differs (the
//! sync path suppresses the notification).

use std::sync::Arc;

use chrono::Utc;
use deepresearch_core::{ResearchResult, ResultMetadata, ResultMode, Source, Task, TaskStatus};
use deepresearch_executor::CancellationHandle;
use deepresearch_provider::{ProviderClient, ProviderResult, ProviderState};
use deepresearch_storage::StateStore;
use tracing::{debug, warn};

use crate::{CancelPreferences, EngineConfig};

/// Fixed message used when the provider reports `expired` — "the core
/// treats anything indicating a discarded session as `SessionExpired`"
///.
pub const SESSION_EXPIRED_MESSAGE: &str = "provider session expired: remote research session was discarded";

/// How a polling loop exited. Carries everything the caller needs to decide
/// whether to notify — the loop itself never touches the [`Notifier`]
/// trait, keeping it reusable for both the sync-race and background paths.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    Completed(ResearchResult),
    Failed { message: String },
    Cancelled { partial_saved: bool },
}

/// Drive `task_id` forward until it reaches a terminal outcome or
/// `cancellation` fires. Every mutation to the task row is persisted through
/// `storage` before this function returns, so the caller never needs to
/// reconcile state afterward — it only decides what to notify.
///
/// `cancel_prefs` is consulted only at the moment cancellation is observed —
/// the caller of [`crate::ResearchEngine::cancel`] may record its
/// `save_partial` choice well after this loop was spawned, so the decision
/// can't be baked in at spawn time. Missing entries default to `true`,
/// matching the tool surface's default.
pub async fn run_poll_loop(
    storage: &Arc<dyn StateStore>,
    provider: &Arc<dyn ProviderClient>,
    config: &EngineConfig,
    task_id: &str,
    cancellation: &CancellationHandle,
    cancel_prefs: &CancelPreferences,
) -> LoopOutcome {
    let mut last_partial: Option<ProviderResult> = None;
    let mut first_iteration = true;

    loop {
        if !first_iteration {
            tokio::select! {
                _ = tokio::time::sleep(config.poll_interval) => {}
                _ = cancellation.cancelled() => {
                    let save_partial = save_partial_preference(cancel_prefs, task_id).await;
                    return cancel_task(storage, task_id, last_partial.as_ref(), save_partial).await;
                }
            }
        }
        first_iteration = false;

        if cancellation.is_cancelled() {
            let save_partial = save_partial_preference(cancel_prefs, task_id).await;
            return cancel_task(storage, task_id, last_partial.as_ref(), save_partial).await;
        }

        let task = match storage.get_task(task_id).await {
            Ok(task) => task,
            Err(err) => {
                warn!(task_id, error = %err, "poll loop could not load task; stopping");
                return LoopOutcome::Failed {
                    message: format!("lost track of task during polling: {err}"),
                };
            }
        };

        if task.status.is_terminal() {
            // Raced with a concurrent transition (e.g. a cancel that landed
            // between our cancellation check and this read). Nothing left
            // to drive.
            return terminal_outcome_for(storage, &task).await;
        }

        let elapsed = Utc::now() - task.created_at;
        let max_wait = chrono::Duration::hours(task.max_wait_hours as i64);
        if elapsed >= max_wait {
            let message = "task exceeded its max_wait_hours bound".to_string();
            fail_task(storage, task_id, &message).await;
            return LoopOutcome::Failed { message };
        }

        let Some(handle) = task.provider_handle.clone() else {
            let message = "interrupted before submission".to_string();
            fail_task(storage, task_id, &message).await;
            return LoopOutcome::Failed { message };
        };

        match provider.poll(&handle).await {
            Ok(outcome) => {
                if let Some(result) = &outcome.result {
                    last_partial = Some(result.clone());
                }

                match outcome.state() {
                    ProviderState::Running => {
                        apply_progress(storage, &task, &outcome).await;
                    }
                    ProviderState::Completed => {
                        let Some(provider_result) = outcome.result.or(last_partial.clone()) else {
                            let message = "provider reported completion without a result".to_string();
                            fail_task(storage, task_id, &message).await;
                            return LoopOutcome::Failed { message };
                        };
                        let result = complete_task(storage, &task, provider_result, &outcome).await;
                        return LoopOutcome::Completed(result);
                    }
                    ProviderState::Failed => {
                        let message = outcome
                            .error_message
                            .unwrap_or_else(|| "provider reported failure".to_string());
                        fail_task(storage, task_id, &message).await;
                        return LoopOutcome::Failed { message };
                    }
                    ProviderState::Expired => {
                        fail_task(storage, task_id, SESSION_EXPIRED_MESSAGE).await;
                        return LoopOutcome::Failed {
                            message: SESSION_EXPIRED_MESSAGE.to_string(),
                        };
                    }
                }
            }
            Err(err) => {
                // Transport-level hiccups don't terminate the task — the
                // provider is assumed long-lived; we just try again next
                // interval, assumption.
                warn!(task_id, error = %err, "transient error polling provider, will retry");
            }
        }
    }
}

/// Apply a `running` poll outcome to the stored task: progress is
/// monotonic, `current_action` may change freely.
async fn apply_progress(
    storage: &Arc<dyn StateStore>,
    task: &Task,
    outcome: &deepresearch_provider::PollOutcome,
) {
    let mut updated = task.clone();
    if let Some(progress) = outcome.progress {
        if progress > updated.progress {
            updated.progress = progress;
        }
    }
    if let Some(action) = &outcome.current_action {
        updated.current_action = action.clone();
    }
    if let Some(tokens) = outcome.tokens {
        updated.tokens_in = tokens.input;
        updated.tokens_out = tokens.output;
        updated.cost_usd = estimate_cost_usd(tokens.input, tokens.output);
    }
    updated.updated_at = Utc::now();

    if let Err(err) = storage.update_task(&updated).await {
        warn!(task_id = %task.task_id, error = %err, "failed to persist progress update");
    }
}

/// Fixed per-million-token rates backing the derived `cost_usd`. The
/// provider itself is also free to report `cost_usd` directly in a
/// `completed` result's metadata; this is only used while still polling.
const INPUT_RATE_PER_MILLION: f64 = 3.0;
const OUTPUT_RATE_PER_MILLION: f64 = 15.0;

fn estimate_cost_usd(tokens_in: u64, tokens_out: u64) -> f64 {
    (tokens_in as f64 / 1_000_000.0) * INPUT_RATE_PER_MILLION
        + (tokens_out as f64 / 1_000_000.0) * OUTPUT_RATE_PER_MILLION
}

async fn complete_task(
    storage: &Arc<dyn StateStore>,
    task: &Task,
    provider_result: ProviderResult,
    outcome: &deepresearch_provider::PollOutcome,
) -> ResearchResult {
    let now = Utc::now();
    let mut updated = task.clone();
    updated.status = TaskStatus::Completed;
    updated.progress = 100;
    updated.current_action = "completed".to_string();
    if let Some(tokens) = outcome.tokens {
        updated.tokens_in = tokens.input;
        updated.tokens_out = tokens.output;
        updated.cost_usd = estimate_cost_usd(tokens.input, tokens.output);
    }
    updated.completed_at = Some(now);
    updated.updated_at = now;

    let mode = if matches!(task.status, TaskStatus::RunningSync) {
        ResultMode::Sync
    } else {
        ResultMode::Async
    };

    let result = ResearchResult {
        task_id: task.task_id.clone(),
        report: provider_result.report,
        sources: provider_result.sources,
        metadata: ResultMetadata {
            duration_minutes: (now - task.created_at).num_milliseconds() as f64 / 60_000.0,
            cost_usd: updated.cost_usd,
            mode,
            model: task.model.clone(),
            started_at: task.created_at,
            completed_at: now,
        },
        created_at: now,
    };

    if let Err(err) = storage.update_task(&updated).await {
        warn!(task_id = %task.task_id, error = %err, "failed to persist completed task");
    }
    if let Err(err) = storage.save_result(&result).await {
        warn!(task_id = %task.task_id, error = %err, "failed to persist research result");
    }

    debug!(task_id = %task.task_id, "task completed");
    result
}

async fn fail_task(storage: &Arc<dyn StateStore>, task_id: &str, message: &str) {
    let task = match storage.get_task(task_id).await {
        Ok(task) => task,
        Err(err) => {
            warn!(task_id, error = %err, "could not load task to mark failed");
            return;
        }
    };
    if task.status.is_terminal() {
        return;
    }
    let now = Utc::now();
    let mut updated = task;
    updated.status = TaskStatus::Failed;
    updated.error_message = Some(message.to_string());
    updated.completed_at = Some(now);
    updated.updated_at = now;
    if let Err(err) = storage.update_task(&updated).await {
        warn!(task_id, error = %err, "failed to persist failed task");
    }
}

async fn save_partial_preference(cancel_prefs: &CancelPreferences, task_id: &str) -> bool {
    cancel_prefs.read().await.get(task_id).copied().unwrap_or(true)
}

async fn cancel_task(
    storage: &Arc<dyn StateStore>,
    task_id: &str,
    last_partial: Option<&ProviderResult>,
    save_partial: bool,
) -> LoopOutcome {
    let task = match storage.get_task(task_id).await {
        Ok(task) => task,
        Err(err) => {
            warn!(task_id, error = %err, "could not load task to cancel");
            return LoopOutcome::Cancelled { partial_saved: false };
        }
    };
    if task.status.is_terminal() {
        return LoopOutcome::Cancelled { partial_saved: false };
    }

    let now = Utc::now();
    let mut updated = task.clone();
    updated.status = TaskStatus::Cancelled;
    updated.completed_at = Some(now);
    updated.updated_at = now;
    if let Err(err) = storage.update_task(&updated).await {
        warn!(task_id, error = %err, "failed to persist cancelled task");
    }

    let mut partial_saved = false;
    if save_partial {
        let (report, sources): (String, Vec<Source>) = match last_partial {
            Some(partial) => (partial.report.clone(), partial.sources.clone()),
            None => (String::new(), Vec::new()),
        };
        let result = ResearchResult {
            task_id: task_id.to_string(),
            report,
            sources,
            metadata: ResultMetadata {
                duration_minutes: (now - task.created_at).num_milliseconds() as f64 / 60_000.0,
                cost_usd: task.cost_usd,
                mode: ResultMode::Async,
                model: task.model.clone(),
                started_at: task.created_at,
                completed_at: now,
            },
            created_at: now,
        };
        match storage.save_result(&result).await {
            Ok(()) => partial_saved = true,
            Err(err) => warn!(task_id, error = %err, "failed to persist partial result on cancel"),
        }
    }

    LoopOutcome::Cancelled { partial_saved }
}

/// Reconcile a loop iteration that discovered the task was already terminal
/// (a race with a concurrent cancel or a previous run of this same loop).
async fn terminal_outcome_for(storage: &Arc<dyn StateStore>, task: &Task) -> LoopOutcome {
    match task.status {
        TaskStatus::Completed => match storage.get_result(&task.task_id).await {
            Ok(result) => LoopOutcome::Completed(result),
            Err(_) => LoopOutcome::Failed {
                message: "task marked completed with no stored result".to_string(),
            },
        },
        TaskStatus::Cancelled => {
            let saved = storage.get_result(&task.task_id).await.is_ok();
            LoopOutcome::Cancelled { partial_saved: saved }
        }
        _ => LoopOutcome::Failed {
            message: task
                .error_message
                .clone()
                .unwrap_or_else(|| "task failed".to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepresearch_core::Task as CoreTask;
    use deepresearch_provider::{MockProviderClient, PollOutcome};
    use deepresearch_storage::InMemoryStateStore;

    fn config() -> EngineConfig {
        EngineConfig {
            poll_interval: std::time::Duration::from_millis(1),
            ..EngineConfig::default()
        }
    }

    /// Empty preference map — `save_partial_preference` defaults missing
    /// entries to `true`, matching every test below that expects a
    /// cancellation to persist whatever partial result it observed.
    fn default_cancel_prefs() -> CancelPreferences {
        Arc::new(tokio::sync::RwLock::new(std::collections::HashMap::new()))
    }

    async fn running_task(storage: &Arc<dyn StateStore>, handle: &str) -> Task {
        let mut task = CoreTask::new("what is rust".to_string(), true, 1, "default".to_string());
        task.status = TaskStatus::RunningAsync;
        task.provider_handle = Some(handle.to_string());
        storage.save_task(&task).await.unwrap();
        task
    }

    #[tokio::test]
    async fn completes_when_provider_reports_completed() {
        let storage: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let mock = Arc::new(MockProviderClient::new());
        let provider: Arc<dyn ProviderClient> = Arc::clone(&mock) as Arc<dyn ProviderClient>;

        let task = running_task(&storage, "h1").await;
        mock.script_poll(
            "h1",
            Ok(PollOutcome::completed(
                deepresearch_provider::ProviderResult {
                    report: "the answer".to_string(),
                    sources: vec![],
                },
                deepresearch_core::TokenUsage { input: 10, output: 20 },
            )),
        );

        let cancellation = CancellationHandle::new();
        let outcome = run_poll_loop(&storage, &provider, &config(), &task.task_id, &cancellation, &default_cancel_prefs()).await;

        match outcome {
            LoopOutcome::Completed(result) => assert_eq!(result.report, "the answer"),
            other => panic!("expected Completed, got {other:?}"),
        }
        let stored = storage.get_task(&task.task_id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
        assert_eq!(stored.progress, 100);
    }

    #[tokio::test]
    async fn fails_on_provider_failed() {
        let storage: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let mock = Arc::new(MockProviderClient::new());
        let provider: Arc<dyn ProviderClient> = Arc::clone(&mock) as Arc<dyn ProviderClient>;
        let task = running_task(&storage, "h2").await;
        mock.script_poll("h2", Ok(PollOutcome::failed("provider blew up")));

        let cancellation = CancellationHandle::new();
        let outcome = run_poll_loop(&storage, &provider, &config(), &task.task_id, &cancellation, &default_cancel_prefs()).await;
        assert!(matches!(outcome, LoopOutcome::Failed { .. }));
        let stored = storage.get_task(&task.task_id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("provider blew up"));
    }

    #[tokio::test]
    async fn expired_surfaces_fixed_message() {
        let storage: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let mock = Arc::new(MockProviderClient::new());
        let provider: Arc<dyn ProviderClient> = Arc::clone(&mock) as Arc<dyn ProviderClient>;
        let task = running_task(&storage, "h3").await;
        mock.script_poll("h3", Ok(PollOutcome::expired()));

        let cancellation = CancellationHandle::new();
        let outcome = run_poll_loop(&storage, &provider, &config(), &task.task_id, &cancellation, &default_cancel_prefs()).await;
        assert!(matches!(outcome, LoopOutcome::Failed { .. }));
        let stored = storage.get_task(&task.task_id).await.unwrap();
        assert_eq!(stored.error_message.as_deref(), Some(SESSION_EXPIRED_MESSAGE));
    }

    #[tokio::test]
    async fn cancellation_before_any_poll_saves_nothing() {
        let storage: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let mock = Arc::new(MockProviderClient::new());
        let provider: Arc<dyn ProviderClient> = Arc::clone(&mock) as Arc<dyn ProviderClient>;
        let task = running_task(&storage, "h4").await;

        let cancellation = CancellationHandle::new();
        cancellation.cancel();
        let outcome = run_poll_loop(&storage, &provider, &config(), &task.task_id, &cancellation, &default_cancel_prefs()).await;

        assert_eq!(outcome, LoopOutcome::Cancelled { partial_saved: false });
        let stored = storage.get_task(&task.task_id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancellation_mid_poll_preserves_observed_sources() {
        let storage: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let mock = Arc::new(MockProviderClient::new());
        let provider: Arc<dyn ProviderClient> = Arc::clone(&mock) as Arc<dyn ProviderClient>;
        let task = running_task(&storage, "h5").await;
        mock.script_poll(
            "h5",
            Ok(PollOutcome {
                state: Some(ProviderState::Running),
                progress: Some(65),
                current_action: Some("reading sources".to_string()),
                tokens: None,
                result: Some(deepresearch_provider::ProviderResult {
                    report: String::new(),
                    sources: vec![source("a"), source("b"), source("c")],
                }),
                error_message: None,
            }),
        );

        let cancellation = CancellationHandle::new();
        let storage_clone = Arc::clone(&storage);
        let provider_clone = Arc::clone(&provider);
        let task_id = task.task_id.clone();
        let cfg = config();
        let cancel_for_task = cancellation.clone();

        let handle = tokio::spawn(async move {
            run_poll_loop(&storage_clone, &provider_clone, &cfg, &task_id, &cancel_for_task, &default_cancel_prefs()).await
        });

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        cancellation.cancel();
        let outcome = handle.await.unwrap();

        assert!(matches!(outcome, LoopOutcome::Cancelled { partial_saved: true }));
        let result = storage.get_result(&task.task_id).await.unwrap();
        assert_eq!(result.sources.len(), 3);
        assert!(result.metadata.duration_minutes >= 0.0);
    }

    fn source(tag: &str) -> Source {
        Source {
            title: format!("source {tag}"),
            url: format!("https://example.com/{tag}"),
            snippet: "an excerpt".to_string(),
            relevance_score: 0.8,
        }
    }

}
