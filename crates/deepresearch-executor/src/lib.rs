//! # Background Executor
//!
//! Owns and tracks in-process background work units keyed by `task_id`.
//! The cooperative-cancellation primitive is shaped directly on
//! `turul-mcp-server::cancellation::CancellationHandle` (same
//! `tokio::sync::watch`-based handle, `cancel()` idempotent, `cancelled()`
//! async wait) and the tracking map shape on
//! `turul-mcp-server::task::tokio_executor::TokioTaskExecutor`. The
//! `Semaphore`-bounded capacity cap and the replace-and-cancel insert in
//! `start()` are this crate's own additions: `TokioTaskExecutor` has no
//! concurrency cap (unbounded `tokio::spawn` — MCP tool calls are
//! short-lived) and its `start_task` just overwrites any existing entry for
//! the same key without cancelling it. Research polling loops can run for
//! hours, so a cap is load-bearing, and a resubmission for the same
//! `task_id` must not leave the displaced unit running.

pub mod cancellation;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{watch, RwLock, Semaphore};
use tracing::debug;

pub use cancellation::CancellationHandle;

/// A long-running, cancellation-aware unit of work. Takes its own
/// cancellation handle (checked at poll boundaries,) and runs
/// until it reaches a terminal outcome or observes cancellation; it has no
/// return value because it is expected to persist its own progress via the
/// state store as a side effect.
pub type PollingUnit =
    Box<dyn FnOnce(CancellationHandle) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// How `start` behaves once [`ExecutorConfig::max_concurrent`] running units
/// are already active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityPolicy {
    /// Accept the submission; it runs once a permit frees up.
    Queue,
    /// Reject the submission immediately with `CapacityExceeded`.
    Reject,
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    pub max_concurrent: usize,
    pub capacity_policy: CapacityPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            capacity_policy: CapacityPolicy::Queue,
        }
    }
}

/// Raised when a submission is rejected under [`CapacityPolicy::Reject`].
#[derive(Debug, thiserror::Error)]
#[error("background executor capacity exceeded (max_concurrent reached)")]
pub struct CapacityExceeded;

struct Entry {
    cancellation: CancellationHandle,
    join_handle: tokio::task::JoinHandle<()>,
    done_rx: watch::Receiver<bool>,
}

/// Owns the set of in-process background polling units.
pub struct BackgroundExecutor {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    semaphore: Arc<Semaphore>,
    config: ExecutorConfig,
}

impl BackgroundExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            config,
        }
    }

    /// Start a new unit for `task_id`. Replaces and cancels any prior unit
    /// for the same key.
    pub async fn start(&self, task_id: &str, work: PollingUnit) -> Result<(), CapacityExceeded> {
        self.cancel_and_remove(task_id).await;

        let permit = match self.config.capacity_policy {
            CapacityPolicy::Reject => {
                let permit = Arc::clone(&self.semaphore)
                    .try_acquire_owned()
                    .map_err(|_| CapacityExceeded)?;
                Some(permit)
            }
            CapacityPolicy::Queue => None,
        };

        let cancellation = CancellationHandle::new();
        let (done_tx, done_rx) = watch::channel(false);
        let entries = Arc::clone(&self.entries);
        let semaphore = Arc::clone(&self.semaphore);
        let task_id_owned = task_id.to_string();
        let cancellation_for_unit = cancellation.clone();

        let join_handle = tokio::spawn(async move {
            // Queue policy: acquire here so the caller's `start()` returns
            // immediately and the submission queues in the background.
            let _permit = match permit {
                Some(p) => Some(p),
                None => semaphore.acquire_owned().await.ok(),
            };

            work(cancellation_for_unit).await;

            entries.write().await.remove(&task_id_owned);
            let _ = done_tx.send(true);
            debug!(task_id = %task_id_owned, "background unit finished");
        });

        self.entries.write().await.insert(
            task_id.to_string(),
            Entry {
                cancellation,
                join_handle,
                done_rx,
            },
        );

        Ok(())
    }

    async fn cancel_and_remove(&self, task_id: &str) {
        if let Some(entry) = self.entries.write().await.remove(task_id) {
            entry.cancellation.cancel();
            entry.join_handle.abort();
        }
    }

    /// Request cooperative cancellation of the unit tracked for `task_id`.
    /// Returns `true` if a running unit was signaled.
    pub async fn cancel(&self, task_id: &str) -> bool {
        if let Some(entry) = self.entries.read().await.get(task_id) {
            entry.cancellation.cancel();
            true
        } else {
            false
        }
    }

    pub async fn is_running(&self, task_id: &str) -> bool {
        self.entries.read().await.contains_key(task_id)
    }

    pub async fn running_ids(&self) -> HashSet<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    /// Block until the unit tracked for `task_id` finishes (normally,
    /// exceptionally, or via cancellation). Returns immediately if no unit
    /// is tracked for that id.
    pub async fn await_done(&self, task_id: &str) {
        let mut rx = {
            let entries = self.entries.read().await;
            match entries.get(task_id) {
                Some(entry) => entry.done_rx.clone(),
                None => return,
            }
        };
        let _ = rx.changed().await;
    }
}
