//! # ProviderClient
//!
//! The external deep-research provider's contract, abstracted
//! to exactly two operations: `submit(query, model) -> handle` and
//! `poll(handle) -> {state, progress?, current_action?, tokens?, result?}`.
//! Shaped like `turul-mcp-client::transport::http::HttpTransport`
//! (`reqwest::Client` built once with a fixed timeout) and
//! `turul-mcp-client::error` (a dedicated transport-vs-server error split).

pub mod error;
pub mod http;
pub mod mock;

use async_trait::async_trait;
use deepresearch_core::{Source, TokenUsage};
use serde::{Deserialize, Serialize};

pub use error::ProviderError;
pub use http::{HttpProviderClient, HttpProviderConfig};
pub use mock::MockProviderClient;

/// Coarse state of a provider session, as returned by `poll`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    Running,
    Completed,
    Failed,
    Expired,
}

/// Returned by a successful `submit`. The handle is opaque to the engine —
/// it is only ever echoed back into subsequent `poll` calls and persisted
/// on the Task row.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub handle: String,
    pub initial_state: ProviderState,
}

/// The finished report content, present on a `poll` that returns
/// `ProviderState::Completed`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResult {
    pub report: String,
    pub sources: Vec<Source>,
}

/// One `poll` response. `completed` carries `result`, `failed` carries
/// `error_message`, `expired` carries neither.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PollOutcome {
    pub state: Option<ProviderState>,
    pub progress: Option<u8>,
    pub current_action: Option<String>,
    pub tokens: Option<TokenUsage>,
    pub result: Option<ProviderResult>,
    pub error_message: Option<String>,
}

impl PollOutcome {
    pub fn running(progress: u8, current_action: impl Into<String>) -> Self {
        Self {
            state: Some(ProviderState::Running),
            progress: Some(progress),
            current_action: Some(current_action.into()),
            ..Default::default()
        }
    }

    pub fn completed(result: ProviderResult, tokens: TokenUsage) -> Self {
        Self {
            state: Some(ProviderState::Completed),
            progress: Some(100),
            tokens: Some(tokens),
            result: Some(result),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: Some(ProviderState::Failed),
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn expired() -> Self {
        Self {
            state: Some(ProviderState::Expired),
            ..Default::default()
        }
    }

    pub fn state(&self) -> ProviderState {
        self.state.unwrap_or(ProviderState::Running)
    }
}

/// The deep-research provider's contract, abstracted to `submit`/`poll`.
/// Assumed safe to call concurrently; no pooling or rate limiting is
/// prescribed beyond the engine's own executor cap.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Submit a new research query. May be latent (seconds); the returned
    /// handle is usable for polling even if the session is not yet running.
    async fn submit(&self, query: &str, model: &str) -> Result<SubmitOutcome, ProviderError>;

    /// Idempotent status check for a previously submitted handle.
    async fn poll(&self, handle: &str) -> Result<PollOutcome, ProviderError>;
}
