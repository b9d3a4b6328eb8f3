//! Error type for provider adapter operations. Shaped like
//! `turul-mcp-client::error::McpClientError` — transport vs server-returned
//! failures, with an `is_retryable` helper the engine consults before
//! deciding whether a failed `submit`/`poll` call should itself be retried
//! at the call site (distinct from `deepresearch_storage`'s retry wrapper,
//! which only covers storage contention).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider transport error: {0}")]
    Transport(String),

    #[error("provider request timed out")]
    Timeout,

    #[error("provider returned malformed response: {0}")]
    MalformedResponse(String),

    #[error("provider rejected the request: {0}")]
    Rejected(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transport(_) | ProviderError::Timeout)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}
