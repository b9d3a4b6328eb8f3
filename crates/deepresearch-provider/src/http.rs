//! `reqwest`-backed adapter. Grounded on `turul-mcp-client::transport::http`
//! (client built once with a fixed timeout, endpoint parsed and validated
//! up front) — generalized from an MCP JSON-RPC transport to the plain
//! submit/poll REST contract a deep-research provider exposes.

use std::time::Duration;

use async_trait::async_trait;
use deepresearch_core::{Source, TokenUsage};
use serde::Deserialize;
use url::Url;

use crate::error::ProviderError;
use crate::{PollOutcome, ProviderClient, ProviderResult, ProviderState, SubmitOutcome};

#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    pub base_url: String,
    /// The provider credential. Never logged — omitted from every `tracing` field and
    /// `Debug` would leak it, so this type does not derive `Debug` itself.
    pub credential: String,
    pub request_timeout: Duration,
}

impl HttpProviderConfig {
    pub fn new(base_url: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            credential: credential.into(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct HttpProviderClient {
    client: reqwest::Client,
    base_url: Url,
    credential: String,
}

impl HttpProviderClient {
    pub fn new(config: HttpProviderConfig) -> Result<Self, ProviderError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ProviderError::Transport(format!("invalid base url: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            credential: config.credential,
        })
    }

    fn url(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::Transport(format!("invalid request path {path}: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponseBody {
    handle: String,
    initial_state: WireState,
}

#[derive(Debug, Deserialize)]
struct PollResponseBody {
    state: WireState,
    progress: Option<u8>,
    current_action: Option<String>,
    tokens_in: Option<u64>,
    tokens_out: Option<u64>,
    report: Option<String>,
    sources: Option<Vec<WireSource>>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WireState {
    Running,
    Completed,
    Failed,
    Expired,
}

#[derive(Debug, Deserialize)]
struct WireSource {
    title: String,
    url: String,
    snippet: String,
    relevance_score: f64,
}

impl From<WireState> for ProviderState {
    fn from(value: WireState) -> Self {
        match value {
            WireState::Running => ProviderState::Running,
            WireState::Completed => ProviderState::Completed,
            WireState::Failed => ProviderState::Failed,
            WireState::Expired => ProviderState::Expired,
        }
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn submit(&self, query: &str, model: &str) -> Result<SubmitOutcome, ProviderError> {
        let url = self.url("submit")?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.credential)
            .json(&serde_json::json!({ "query": query, "model": model }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::Rejected(format!(
                "submit returned status {}",
                response.status()
            )));
        }

        let body: SubmitResponseBody = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        Ok(SubmitOutcome {
            handle: body.handle,
            initial_state: body.initial_state.into(),
        })
    }

    async fn poll(&self, handle: &str) -> Result<PollOutcome, ProviderError> {
        let url = self.url(&format!("poll/{handle}"))?;
        let response = self.client.get(url).bearer_auth(&self.credential).send().await?;

        if !response.status().is_success() {
            return Err(ProviderError::Rejected(format!(
                "poll returned status {}",
                response.status()
            )));
        }

        let body: PollResponseBody = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let tokens = match (body.tokens_in, body.tokens_out) {
            (Some(input), Some(output)) => Some(TokenUsage { input, output }),
            _ => None,
        };

        let result = match (body.report, body.sources) {
            (Some(report), Some(sources)) => Some(ProviderResult {
                report,
                sources: sources
                    .into_iter()
                    .map(|s| Source {
                        title: s.title,
                        url: s.url,
                        snippet: s.snippet,
                        relevance_score: s.relevance_score,
                    })
                    .collect(),
            }),
            _ => None,
        };

        Ok(PollOutcome {
            state: Some(body.state.into()),
            progress: body.progress,
            current_action: body.current_action,
            tokens,
            result,
            error_message: body.error_message,
        })
    }
}
