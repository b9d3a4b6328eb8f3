//! Scriptable in-memory `ProviderClient`, used throughout
//! `deepresearch-engine`'s test suite. `turul-mcp-task-storage::parity_tests`
//! demonstrates the same idea this mock exists to enable: one shared
//! assertion suite run against a substitutable collaborator.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::{PollOutcome, ProviderClient, ProviderState, SubmitOutcome};

#[derive(Default)]
struct MockState {
    next_handle: u64,
    submit_script: VecDeque<Result<SubmitOutcome, ProviderError>>,
    poll_scripts: HashMap<String, VecDeque<Result<PollOutcome, ProviderError>>>,
    submitted: Vec<(String, String)>,
}

/// Builder-style scriptable mock. Queue responses with [`Self::script_submit`]
/// and [`Self::script_poll`]; `submit` and `poll` pop from the front of the
/// matching queue. A `submit` call with an empty script auto-generates a
/// handle in `ProviderState::Running`, so simple tests need not script it.
pub struct MockProviderClient {
    state: Mutex<MockState>,
}

impl Default for MockProviderClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProviderClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn script_submit(&self, outcome: Result<SubmitOutcome, ProviderError>) {
        self.state.lock().unwrap().submit_script.push_back(outcome);
    }

    /// Queue a poll response for `handle`, in order.
    pub fn script_poll(&self, handle: impl Into<String>, outcome: Result<PollOutcome, ProviderError>) {
        self.state
            .lock()
            .unwrap()
            .poll_scripts
            .entry(handle.into())
            .or_default()
            .push_back(outcome);
    }

    /// Every `(query, model)` pair passed to `submit`, in call order.
    pub fn submitted_queries(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().submitted.clone()
    }
}

#[async_trait]
impl ProviderClient for MockProviderClient {
    async fn submit(&self, query: &str, model: &str) -> Result<SubmitOutcome, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.submitted.push((query.to_string(), model.to_string()));

        if let Some(scripted) = state.submit_script.pop_front() {
            return scripted;
        }

        state.next_handle += 1;
        let handle = format!("mock-handle-{}", state.next_handle);
        Ok(SubmitOutcome {
            handle,
            initial_state: ProviderState::Running,
        })
    }

    async fn poll(&self, handle: &str) -> Result<PollOutcome, ProviderError> {
        let mut state = self.state.lock().unwrap();
        match state.poll_scripts.get_mut(handle).and_then(|q| q.pop_front()) {
            Some(scripted) => scripted,
            None => Err(ProviderError::Rejected(format!(
                "no scripted poll response remaining for handle {handle}"
            ))),
        }
    }
}
