//! Response payload shapes for the six tool operations, wrapped by [`crate::envelope::Envelope`] before
//! being handed back to the caller.

use chrono::{DateTime, Utc};
use deepresearch_core::{Complexity, CostEstimate, ResearchResult, Source, TaskStatus};
use deepresearch_engine::{CancelOutcome, SaveOutcome, StartOutcome, StatusView};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SourceView {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub relevance_score: f64,
}

impl From<&Source> for SourceView {
    fn from(source: &Source) -> Self {
        Self {
            title: source.title.clone(),
            url: source.url.clone(),
            snippet: source.snippet.clone(),
            relevance_score: source.relevance_score,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetadataView {
    pub duration_minutes: f64,
    pub cost_usd: f64,
    pub mode: String,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultView {
    pub report: String,
    pub sources: Vec<SourceView>,
    pub metadata: MetadataView,
}

impl From<&ResearchResult> for ResultView {
    fn from(result: &ResearchResult) -> Self {
        Self {
            report: result.report.clone(),
            sources: result.sources.iter().map(SourceView::from).collect(),
            metadata: MetadataView {
                duration_minutes: result.metadata.duration_minutes,
                cost_usd: result.metadata.cost_usd,
                mode: match result.metadata.mode {
                    deepresearch_core::ResultMode::Sync => "sync".to_string(),
                    deepresearch_core::ResultMode::Async => "async".to_string(),
                },
                model: result.metadata.model.clone(),
                started_at: result.metadata.started_at,
                completed_at: result.metadata.completed_at,
            },
        }
    }
}

/// `start` result: a sum type serialized to one of two flat
/// shapes distinguished by `mode`/`status`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StartResult {
    Sync {
        mode: &'static str,
        status: &'static str,
        task_id: String,
        results: ResultView,
    },
    Async {
        mode: &'static str,
        status: &'static str,
        task_id: String,
    },
}

impl From<StartOutcome> for StartResult {
    fn from(outcome: StartOutcome) -> Self {
        match outcome {
            StartOutcome::Sync { task_id, result } => StartResult::Sync {
                mode: "sync",
                status: "completed",
                task_id,
                results: ResultView::from(&result),
            },
            StartOutcome::Async { task_id } => StartResult::Async {
                mode: "async",
                status: "running_async",
                task_id,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokensView {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResult {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub current_action: String,
    pub elapsed_minutes: f64,
    pub tokens: TokensView,
    pub cost_so_far: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_completion_minutes: Option<f64>,
}

impl From<StatusView> for StatusResult {
    fn from(view: StatusView) -> Self {
        Self {
            task_id: view.task_id,
            status: view.status,
            progress: view.progress,
            current_action: view.current_action,
            elapsed_minutes: view.elapsed_minutes,
            tokens: TokensView {
                input: view.tokens.input,
                output: view.tokens.output,
                total: view.tokens.total(),
            },
            cost_so_far: view.cost_so_far,
            estimated_completion_minutes: view.estimated_completion_minutes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GetResult {
    pub task_id: String,
    pub query: String,
    pub report: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceView>>,
    pub metadata: MetadataView,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResult {
    pub status: &'static str,
    pub partial_results_saved: bool,
    pub progress_at_cancellation: u8,
    pub cost_usd: f64,
}

impl From<CancelOutcome> for CancelResult {
    fn from(outcome: CancelOutcome) -> Self {
        Self {
            status: "cancelled",
            partial_results_saved: outcome.partial_results_saved,
            progress_at_cancellation: outcome.progress_at_cancellation,
            cost_usd: outcome.cost_usd,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RangeView {
    pub min: f64,
    pub max: f64,
    pub likely: f64,
}

impl From<deepresearch_core::Range> for RangeView {
    fn from(range: deepresearch_core::Range) -> Self {
        Self {
            min: range.min,
            max: range.max,
            likely: range.likely,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EstimateResult {
    pub complexity: Complexity,
    pub duration: RangeView,
    pub cost: RangeView,
    pub will_likely_go_async: bool,
    pub recommendation: String,
}

impl From<CostEstimate> for EstimateResult {
    fn from(estimate: CostEstimate) -> Self {
        Self {
            complexity: estimate.complexity,
            duration: estimate.duration_minutes.into(),
            cost: estimate.cost_usd.into(),
            will_likely_go_async: estimate.will_likely_go_async,
            recommendation: estimate.recommendation,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveResult {
    pub file_path: String,
    pub filename: String,
    pub file_size_kb: f64,
    pub created_at: DateTime<Utc>,
    pub sections_included: Vec<String>,
}

impl From<SaveOutcome> for SaveResult {
    fn from(outcome: SaveOutcome) -> Self {
        Self {
            file_path: outcome.file_path,
            filename: outcome.filename,
            file_size_kb: outcome.file_size_kb,
            created_at: outcome.created_at,
            sections_included: outcome.sections_included,
        }
    }
}
