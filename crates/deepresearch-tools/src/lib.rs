//! # Tool Surface
//!
//! Six thin request handlers exposing the orchestrator's external
//! operations: `start`, `status`, `get`, `cancel`, `estimate`,
//! `save`. Each validates argument shapes, delegates to [`ResearchEngine`],
//! and maps the result into the uniform [`Envelope`] — never containing
//! lifecycle logic of its own, matching `McpTool::call`'s contract
//! ("validates... delegates... never contains lifecycle logic itself")
//! taken as the behavioral contract for each method here, without importing
//! the `McpTool`/`ToolDefinition` protocol scaffolding that contract is
//! otherwise attached to.

pub mod args;
pub mod envelope;
pub mod results;

use std::path::PathBuf;

use deepresearch_engine::ResearchEngine;
use tracing::instrument;

pub use args::{CancelArgs, EstimateArgs, GetArgs, SaveArgs, StartArgs, StatusArgs};
pub use envelope::Envelope;
pub use results::{CancelResult, EstimateResult, GetResult, SaveResult, StartResult, StatusResult};

use deepresearch_core::EngineError;
use results::{MetadataView, SourceView};

/// Tunables the tool surface itself owns (as opposed to the engine's
/// lifecycle constants) — currently just where `save` writes files when the
/// caller doesn't specify `output_dir`.
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub default_output_dir: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            default_output_dir: PathBuf::from("./research_output"),
        }
    }
}

/// The six-operation tool surface. Holds only what it needs to validate and
/// delegate — an `Arc<ResearchEngine>` and its own small config — no state
/// of its own.
pub struct ResearchTools {
    engine: std::sync::Arc<ResearchEngine>,
    config: ToolsConfig,
}

impl ResearchTools {
    pub fn new(engine: std::sync::Arc<ResearchEngine>, config: ToolsConfig) -> Self {
        Self { engine, config }
    }

    /// `start`.
    #[instrument(skip(self, args), fields(query_len = args.query.chars().count()))]
    pub async fn start(&self, args: StartArgs) -> Envelope<StartResult> {
        if args.query.trim().is_empty() {
            return Envelope::invalid_input("query", "must not be blank");
        }

        match self
            .engine
            .start(args.query, args.notify_on_done, args.max_wait_hours, args.model)
            .await
        {
            Ok(outcome) => Envelope::ok(StartResult::from(outcome)),
            Err(err) => Envelope::from_engine_error(err),
        }
    }

    /// `status`.
    #[instrument(skip(self, args), fields(task_id = %args.task_id))]
    pub async fn status(&self, args: StatusArgs) -> Envelope<StatusResult> {
        if args.task_id.trim().is_empty() {
            return Envelope::invalid_input("task_id", "must not be blank");
        }
        match self.engine.status(&args.task_id).await {
            Ok(view) => Envelope::ok(StatusResult::from(view)),
            Err(err) => Envelope::from_engine_error(err),
        }
    }

    /// `get`.
    #[instrument(skip(self, args), fields(task_id = %args.task_id))]
    pub async fn get(&self, args: GetArgs) -> Envelope<GetResult> {
        if args.task_id.trim().is_empty() {
            return Envelope::invalid_input("task_id", "must not be blank");
        }
        match self.engine.get(&args.task_id).await {
            Ok((task, result)) => Envelope::ok(GetResult {
                task_id: task.task_id,
                query: task.query,
                report: result.report.clone(),
                sources: args
                    .include_sources
                    .then(|| result.sources.iter().map(SourceView::from).collect()),
                metadata: MetadataView {
                    duration_minutes: result.metadata.duration_minutes,
                    cost_usd: result.metadata.cost_usd,
                    mode: match result.metadata.mode {
                        deepresearch_core::ResultMode::Sync => "sync".to_string(),
                        deepresearch_core::ResultMode::Async => "async".to_string(),
                    },
                    model: result.metadata.model,
                    started_at: result.metadata.started_at,
                    completed_at: result.metadata.completed_at,
                },
            }),
            Err(err) => Envelope::from_engine_error(err),
        }
    }

    /// `cancel`.
    #[instrument(skip(self, args), fields(task_id = %args.task_id))]
    pub async fn cancel(&self, args: CancelArgs) -> Envelope<CancelResult> {
        if args.task_id.trim().is_empty() {
            return Envelope::invalid_input("task_id", "must not be blank");
        }
        match self.engine.cancel(&args.task_id, args.save_partial).await {
            Ok(outcome) => Envelope::ok(CancelResult::from(outcome)),
            Err(err) => Envelope::from_engine_error(err),
        }
    }

    /// `estimate`.
    #[instrument(skip(self, args))]
    pub async fn estimate(&self, args: EstimateArgs) -> Envelope<EstimateResult> {
        if args.query.trim().is_empty() {
            return Envelope::invalid_input("query", "must not be blank");
        }
        match self.engine.estimate(&args.query) {
            Ok(estimate) => Envelope::ok(EstimateResult::from(estimate)),
            Err(err) => Envelope::from_engine_error(err),
        }
    }

    /// `save`.
    #[instrument(skip(self, args), fields(task_id = %args.task_id))]
    pub async fn save(&self, args: SaveArgs) -> Envelope<SaveResult> {
        if args.task_id.trim().is_empty() {
            return Envelope::invalid_input("task_id", "must not be blank");
        }
        let out_dir = args
            .output_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| self.config.default_output_dir.clone());

        match self
            .engine
            .save_to_markdown(
                &args.task_id,
                &out_dir,
                &args.filename_prefix,
                args.include_metadata,
                args.include_sources,
            )
            .await
        {
            Ok(outcome) => Envelope::ok(SaveResult::from(outcome)),
            Err(err) => Envelope::from_engine_error(err),
        }
    }
}

/// Never surfaced directly — kept so `EngineError` stays a visible type at
/// this crate's boundary for downstream callers matching on `Envelope`
/// fields against the error taxonomy.
pub type ToolResult<T> = Result<T, EngineError>;
