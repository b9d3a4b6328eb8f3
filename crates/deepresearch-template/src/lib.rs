//! # Template Renderer
//!
//! Deterministic rendering of a [`ResearchResult`] into markdown.
//! No templating-engine dependency: a fixed template with typed holes, filled
//! in by hand, kept as a pure function with a fixed schema rather than
//! re-exporting a templating engine's features.

use deepresearch_core::{ResearchResult, Task};

/// Version stamp written into the output footer. Bump whenever the fixed
/// template's shape changes.
pub const TEMPLATE_VERSION: &str = "1.0";

/// Section toggles for [`render`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    pub include_metadata: bool,
    pub include_sources: bool,
}

/// Render a result (plus its owning task's query) to markdown.
///
/// Pure function of its inputs: the same `(task, result, options)` always
/// produces byte-identical output.
pub fn render(task: &Task, result: &ResearchResult, options: RenderOptions) -> String {
    let mut out = String::new();

    out.push_str(&format!("# Research Report: {}\n\n", task.query));
    out.push_str(&result.report);
    if !result.report.ends_with('\n') {
        out.push('\n');
    }
    out.push('\n');

    if options.include_sources && !result.sources.is_empty() {
        out.push_str("## Sources\n\n");
        for (i, source) in result.sources.iter().enumerate() {
            out.push_str(&format!(
                "{}. [{}]({}) — relevance {:.2}\n   {}\n",
                i + 1,
                source.title,
                source.url,
                source.relevance_score,
                source.snippet,
            ));
        }
        out.push('\n');
    }

    if options.include_metadata {
        out.push_str("## Metadata\n\n");
        out.push_str(&format!("- Task ID: `{}`\n", task.task_id));
        out.push_str(&format!("- Mode: {:?}\n", result.metadata.mode));
        out.push_str(&format!("- Model: {}\n", result.metadata.model));
        out.push_str(&format!(
            "- Duration: {:.1} minutes\n",
            result.metadata.duration_minutes
        ));
        out.push_str(&format!("- Cost: ${:.4}\n", result.metadata.cost_usd));
        out.push_str(&format!(
            "- Started: {}\n",
            result.metadata.started_at.to_rfc3339()
        ));
        out.push_str(&format!(
            "- Completed: {}\n",
            result.metadata.completed_at.to_rfc3339()
        ));
        out.push('\n');
    }

    out.push_str(&format!("---\n*Generated by deep-research-orchestrator template v{}*\n", TEMPLATE_VERSION));

    out
}
