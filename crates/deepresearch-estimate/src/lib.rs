//! # Cost Estimator
//!
//! Pure, deterministic, I/O-free classification of a research query into a
//! complexity band with duration/cost ranges. This module has no direct
//! analog elsewhere in the workspace's dependencies, but follows the same
//! convention seen in `turul-mcp-protocol` of keeping pure data-classifying
//! crates free of `async`/IO dependencies.

use deepresearch_core::{Complexity, CostEstimate, Range};

/// Keywords that raise a query's apparent research breadth (surveys,
/// comparisons, multi-region asks). Not exhaustive by design — the estimator
/// is a heuristic, not a classifier that needs training data.
const DOMAIN_MARKERS: &[&str] = &[
    "compare",
    "comparison",
    "analysis",
    "survey",
    "report",
    "implications",
    "regulation",
    "regulations",
    "across",
    "various",
    "multiple",
    "comprehensive",
    "trends",
    "developments",
    "cross-border",
    "global",
    "worldwide",
    "historical",
    "evolution",
    "landscape",
];

/// Configuration for the estimator — currently just the sync budget it
/// compares `likely_minutes` against. Kept as a tiny config struct rather
/// than a bare parameter so the engine and the estimator always agree on one
/// source of truth.
#[derive(Debug, Clone, Copy)]
pub struct EstimatorConfig {
    pub sync_budget_seconds: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            sync_budget_seconds: 30,
        }
    }
}

/// Duration and cost bands per complexity class — fixed constants, not
/// derived from `score`.
fn bands(complexity: Complexity) -> (Range, Range) {
    match complexity {
        Complexity::Simple => (
            Range { min: 0.1, max: 0.5, likely: 0.3 },
            Range { min: 0.01, max: 0.05, likely: 0.02 },
        ),
        Complexity::Medium => (
            Range { min: 2.0, max: 10.0, likely: 5.0 },
            Range { min: 0.10, max: 0.50, likely: 0.25 },
        ),
        Complexity::Complex => (
            Range { min: 15.0, max: 45.0, likely: 25.0 },
            Range { min: 0.50, max: 2.00, likely: 1.00 },
        ),
    }
}

/// Score a query's apparent complexity. Referentially transparent: same
/// input always yields the same output.
fn score(query: &str) -> f64 {
    let lower = query.to_lowercase();
    let length_component = query.chars().count() as f64 / 50.0;

    let marker_component = DOMAIN_MARKERS
        .iter()
        .filter(|marker| lower.contains(*marker))
        .count() as f64;

    let comma_component = lower.matches(',').count() as f64;
    let conjunction_component = lower.split_whitespace().filter(|w| *w == "and").count() as f64;

    length_component + marker_component + comma_component + conjunction_component
}

fn classify(score: f64) -> Complexity {
    if score < 3.0 {
        Complexity::Simple
    } else if score < 8.0 {
        Complexity::Medium
    } else {
        Complexity::Complex
    }
}

fn recommendation(complexity: Complexity, will_go_async: bool) -> String {
    match (complexity, will_go_async) {
        (Complexity::Simple, _) => {
            "Likely to complete within the synchronous window; expect an immediate report.".to_string()
        }
        (Complexity::Medium, _) => {
            "Expect a short wait; the task will likely hand off to background processing.".to_string()
        }
        (Complexity::Complex, true) => {
            "Broad, multi-source query; plan to poll for completion rather than wait synchronously.".to_string()
        }
        (Complexity::Complex, false) => {
            "Broad query but within budget; should complete synchronously.".to_string()
        }
    }
}

/// Estimate duration and cost for a query, using the default
/// [`EstimatorConfig`]. See [`estimate_with_config`] to override the sync
/// budget.
pub fn estimate(query: &str) -> CostEstimate {
    estimate_with_config(query, EstimatorConfig::default())
}

/// Estimate duration and cost for a query under an explicit config.
pub fn estimate_with_config(query: &str, config: EstimatorConfig) -> CostEstimate {
    let complexity = classify(score(query));
    let (duration_minutes, cost_usd) = bands(complexity);
    let sync_budget_minutes = config.sync_budget_seconds as f64 / 60.0;
    let will_likely_go_async = duration_minutes.likely > sync_budget_minutes;

    CostEstimate {
        complexity,
        duration_minutes,
        cost_usd,
        will_likely_go_async,
        recommendation: recommendation(complexity, will_likely_go_async),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_query_stays_sync() {
        let est = estimate("price of bitcoin right now?");
        assert_eq!(est.complexity, Complexity::Simple);
        assert!(!est.will_likely_go_async);
        assert!(est.duration_minutes.likely <= 30.0 / 60.0);
    }

    #[test]
    fn broad_comparison_query_goes_complex_and_async() {
        let est = estimate(
            "Compare AI regulation across US, EU, China, and Japan including 2025 developments and cross-border implications",
        );
        assert_eq!(est.complexity, Complexity::Complex);
        assert!(est.will_likely_go_async);
        assert!(est.duration_minutes.likely >= 20.0);
    }

    #[test]
    fn estimate_is_referentially_transparent() {
        let query = "Survey recent advances in quantum error correction";
        assert_eq!(estimate(query), estimate(query));
    }

    #[test]
    fn likely_within_min_max_for_every_band() {
        for complexity in [Complexity::Simple, Complexity::Medium, Complexity::Complex] {
            let (duration, cost) = bands(complexity);
            assert!(duration.likely >= duration.min && duration.likely <= duration.max);
            assert!(cost.likely >= cost.min && cost.likely <= cost.max);
        }
    }

    #[test]
    fn bands_are_totally_ordered_across_classes() {
        let (simple, _) = bands(Complexity::Simple);
        let (medium, _) = bands(Complexity::Medium);
        let (complex, _) = bands(Complexity::Complex);
        assert!(simple.max <= medium.min);
        assert!(medium.max <= complex.min);
    }
}
