use serde::{Deserialize, Serialize};

/// Complexity band assigned to a query by the cost estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
    pub likely: f64,
}

/// Computed (never persisted) estimate of how long and how much a query will
/// cost to research.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub complexity: Complexity,
    pub duration_minutes: Range,
    pub cost_usd: Range,
    pub will_likely_go_async: bool,
    pub recommendation: String,
}
