//! Request argument shapes for the six tool operations. Each struct is the
//! `#[derive(Deserialize)]` args type the corresponding `ResearchTools`
//! method accepts, matching the per-tool input-struct convention
//! (`StoreValueTool`, `GetValueTool`, ...) without the derive-macro/schema
//! machinery those tools layer on top — that machinery is the excluded
//! protocol layer, not the args shape itself.

use serde::Deserialize;

fn default_notify_on_done() -> bool {
    true
}

fn default_max_wait_hours() -> u32 {
    8
}

fn default_model() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

fn default_filename_prefix() -> String {
    "research".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartArgs {
    pub query: String,
    #[serde(default = "default_notify_on_done")]
    pub notify_on_done: bool,
    #[serde(default = "default_max_wait_hours")]
    pub max_wait_hours: u32,
    #[serde(default = "default_model")]
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusArgs {
    pub task_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetArgs {
    pub task_id: String,
    #[serde(default = "default_true")]
    pub include_sources: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelArgs {
    pub task_id: String,
    #[serde(default = "default_true")]
    pub save_partial: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EstimateArgs {
    pub query: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveArgs {
    pub task_id: String,
    pub output_dir: Option<String>,
    #[serde(default = "default_filename_prefix")]
    pub filename_prefix: String,
    #[serde(default = "default_true")]
    pub include_metadata: bool,
    #[serde(default = "default_true")]
    pub include_sources: bool,
}
