//! Thin wiring binary for manual exercise of the deep research orchestrator.
//! Reads the two environment inputs (a provider credential and a default
//! output directory), assembles a `SqliteStateStore` + provider client +
//! `DesktopNotifier` into a `ResearchEngine`, runs startup recovery, and
//! dispatches one of the six tool operations as a one-shot CLI subcommand.
//! Carries no lifecycle logic of its own — every decision happens inside
//! `deepresearch-engine` / `deepresearch-tools`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deepresearch_engine::{EngineConfig, ResearchEngine};
use deepresearch_notify::DesktopNotifier;
use deepresearch_provider::{HttpProviderClient, HttpProviderConfig, MockProviderClient, ProviderClient};
use deepresearch_storage::{SqliteStateStore, SqliteStateStoreConfig, StateStore};
use deepresearch_tools::{
    CancelArgs, EstimateArgs, GetArgs, ResearchTools, SaveArgs, StartArgs, StatusArgs, ToolsConfig,
};
use tracing::{info, warn};

const DATABASE_PATH_ENV: &str = "DEEPRESEARCH_DB_PATH";
const CREDENTIAL_ENV: &str = "DEEPRESEARCH_PROVIDER_CREDENTIAL";
const PROVIDER_URL_ENV: &str = "DEEPRESEARCH_PROVIDER_URL";
const OUTPUT_DIR_ENV: &str = "DEEPRESEARCH_OUTPUT_DIR";

#[derive(Parser)]
#[command(name = "deepresearch-server", about = "Manual exercise harness for the deep research orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new research task.
    Start {
        query: String,
        #[arg(long, default_value_t = true)]
        notify_on_done: bool,
        #[arg(long, default_value_t = 8)]
        max_wait_hours: u32,
        #[arg(long, default_value = "default")]
        model: String,
    },
    /// Check a task's progress.
    Status { task_id: String },
    /// Fetch a completed task's result.
    Get {
        task_id: String,
        #[arg(long, default_value_t = true)]
        include_sources: bool,
    },
    /// Cancel a running task.
    Cancel {
        task_id: String,
        #[arg(long, default_value_t = true)]
        save_partial: bool,
    },
    /// Estimate cost/duration for a query without submitting it.
    Estimate { query: String },
    /// Render a completed task's result to markdown.
    Save {
        task_id: String,
        #[arg(long)]
        output_dir: Option<String>,
        #[arg(long, default_value = "research")]
        filename_prefix: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let db_path = std::env::var(DATABASE_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("deep_research.db"));
    info!(path = %db_path.display(), "opening state store");
    let storage: Arc<dyn StateStore> = Arc::new(
        SqliteStateStore::with_config(SqliteStateStoreConfig {
            database_path: db_path,
            ..SqliteStateStoreConfig::default()
        })
        .await
        .context("failed to open state store")?,
    );

    let provider: Arc<dyn ProviderClient> = match (
        std::env::var(PROVIDER_URL_ENV),
        std::env::var(CREDENTIAL_ENV),
    ) {
        (Ok(base_url), Ok(credential)) => {
            info!(base_url = %base_url, "using http provider client");
            Arc::new(
                HttpProviderClient::new(HttpProviderConfig::new(base_url, credential))
                    .context("failed to build http provider client")?,
            )
        }
        _ => {
            warn!(
                "{PROVIDER_URL_ENV}/{CREDENTIAL_ENV} not set; falling back to an in-memory mock provider for this run"
            );
            Arc::new(MockProviderClient::new())
        }
    };

    let output_dir = std::env::var(OUTPUT_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./research_output"));

    let engine = Arc::new(ResearchEngine::new(
        Arc::clone(&storage),
        provider,
        Arc::new(DesktopNotifier::new()),
        EngineConfig::default(),
    ));

    let recovered = engine
        .recover_on_startup()
        .await
        .context("startup recovery failed")?;
    if recovered > 0 {
        info!(count = recovered, "re-attached in-flight tasks from a prior run");
    }

    let tools = ResearchTools::new(Arc::clone(&engine), ToolsConfig { default_output_dir: output_dir });

    let envelope_json = match cli.command {
        Command::Start { query, notify_on_done, max_wait_hours, model } => serde_json::to_value(
            tools
                .start(StartArgs { query, notify_on_done, max_wait_hours, model })
                .await,
        )?,
        Command::Status { task_id } => {
            serde_json::to_value(tools.status(StatusArgs { task_id }).await)?
        }
        Command::Get { task_id, include_sources } => {
            serde_json::to_value(tools.get(GetArgs { task_id, include_sources }).await)?
        }
        Command::Cancel { task_id, save_partial } => {
            serde_json::to_value(tools.cancel(CancelArgs { task_id, save_partial }).await)?
        }
        Command::Estimate { query } => {
            serde_json::to_value(tools.estimate(EstimateArgs { query }).await)?
        }
        Command::Save { task_id, output_dir, filename_prefix } => serde_json::to_value(
            tools
                .save(SaveArgs {
                    task_id,
                    output_dir,
                    filename_prefix,
                    include_metadata: true,
                    include_sources: true,
                })
                .await,
        )?,
    };

    println!("{}", serde_json::to_string_pretty(&envelope_json)?);
    Ok(())
}
