//! # State Store
//!
//! Durable storage for research tasks and their terminal results. Two
//! backends share one [`StateStore`] trait: [`InMemoryStateStore`]
//! for tests and ephemeral deployments, [`SqliteStateStore`] for durability
//! across process restarts. Both are wrapped so transient contention errors
//! retry with backoff via [`retry::with_retry`]; structural errors propagate
//! immediately.
//!
//! Shaped on the `turul-mcp-task-storage` crate — same trait shape, same
//! SQLite migration and connect-options pattern — generalized from MCP's
//! `TaskRecord`/`TaskOutcome` to `deepresearch_core::{Task, ResearchResult}`.

pub mod error;
pub mod in_memory;
pub mod retry;
pub mod sqlite;
pub mod traits;

pub use error::StorageError;
pub use in_memory::InMemoryStateStore;
pub use retry::with_retry;
pub use sqlite::{SqliteStateStore, SqliteStateStoreConfig};
pub use traits::StateStore;
