//! `save_to_markdown`'s file-system side: path allocation, a free-space
//! pre-check, and an atomic write. Kept as its own module so
//! [`crate::ResearchEngine::save_to_markdown`] stays a thin orchestration
//! step — fetch task + result, delegate here, map the error.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use deepresearch_core::{ResearchResult, Task};
use deepresearch_template::{render, RenderOptions};

/// Filesystem failure from a save attempt. Kept distinct from
/// [`deepresearch_core::EngineError`] so this module has no dependency on
/// the engine crate's error taxonomy; `lib.rs` maps it at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum MarkdownError {
    #[error("{path}: {message}")]
    Io { path: String, message: String },
}

impl MarkdownError {
    fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into().display().to_string(),
            message: err.to_string(),
        }
    }
}

/// Result shape for the `save` tool.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    pub file_path: String,
    pub filename: String,
    pub file_size_kb: f64,
    pub created_at: DateTime<Utc>,
    pub sections_included: Vec<String>,
}

/// Build `out_dir/YYYY-MM/{prefix}_{task_id_prefix8}_{YYYYMMDD_HHMMSS}.md`
/// for `now`.
fn allocate_path(out_dir: &Path, prefix: &str, task_id: &str, now: DateTime<Utc>) -> PathBuf {
    let month_dir = now.format("%Y-%m").to_string();
    let task_prefix: String = task_id.chars().take(8).collect();
    let filename = format!(
        "{prefix}_{task_prefix}_{}.md",
        now.format("%Y%m%d_%H%M%S")
    );
    out_dir.join(month_dir).join(filename)
}

/// Available bytes on the filesystem backing `path`'s nearest existing
/// ancestor, found via `sysinfo`'s disk list matched by longest mount-point
/// prefix.
fn available_space_for(path: &Path) -> Option<u64> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let mut probe = path.to_path_buf();
    loop {
        if let Some(found) = disks
            .iter()
            .filter(|disk| probe.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
        {
            return Some(found.available_space());
        }
        if !probe.pop() {
            return None;
        }
    }
}

/// Perform the save: render, pre-check free space, create directories,
/// write atomically (temp file + rename).
pub fn save_to_markdown(
    task: &Task,
    result: &ResearchResult,
    out_dir: &Path,
    prefix: &str,
    include_metadata: bool,
    include_sources: bool,
    min_free_space_bytes: u64,
) -> Result<SaveOutcome, MarkdownError> {
    let now = Utc::now();
    let path = allocate_path(out_dir, prefix, &task.task_id, now);

    let body = render(
        task,
        result,
        RenderOptions {
            include_metadata,
            include_sources,
        },
    );

    if let Some(available) = available_space_for(out_dir) {
        let required = (body.len() as u64).max(min_free_space_bytes);
        if available < required {
            return Err(MarkdownError::Io {
                path: out_dir.display().to_string(),
                message: format!(
                    "insufficient free space: {available} bytes available, {required} required"
                ),
            });
        }
    }

    let parent = path.parent().expect("allocate_path always yields a parent");
    std::fs::create_dir_all(parent).map_err(|err| MarkdownError::io(parent, err))?;

    let temp_path = parent.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
    std::fs::write(&temp_path, body.as_bytes()).map_err(|err| MarkdownError::io(&temp_path, err))?;
    std::fs::rename(&temp_path, &path).map_err(|err| MarkdownError::io(&path, err))?;

    let mut sections_included = vec!["report".to_string()];
    if include_sources && !result.sources.is_empty() {
        sections_included.push("sources".to_string());
    }
    if include_metadata {
        sections_included.push("metadata".to_string());
    }

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(SaveOutcome {
        file_path: path.display().to_string(),
        filename,
        file_size_kb: body.len() as f64 / 1024.0,
        created_at: now,
        sections_included,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepresearch_core::{ResultMetadata, ResultMode, Source};
    use tempfile::tempdir;

    fn sample() -> (Task, ResearchResult) {
        let task = Task::new("what is rust?".to_string(), true, 8, "default".to_string());
        let result = ResearchResult {
            task_id: task.task_id.clone(),
            report: "Rust is a systems programming language.".to_string(),
            sources: vec![Source {
                title: "The Rust Book".to_string(),
                url: "https://doc.rust-lang.org/book/".to_string(),
                snippet: "An introduction to Rust.".to_string(),
                relevance_score: 0.95,
            }],
            metadata: ResultMetadata {
                duration_minutes: 2.5,
                cost_usd: 0.05,
                mode: ResultMode::Sync,
                model: "default".to_string(),
                started_at: Utc::now(),
                completed_at: Utc::now(),
            },
            created_at: Utc::now(),
        };
        (task, result)
    }

    #[test]
    fn writes_file_under_year_month_directory() {
        let dir = tempdir().unwrap();
        let (task, result) = sample();
        let outcome = save_to_markdown(&task, &result, dir.path(), "research", true, true, 0).unwrap();

        assert!(Path::new(&outcome.file_path).exists());
        let expected_month = Utc::now().format("%Y-%m").to_string();
        assert!(outcome.file_path.contains(&expected_month));
        assert!(outcome.filename.starts_with("research_"));
        assert!(outcome.sections_included.contains(&"sources".to_string()));
        assert!(outcome.sections_included.contains(&"metadata".to_string()));
    }

    #[test]
    fn omits_sections_when_excluded() {
        let dir = tempdir().unwrap();
        let (task, result) = sample();
        let outcome = save_to_markdown(&task, &result, dir.path(), "research", false, false, 0).unwrap();
        assert_eq!(outcome.sections_included, vec!["report".to_string()]);
    }

    #[test]
    fn insufficient_free_space_is_rejected() {
        let dir = tempdir().unwrap();
        let (task, result) = sample();
        let err = save_to_markdown(
            &task,
            &result,
            dir.path(),
            "research",
            true,
            true,
            u64::MAX,
        )
        .unwrap_err();
        assert!(matches!(err, MarkdownError::Io { .. }));
    }
}
