//! On-disk layout for telemetry and evidence.
//!
//! ```text
//! <base>/                        (.runs under the workspace, or ENGINE_METRICS_DIR)
//!   events.jsonl                 append-only, all runs
//!   <run_id>/
//!     command.json
//!     signals.json
//!     assessment.json
//!     consensus.json             (if any)
//!     stages/<stage>.json
//!     worktree/                  ephemeral checkout for the run
//! ```

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

use crate::ids::RunId;

/// Environment variable overriding the telemetry base directory.
pub const METRICS_DIR_ENV: &str = "ENGINE_METRICS_DIR";

/// Directory name used under the workspace when no override is set.
pub const DEFAULT_RUNS_DIR: &str = ".runs";

/// Resolve the telemetry base directory for a workspace.
///
/// `ENGINE_METRICS_DIR` wins when set and non-empty; otherwise the base is
/// `<workspace>/.runs`.
#[must_use]
pub fn base_dir(workspace: &Utf8Path) -> Utf8PathBuf {
    match std::env::var(METRICS_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => Utf8PathBuf::from(dir),
        _ => workspace.join(DEFAULT_RUNS_DIR),
    }
}

/// Path of the shared append-only event log.
#[must_use]
pub fn events_path(base: &Utf8Path) -> Utf8PathBuf {
    base.join("events.jsonl")
}

/// Per-run evidence paths rooted at `<base>/<run_id>/`.
#[derive(Debug, Clone)]
pub struct RunLayout {
    run_dir: Utf8PathBuf,
}

impl RunLayout {
    #[must_use]
    pub fn new(base: &Utf8Path, run_id: &RunId) -> Self {
        Self {
            run_dir: base.join(run_id.as_str()),
        }
    }

    #[must_use]
    pub fn run_dir(&self) -> &Utf8Path {
        &self.run_dir
    }

    #[must_use]
    pub fn command_json(&self) -> Utf8PathBuf {
        self.run_dir.join("command.json")
    }

    #[must_use]
    pub fn signals_json(&self) -> Utf8PathBuf {
        self.run_dir.join("signals.json")
    }

    #[must_use]
    pub fn assessment_json(&self) -> Utf8PathBuf {
        self.run_dir.join("assessment.json")
    }

    #[must_use]
    pub fn consensus_json(&self) -> Utf8PathBuf {
        self.run_dir.join("consensus.json")
    }

    #[must_use]
    pub fn stages_dir(&self) -> Utf8PathBuf {
        self.run_dir.join("stages")
    }

    #[must_use]
    pub fn stage_json(&self, stage: &str) -> Utf8PathBuf {
        self.stages_dir().join(format!("{stage}.json"))
    }

    #[must_use]
    pub fn worktree_dir(&self) -> Utf8PathBuf {
        self.run_dir.join("worktree")
    }

    /// Create the run directory tree.
    pub fn ensure(&self) -> Result<()> {
        ensure_dir_all(&self.stages_dir())
    }
}

/// Create a directory and its parents, tolerating benign races.
pub fn ensure_dir_all(path: &Utf8Path) -> Result<()> {
    match fs::create_dir_all(path.as_std_path()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to create directory: {path}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_is_dot_runs_under_workspace() {
        // Avoid env mutation: only assert the non-override branch shape
        let ws = Utf8PathBuf::from("/tmp/project");
        if std::env::var(METRICS_DIR_ENV).is_err() {
            assert_eq!(base_dir(&ws), Utf8PathBuf::from("/tmp/project/.runs"));
        }
    }

    #[test]
    fn run_layout_paths() {
        let base = Utf8PathBuf::from("/tmp/.runs");
        let run_id = RunId::from_string("20260801T120000-abcd1234");
        let layout = RunLayout::new(&base, &run_id);

        assert_eq!(
            layout.command_json().as_str(),
            "/tmp/.runs/20260801T120000-abcd1234/command.json"
        );
        assert_eq!(
            layout.stage_json("security").as_str(),
            "/tmp/.runs/20260801T120000-abcd1234/stages/security.json"
        );
        assert!(layout.worktree_dir().as_str().ends_with("/worktree"));
    }

    #[test]
    fn ensure_creates_stage_tree() {
        let dir = tempfile::TempDir::new().unwrap();
        let base = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let layout = RunLayout::new(&base, &RunId::from_string("r1"));

        layout.ensure().unwrap();
        assert!(layout.stages_dir().as_std_path().is_dir());
        // Idempotent
        layout.ensure().unwrap();
    }
}
