//! Per-run git worktree sandboxes.
//!
//! A command that may mutate files gets an isolated checkout: work happens
//! on a run-specific branch in a separate directory, validation runs
//! against it, and the result is either fast-forward merged back or
//! discarded. A worktree is closed exactly once per run; cross-run reuse
//! is forbidden by id allocation, and a discard that fails leaves the
//! record marked orphan for later garbage collection.

use std::process::Output;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use superclaude_util::error::WorktreeError;
use superclaude_util::ids::RunId;
use superclaude_validation::{Pipeline, PipelineReport, StageContext};

/// Lifecycle of a worktree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorktreeStatus {
    Open,
    Validated,
    Merged,
    Discarded,
    /// Discard failed; the directory is left for later cleanup.
    Orphan,
}

/// One run's isolated checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worktree {
    pub id: String,
    pub root_path: Utf8PathBuf,
    pub base_ref: String,
    pub branch: String,
    pub status: WorktreeStatus,
}

impl Worktree {
    fn ensure_open(&self) -> Result<(), WorktreeError> {
        match self.status {
            WorktreeStatus::Open | WorktreeStatus::Validated => Ok(()),
            _ => Err(WorktreeError::AlreadyClosed {
                id: self.id.clone(),
            }),
        }
    }
}

/// One changed file in a patch summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub additions: u64,
    pub deletions: u64,
}

/// Deterministic summary of a worktree's changes against its base.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatchSummary {
    pub files: Vec<FileChange>,
    pub additions: u64,
    pub deletions: u64,
}

impl PatchSummary {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Count of changed files whose path looks like test code.
    #[must_use]
    pub fn tests_changed(&self) -> u64 {
        self.files
            .iter()
            .filter(|f| {
                f.path.contains("test") || f.path.contains("spec") || f.path.starts_with("tests/")
            })
            .count() as u64
    }
}

/// Outcome of a merge attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MergeOutcome {
    Merged,
    /// Non-fast-forward; nothing was merged and the worktree is preserved
    /// for inspection.
    Conflict { detail: String },
}

/// Opens, inspects, merges, and discards worktrees for a repository.
pub struct WorktreeManager {
    repo_root: Utf8PathBuf,
    git_deadline: Duration,
}

impl WorktreeManager {
    /// Create a manager for the repository at `repo_root`.
    ///
    /// # Errors
    ///
    /// [`WorktreeError::GitMissing`] when no git binary is on PATH.
    pub fn new(repo_root: impl Into<Utf8PathBuf>) -> Result<Self, WorktreeError> {
        which::which("git").map_err(|_| WorktreeError::GitMissing)?;
        Ok(Self {
            repo_root: repo_root.into(),
            git_deadline: Duration::from_secs(60),
        })
    }

    /// Whether a directory is inside a tracked git repository.
    pub async fn is_repository(path: &Utf8Path) -> bool {
        if which::which("git").is_err() {
            return false;
        }
        run_git_in(path, &["rev-parse", "--is-inside-work-tree"], Duration::from_secs(10))
            .await
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    /// Open an isolated checkout for a run.
    ///
    /// Creates branch `wt-<run_id>` at `base_ref`, checked out under
    /// `target_dir`. Each run id yields a distinct branch and directory,
    /// which is what forbids cross-run sharing.
    pub async fn open(
        &self,
        run_id: &RunId,
        base_ref: &str,
        target_dir: &Utf8Path,
    ) -> Result<Worktree, WorktreeError> {
        let branch = format!("wt-{run_id}");
        let output = self
            .git(&[
                "worktree",
                "add",
                "-b",
                branch.as_str(),
                target_dir.as_str(),
                base_ref,
            ])
            .await?;

        if !output.status.success() {
            return Err(WorktreeError::OpenFailed {
                reason: stderr_of(&output),
            });
        }

        info!(run_id = %run_id, branch = %branch, dir = %target_dir, "worktree opened");
        Ok(Worktree {
            id: format!("wt-{run_id}"),
            root_path: target_dir.to_owned(),
            base_ref: base_ref.to_string(),
            branch,
            status: WorktreeStatus::Open,
        })
    }

    /// Deterministic summary of changes (committed and not) against the
    /// base ref, sorted by path.
    pub async fn diff(&self, worktree: &Worktree) -> Result<PatchSummary, WorktreeError> {
        worktree.ensure_open()?;

        // Stage everything so numstat sees new files too; the index of a
        // throwaway worktree is ours to use
        let _ = run_git_in(&worktree.root_path, &["add", "-A", "-N"], self.git_deadline).await?;

        let output = run_git_in(
            &worktree.root_path,
            &["diff", "--numstat", &worktree.base_ref],
            self.git_deadline,
        )
        .await?;

        if !output.status.success() {
            return Err(WorktreeError::GitFailed {
                operation: "diff".to_string(),
                stderr: stderr_of(&output),
            });
        }

        let mut files: Vec<FileChange> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(parse_numstat_line)
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let additions = files.iter().map(|f| f.additions).sum();
        let deletions = files.iter().map(|f| f.deletions).sum();
        debug!(files = files.len(), additions, deletions, "worktree diff summarized");

        Ok(PatchSummary {
            files,
            additions,
            deletions,
        })
    }

    /// Run the validation pipeline against the worktree and mark it
    /// validated when every stage passes.
    pub async fn validate(
        &self,
        worktree: &mut Worktree,
        pipeline: &Pipeline,
        ctx: &StageContext,
    ) -> Result<(bool, PipelineReport), WorktreeError> {
        worktree.ensure_open()?;
        let report = pipeline.run(ctx, None).await;
        let passed = report.all_passed();
        if passed {
            worktree.status = WorktreeStatus::Validated;
        }
        Ok((passed, report))
    }

    /// Merge the worktree back, fast-forward only.
    ///
    /// Uncommitted work in the worktree is committed onto its branch
    /// first. A non-fast-forward result merges nothing and reports
    /// conflict; resolution is a human decision, never silent.
    pub async fn merge(&self, worktree: &mut Worktree) -> Result<MergeOutcome, WorktreeError> {
        worktree.ensure_open()?;

        let status = run_git_in(
            &worktree.root_path,
            &["status", "--porcelain"],
            self.git_deadline,
        )
        .await?;
        if !status.stdout.is_empty() {
            let _ =
                run_git_in(&worktree.root_path, &["add", "-A"], self.git_deadline).await?;
            let message = format!("{}: apply changes", worktree.id);
            let commit = run_git_in(
                &worktree.root_path,
                &["commit", "-m", message.as_str()],
                self.git_deadline,
            )
            .await?;
            if !commit.status.success() {
                return Err(WorktreeError::GitFailed {
                    operation: "commit".to_string(),
                    stderr: stderr_of(&commit),
                });
            }
        }

        let merge = self
            .git(&["merge", "--ff-only", worktree.branch.as_str()])
            .await?;

        if merge.status.success() {
            worktree.status = WorktreeStatus::Merged;
            info!(id = %worktree.id, "worktree merged");
            Ok(MergeOutcome::Merged)
        } else {
            warn!(id = %worktree.id, "fast-forward merge refused, worktree preserved");
            Ok(MergeOutcome::Conflict {
                detail: stderr_of(&merge),
            })
        }
    }

    /// Discard the worktree and its branch.
    ///
    /// A discard that fails marks the record orphan rather than leaving
    /// the status ambiguous.
    pub async fn discard(&self, worktree: &mut Worktree) -> Result<(), WorktreeError> {
        worktree.ensure_open()?;

        let removed = self
            .git(&["worktree", "remove", "--force", worktree.root_path.as_str()])
            .await?;
        if !removed.status.success() {
            worktree.status = WorktreeStatus::Orphan;
            return Err(WorktreeError::DiscardFailed {
                id: worktree.id.clone(),
                reason: stderr_of(&removed),
            });
        }

        // Branch deletion is cleanup, not correctness
        let _ = self
            .git(&["branch", "-D", worktree.branch.as_str()])
            .await;

        worktree.status = WorktreeStatus::Discarded;
        info!(id = %worktree.id, "worktree discarded");
        Ok(())
    }

    async fn git(&self, args: &[&str]) -> Result<Output, WorktreeError> {
        run_git_in(&self.repo_root, args, self.git_deadline).await
    }
}

async fn run_git_in(
    dir: &Utf8Path,
    args: &[&str],
    deadline: Duration,
) -> Result<Output, WorktreeError> {
    let child = tokio::process::Command::new("git")
        .args(args)
        .current_dir(dir.as_std_path())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(deadline, child).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(WorktreeError::GitFailed {
            operation: args.first().copied().unwrap_or("git").to_string(),
            stderr: e.to_string(),
        }),
        Err(_) => Err(WorktreeError::GitFailed {
            operation: args.first().copied().unwrap_or("git").to_string(),
            stderr: format!("timed out after {}s", deadline.as_secs()),
        }),
    }
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// Parse one `--numstat` line: `additions<TAB>deletions<TAB>path`.
/// Binary files report `-` and count as zero.
fn parse_numstat_line(line: &str) -> Option<FileChange> {
    let mut parts = line.split('\t');
    let additions = parts.next()?.parse::<u64>().unwrap_or(0);
    let deletions = parts.next()?.parse::<u64>().unwrap_or(0);
    let path = parts.next()?.to_string();
    Some(FileChange {
        path,
        additions,
        deletions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git_available() -> bool {
        which::which("git").is_ok()
    }

    /// Initialize a repository with one commit; returns its root.
    async fn init_repo(dir: &TempDir) -> Utf8PathBuf {
        let root = Utf8PathBuf::from_path_buf(dir.path().join("repo")).unwrap();
        std::fs::create_dir_all(root.as_std_path()).unwrap();

        for args in [
            vec!["init", "-b", "main"],
            vec!["config", "user.email", "engine@test"],
            vec!["config", "user.name", "engine"],
        ] {
            let out = run_git_in(&root, &args, Duration::from_secs(10)).await.unwrap();
            assert!(out.status.success(), "git {args:?} failed");
        }
        std::fs::write(root.join("README.md").as_std_path(), "# repo\n").unwrap();
        for args in [vec!["add", "-A"], vec!["commit", "-m", "init"]] {
            let out = run_git_in(&root, &args, Duration::from_secs(10)).await.unwrap();
            assert!(out.status.success());
        }
        root
    }

    #[test]
    fn numstat_parsing_handles_binary_markers() {
        let change = parse_numstat_line("12\t3\tsrc/lib.rs").unwrap();
        assert_eq!(change.path, "src/lib.rs");
        assert_eq!(change.additions, 12);
        assert_eq!(change.deletions, 3);

        let binary = parse_numstat_line("-\t-\tassets/logo.png").unwrap();
        assert_eq!(binary.additions, 0);
    }

    #[test]
    fn tests_changed_counts_test_paths() {
        let summary = PatchSummary {
            files: vec![
                FileChange { path: "src/lib.rs".into(), additions: 5, deletions: 0 },
                FileChange { path: "tests/smoke.rs".into(), additions: 9, deletions: 0 },
                FileChange { path: "src/selector_test.rs".into(), additions: 2, deletions: 1 },
            ],
            additions: 16,
            deletions: 1,
        };
        assert_eq!(summary.tests_changed(), 2);
    }

    #[tokio::test]
    async fn open_diff_merge_round_trip() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let root = init_repo(&dir).await;
        let manager = WorktreeManager::new(root.clone()).unwrap();

        let run_id = RunId::from_string("r-merge");
        let wt_dir = Utf8PathBuf::from_path_buf(dir.path().join("wt")).unwrap();
        let mut worktree = manager.open(&run_id, "main", &wt_dir).await.unwrap();
        assert_eq!(worktree.status, WorktreeStatus::Open);

        // No changes yet
        let empty = manager.diff(&worktree).await.unwrap();
        assert!(empty.is_empty());

        std::fs::write(wt_dir.join("feature.rs").as_std_path(), "pub fn f() {}\n").unwrap();
        let summary = manager.diff(&worktree).await.unwrap();
        assert_eq!(summary.files.len(), 1);
        assert_eq!(summary.files[0].path, "feature.rs");
        assert!(summary.additions > 0);

        match manager.merge(&mut worktree).await.unwrap() {
            MergeOutcome::Merged => {}
            MergeOutcome::Conflict { detail } => panic!("unexpected conflict: {detail}"),
        }
        assert_eq!(worktree.status, WorktreeStatus::Merged);
        assert!(root.join("feature.rs").as_std_path().exists());
    }

    #[tokio::test]
    async fn discard_removes_the_checkout() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let root = init_repo(&dir).await;
        let manager = WorktreeManager::new(root).unwrap();

        let run_id = RunId::from_string("r-discard");
        let wt_dir = Utf8PathBuf::from_path_buf(dir.path().join("wt")).unwrap();
        let mut worktree = manager.open(&run_id, "main", &wt_dir).await.unwrap();

        std::fs::write(wt_dir.join("junk.rs").as_std_path(), "x\n").unwrap();
        manager.discard(&mut worktree).await.unwrap();
        assert_eq!(worktree.status, WorktreeStatus::Discarded);
        assert!(!wt_dir.as_std_path().exists());
    }

    #[tokio::test]
    async fn double_close_is_rejected() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let root = init_repo(&dir).await;
        let manager = WorktreeManager::new(root).unwrap();

        let run_id = RunId::from_string("r-double");
        let wt_dir = Utf8PathBuf::from_path_buf(dir.path().join("wt")).unwrap();
        let mut worktree = manager.open(&run_id, "main", &wt_dir).await.unwrap();

        manager.discard(&mut worktree).await.unwrap();
        let err = manager.discard(&mut worktree).await.unwrap_err();
        assert!(matches!(err, WorktreeError::AlreadyClosed { .. }));

        let err = manager.merge(&mut worktree).await.unwrap_err();
        assert!(matches!(err, WorktreeError::AlreadyClosed { .. }));
    }

    #[tokio::test]
    async fn merge_conflict_preserves_worktree() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let root = init_repo(&dir).await;
        let manager = WorktreeManager::new(root.clone()).unwrap();

        let run_id = RunId::from_string("r-conflict");
        let wt_dir = Utf8PathBuf::from_path_buf(dir.path().join("wt")).unwrap();
        let mut worktree = manager.open(&run_id, "main", &wt_dir).await.unwrap();

        // Diverge main after the worktree branched
        std::fs::write(root.join("README.md").as_std_path(), "# diverged\n").unwrap();
        for args in [vec!["add", "-A"], vec!["commit", "-m", "diverge"]] {
            run_git_in(&root, &args, Duration::from_secs(10)).await.unwrap();
        }

        std::fs::write(wt_dir.join("README.md").as_std_path(), "# worktree\n").unwrap();
        match manager.merge(&mut worktree).await.unwrap() {
            MergeOutcome::Conflict { .. } => {}
            MergeOutcome::Merged => panic!("expected a refused fast-forward"),
        }
        // Not merged, not closed: preserved for inspection
        assert_eq!(worktree.status, WorktreeStatus::Open);
        assert!(wt_dir.as_std_path().exists());
    }

    #[tokio::test]
    async fn is_repository_detects_git_trees() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let root = init_repo(&dir).await;
        assert!(WorktreeManager::is_repository(&root).await);

        let plain = TempDir::new().unwrap();
        let plain_root = Utf8PathBuf::from_path_buf(plain.path().to_path_buf()).unwrap();
        assert!(!WorktreeManager::is_repository(&plain_root).await);
    }
}
