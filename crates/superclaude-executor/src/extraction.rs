//! File-change extraction from model responses.
//!
//! The engine runs a controlled execution strategy: models only propose
//! changes, and every write goes through this extractor into the run's
//! worktree. Proposals are fenced code blocks whose info string names the
//! target file:
//!
//! ````text
//! ```rust path=src/health.rs
//! pub fn health() -> &'static str { "ok" }
//! ```
//! ````
//!
//! Paths are validated before writing: relative, inside the worktree, no
//! parent traversal.

use camino::Utf8Path;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Info-string form: optional language tag, then `path=<relative path>`.
static FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_+-]*\s*path=(\S+)\s*$").unwrap());

/// One proposed file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlock {
    pub path: String,
    pub content: String,
}

/// Extract file blocks from a response.
pub fn extract_file_blocks(response: &str) -> Vec<FileBlock> {
    let mut blocks = Vec::new();
    let mut lines = response.lines();

    while let Some(line) = lines.next() {
        let Some(caps) = FENCE_OPEN.captures(line.trim_end()) else {
            continue;
        };
        let path = caps[1].to_string();

        let mut content = String::new();
        let mut closed = false;
        for body_line in lines.by_ref() {
            if body_line.trim_end() == "```" {
                closed = true;
                break;
            }
            content.push_str(body_line);
            content.push('\n');
        }
        if closed {
            blocks.push(FileBlock { path, content });
        }
        // An unterminated fence is dropped; partial writes are worse than
        // no writes
    }

    blocks
}

/// Apply extracted blocks under `root`. Returns the number of files
/// written; unsafe paths are skipped with a warning, never written.
pub fn apply_file_blocks(root: &Utf8Path, blocks: &[FileBlock]) -> anyhow::Result<usize> {
    let mut written = 0;
    for block in blocks {
        if !path_is_safe(&block.path) {
            warn!(path = %block.path, "skipping unsafe file block path");
            continue;
        }
        let target = root.join(&block.path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent.as_std_path())?;
        }
        std::fs::write(target.as_std_path(), &block.content)?;
        debug!(path = %block.path, bytes = block.content.len(), "applied file block");
        written += 1;
    }
    Ok(written)
}

/// Relative, no traversal, no absolute components.
fn path_is_safe(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') || path.starts_with('\\') || path.contains(':') {
        return false;
    }
    !path
        .split(['/', '\\'])
        .any(|component| component == ".." || component.is_empty())
}
