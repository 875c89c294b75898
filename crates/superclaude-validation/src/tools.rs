//! External tool invocation for stages.
//!
//! Tool hooks (lint, tests, build) are configured shell-less command lines,
//! spawned with a deadline and captured output. A missing binary degrades
//! to a `tool_missing` outcome rather than failing the stage.

use std::time::Duration;

use camino::Utf8Path;
use tokio::process::Command;
use tracing::debug;

use superclaude_util::error::PipelineError;

/// Cap on captured output retained for evidence.
const OUTPUT_TAIL_BYTES: usize = 16 * 1024;

/// Outcome of one tool invocation.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    /// Tool ran to completion.
    Completed {
        exit_code: i32,
        stdout_tail: String,
        stderr_tail: String,
    },
    /// The configured binary is not on PATH.
    Missing { binary: String },
    /// The deadline elapsed; the child was killed.
    TimedOut,
}

impl ToolOutcome {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Completed { exit_code: 0, .. })
    }
}

/// Run a configured tool command under `root` with a deadline.
///
/// The command line is split on whitespace; stages that need shell syntax
/// should configure a wrapper script instead.
pub async fn run_tool(
    stage: &str,
    command_line: &str,
    root: &Utf8Path,
    deadline: Duration,
) -> Result<ToolOutcome, PipelineError> {
    let mut parts = command_line.split_whitespace();
    let Some(binary) = parts.next() else {
        return Err(PipelineError::ToolSpawn {
            stage: stage.to_string(),
            tool: command_line.to_string(),
            reason: "empty command line".to_string(),
        });
    };
    let args: Vec<&str> = parts.collect();

    if which::which(binary).is_err() {
        debug!(stage, binary, "tool not found on PATH");
        return Ok(ToolOutcome::Missing {
            binary: binary.to_string(),
        });
    }

    let child = Command::new(binary)
        .args(&args)
        .current_dir(root.as_std_path())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(deadline, child).await {
        Ok(Ok(output)) => Ok(ToolOutcome::Completed {
            exit_code: output.status.code().unwrap_or(-1),
            stdout_tail: tail(&output.stdout),
            stderr_tail: tail(&output.stderr),
        }),
        Ok(Err(e)) => Err(PipelineError::ToolSpawn {
            stage: stage.to_string(),
            tool: binary.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(ToolOutcome::TimedOut),
    }
}

fn tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= OUTPUT_TAIL_BYTES {
        text.into_owned()
    } else {
        let start = text.len() - OUTPUT_TAIL_BYTES;
        // Find a char boundary at or after the cut point
        let boundary = text
            .char_indices()
            .map(|(i, _)| i)
            .find(|&i| i >= start)
            .unwrap_or(start);
        text[boundary..].to_string()
    }
}
