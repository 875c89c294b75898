//! Process exit codes for the engine binary.
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | run finished `ok` or `ok_with_warnings` |
//! | 1 | run finished `needs_iteration` |
//! | 2 | run `failed` (configuration, provider, pipeline, internal) |
//! | 3 | invocation error (parse failure, unknown command); no run record |

use serde::{Deserialize, Serialize};

/// Exit code for the engine binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitCode {
    /// Run completed successfully (with or without warnings).
    Success,
    /// Run completed but quality was not met; best iteration returned.
    NeedsIteration,
    /// Run failed.
    Failed,
    /// The invocation itself was invalid; no run was started.
    Invocation,
}

impl ExitCode {
    /// The numeric code handed to the OS.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::NeedsIteration => 1,
            Self::Failed => 2,
            Self::Invocation => 3,
        }
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::NeedsIteration.as_i32(), 1);
        assert_eq!(ExitCode::Failed.as_i32(), 2);
        assert_eq!(ExitCode::Invocation.as_i32(), 3);
    }

    #[test]
    fn display_matches_numeric_code() {
        assert_eq!(ExitCode::NeedsIteration.to_string(), "1");
    }
}
