//! Hard limits and defaults for the engine.
//!
//! Every knob here is clamped at intake: configuration files, environment
//! variables, and request flags can lower limits but never raise them past
//! the hard caps.

use std::time::Duration;

/// Absolute ceiling on agentic loop iterations. No configuration path may
/// raise it.
pub const HARD_MAX_ITERATIONS: u32 = 5;

/// Default iteration budget when nothing else is configured.
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// Environment variable for the iteration budget. Values above
/// [`HARD_MAX_ITERATIONS`] are clamped, never honored.
pub const MAX_ITERATIONS_ENV: &str = "ENGINE_MAX_ITERATIONS";

/// Per-provider-call deadline.
pub const DEFAULT_PROVIDER_CALL_DEADLINE: Duration = Duration::from_secs(60);
pub const MAX_PROVIDER_CALL_DEADLINE: Duration = Duration::from_secs(300);

/// Per-consensus-query deadline.
pub const DEFAULT_CONSENSUS_DEADLINE: Duration = Duration::from_secs(120);
pub const MAX_CONSENSUS_DEADLINE: Duration = Duration::from_secs(600);

/// Per-validation-stage deadline.
pub const DEFAULT_STAGE_DEADLINE: Duration = Duration::from_secs(300);
pub const MAX_STAGE_DEADLINE: Duration = Duration::from_secs(1800);

/// Per-loop-iteration deadline.
pub const DEFAULT_ITERATION_DEADLINE: Duration = Duration::from_secs(600);
pub const MAX_ITERATION_DEADLINE: Duration = Duration::from_secs(1200);

/// Whole-run deadline.
pub const DEFAULT_RUN_DEADLINE: Duration = Duration::from_secs(1800);
pub const MAX_RUN_DEADLINE: Duration = Duration::from_secs(3600);

/// Clamp a requested iteration count to the hard ceiling.
#[must_use]
pub fn clamp_iterations(requested: u32) -> u32 {
    requested.min(HARD_MAX_ITERATIONS)
}

/// Clamp a requested deadline to its hard cap.
#[must_use]
pub fn clamp_deadline(requested: Duration, cap: Duration) -> Duration {
    requested.min(cap)
}
