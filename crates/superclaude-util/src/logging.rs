//! Tracing initialization for the engine binary.

use std::io::IsTerminal;

use tracing_subscriber::{
    EnvFilter,
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Environment variable selecting the log level when `RUST_LOG` is absent.
pub const LOG_LEVEL_ENV: &str = "ENGINE_LOG_LEVEL";

/// Check if colored output should be used.
///
/// Returns true only if stdout is a terminal and `NO_COLOR` is not set.
fn use_color() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Initialize the global tracing subscriber.
///
/// Filter precedence: `RUST_LOG` > `ENGINE_LOG_LEVEL` > `info`. The level
/// value must be one of `trace|debug|info|warn|error`; anything else falls
/// back to `info` with a warning once the subscriber is live.
///
/// # Errors
///
/// Returns an error if a global subscriber was already installed.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let mut fallback_noted: Option<String> = None;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        match std::env::var(LOG_LEVEL_ENV) {
            Ok(level) => {
                let level = level.trim().to_ascii_lowercase();
                match level.as_str() {
                    "trace" | "debug" | "info" | "warn" | "error" => {
                        EnvFilter::new(format!("superclaude={level},{level}"))
                    }
                    other => {
                        fallback_noted = Some(other.to_string());
                        EnvFilter::new("info")
                    }
                }
            }
            Err(_) => EnvFilter::new("superclaude=info,warn"),
        }
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_line_number(false)
                .with_file(false)
                .with_ansi(use_color())
                .compact(),
        )
        .try_init()?;

    if let Some(bad) = fallback_noted {
        tracing::warn!(value = %bad, "unrecognized {LOG_LEVEL_ENV}, using 'info'");
    }

    Ok(())
}
