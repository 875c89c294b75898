//! Engine binary: run a command, or diagnose the environment.

use std::process::ExitCode as ProcessExitCode;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

use superclaude::config::EngineConfig;
use superclaude::executor::{ExecuteRequest, Executor, clamp_requested_iterations};
use superclaude::providers;
use superclaude::util::error::EngineError;
use superclaude::util::exit_codes::ExitCode;
use superclaude::worktree::WorktreeManager;

#[derive(Parser)]
#[command(
    name = "superclaude",
    version,
    about = "Command orchestration engine with agent selection, consensus routing, and evidence-backed quality loops"
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Execute a command invocation, e.g. `/sc:implement "Add health endpoint"`.
    Run {
        /// The textual invocation.
        invocation: String,
        /// Working directory; defaults to the current directory.
        #[arg(long)]
        dir: Option<Utf8PathBuf>,
        /// Iteration budget for the improvement loop (clamped to the hard
        /// ceiling of 5).
        #[arg(long)]
        max_iterations: Option<u32>,
    },
    /// Report provider availability, tier coverage, and tool hooks.
    Doctor {
        /// Working directory; defaults to the current directory.
        #[arg(long)]
        dir: Option<Utf8PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ProcessExitCode {
    if let Err(e) = superclaude::util::logging::init_tracing() {
        eprintln!("warning: failed to initialize logging: {e}");
    }

    let cli = Cli::parse();
    let code = match cli.command {
        CliCommand::Run {
            invocation,
            dir,
            max_iterations,
        } => run(invocation, dir, max_iterations).await,
        CliCommand::Doctor { dir } => doctor(dir).await,
    };

    ProcessExitCode::from(u8::try_from(code.as_i32()).unwrap_or(2))
}

async fn run(
    invocation: String,
    dir: Option<Utf8PathBuf>,
    max_iterations: Option<u32>,
) -> ExitCode {
    let working_dir = match resolve_dir(dir) {
        Ok(dir) => dir,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::Failed;
        }
    };

    let config = match EngineConfig::discover_from(working_dir.as_std_path()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return ExitCode::Failed;
        }
    };

    let executor = match Executor::new(config, &working_dir) {
        Ok(executor) => executor,
        Err(e) => {
            eprintln!("startup error: {e:#}");
            return ExitCode::Failed;
        }
    };

    let mut request = ExecuteRequest::new(invocation, working_dir);
    request.max_iterations = clamp_requested_iterations(max_iterations);

    match executor.execute(request).await {
        Ok(result) => {
            let score = result
                .final_assessment
                .as_ref()
                .map(|a| format!("{:.1}", a.final_score))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "run {} finished: {:?} (score {score}, {} iteration(s))",
                result.run_id, result.outcome, result.iterations_used
            );
            println!("evidence: {}", result.evidence_path);
            for error in &result.errors {
                eprintln!("  {error}");
            }
            result.outcome.exit_code()
        }
        Err(e @ EngineError::Parse(_)) => {
            eprintln!("{e}");
            e.to_exit_code()
        }
        Err(e) => {
            eprintln!("error: {e}");
            e.to_exit_code()
        }
    }
}

async fn doctor(dir: Option<Utf8PathBuf>) -> ExitCode {
    let working_dir = match resolve_dir(dir) {
        Ok(dir) => dir,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::Failed;
        }
    };

    let config = match EngineConfig::discover_from(working_dir.as_std_path()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            return ExitCode::Failed;
        }
    };

    println!("superclaude doctor");
    println!("  working dir: {working_dir}");
    println!(
        "  offline mode: {}",
        if providers::offline_mode() { "ON" } else { "off" }
    );

    println!("providers:");
    for (name, section) in &config.providers {
        let present = providers::key_present(name, section);
        let key_env = section
            .api_key_env
            .clone()
            .unwrap_or_else(|| providers::default_key_env(name));
        println!(
            "  {name:<10} key {:<9} ({key_env})",
            if present { "present" } else { "MISSING" }
        );
    }

    println!("tiers:");
    let router = superclaude::router::ModelRouter::from_config(&config);
    let availability = router.availability();
    for (tier, entries) in &config.tiers {
        let usable = entries
            .iter()
            .filter(|e| availability.get(&e.provider).copied().unwrap_or(false))
            .count();
        println!("  {tier:<15} {usable}/{} models usable", entries.len());
    }

    println!("tools:");
    let git = if which::which("git").is_ok() { "found" } else { "MISSING" };
    println!("  git        {git}");
    for (label, hook) in [
        ("lint", &config.validation.lint_command),
        ("tests", &config.validation.test_command),
        ("build", &config.validation.build_command),
        ("typecheck", &config.validation.typecheck_command),
    ] {
        match hook {
            Some(command_line) => {
                let binary = command_line.split_whitespace().next().unwrap_or("");
                let found = which::which(binary).is_ok();
                println!(
                    "  {label:<10} {} ({command_line})",
                    if found { "found" } else { "MISSING" }
                );
            }
            None => println!("  {label:<10} not configured"),
        }
    }

    let is_repo = WorktreeManager::is_repository(&working_dir).await;
    println!(
        "repository: {}",
        if is_repo {
            "tracked (evidence-producing commands available)"
        } else {
            "not a git repository (evidence-producing commands will be rejected)"
        }
    );

    if !config.source_attribution.is_empty() {
        println!("config sources:");
        let mut keys: Vec<_> = config.source_attribution.keys().collect();
        keys.sort();
        for key in keys {
            println!("  {key:<24} {}", config.source_attribution[key]);
        }
    }

    ExitCode::Success
}

fn resolve_dir(dir: Option<Utf8PathBuf>) -> Result<Utf8PathBuf, String> {
    match dir {
        Some(dir) => Ok(dir),
        None => std::env::current_dir()
            .map_err(|e| format!("cannot resolve current directory: {e}"))
            .and_then(|d| {
                Utf8PathBuf::from_path_buf(d)
                    .map_err(|d| format!("current directory is not UTF-8: {}", d.display()))
            }),
    }
}
