//! Offline test harness for executor scenarios.
//!
//! Builds a temp workspace with seeded command and agent files, scripted
//! static providers behind the router, and an in-memory event sink, so
//! end-to-end runs are deterministic and make no network calls.

use std::collections::BTreeMap;
use std::sync::Arc;

use camino::Utf8PathBuf;
use tempfile::TempDir;

use superclaude_agents::AgentRegistry;
use superclaude_command::CommandRegistry;
use superclaude_config::EngineConfig;
use superclaude_providers::{ProviderAdapter, StaticProvider};
use superclaude_redaction::SecretRedactor;
use superclaude_router::ModelRouter;
use superclaude_telemetry::{Event, EventLog, EvidenceStore, MemorySink};
use superclaude_util::ids::RunId;

use crate::executor::Executor;

/// A ready-to-run executor over a temp workspace.
pub struct TestHarness {
    pub workspace: TempDir,
    pub executor: Executor,
    pub sink: MemorySink,
    pub providers: BTreeMap<String, Arc<StaticProvider>>,
}

impl TestHarness {
    /// Build a harness with scripted providers for the given names.
    #[must_use]
    pub fn new(provider_names: &[&str]) -> Self {
        Self::with_config(provider_names, |_| {})
    }

    /// Build a harness and adjust the configuration (tool hooks, weights)
    /// before the executor is assembled.
    #[must_use]
    pub fn with_config(
        provider_names: &[&str],
        mutate: impl FnOnce(&mut EngineConfig),
    ) -> Self {
        let workspace = TempDir::new().expect("temp workspace");
        let root = workspace.path();

        let commands_dir = root.join(".superclaude/commands");
        let agents_dir = root.join(".superclaude/agents");
        std::fs::create_dir_all(&commands_dir).unwrap();
        std::fs::create_dir_all(&agents_dir).unwrap();

        seed_default_commands(&commands_dir);
        seed_default_agents(&agents_dir);

        let mut config = EngineConfig::minimal_for_testing();
        mutate(&mut config);
        let config = config;
        let redactor = Arc::new(SecretRedactor::new());

        let sink = MemorySink::new();
        let events = Arc::new(EventLog::new(
            vec![Box::new(sink.clone())],
            Arc::clone(&redactor),
            256,
        ));
        let runs_base = Utf8PathBuf::from_path_buf(root.join(".runs")).unwrap();
        let evidence = Arc::new(EvidenceStore::new(runs_base, redactor));

        let mut providers: BTreeMap<String, Arc<StaticProvider>> = BTreeMap::new();
        let mut adapters: BTreeMap<String, Arc<dyn ProviderAdapter>> = BTreeMap::new();
        for name in provider_names {
            let provider = Arc::new(StaticProvider::new(*name));
            adapters.insert((*name).to_string(), provider.clone() as Arc<dyn ProviderAdapter>);
            providers.insert((*name).to_string(), provider);
        }
        let router = Arc::new(ModelRouter::with_adapters(&config, adapters));

        let commands = Arc::new(CommandRegistry::new(vec![commands_dir]));
        let agents = Arc::new(AgentRegistry::new(vec![agents_dir], 64));

        let executor = Executor::from_parts(config, commands, agents, router, events, evidence);

        Self {
            workspace,
            executor,
            sink,
            providers,
        }
    }

    /// The workspace root as a UTF-8 path.
    #[must_use]
    pub fn root(&self) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.workspace.path().to_path_buf()).unwrap()
    }

    /// Turn the workspace into a git repository with one commit.
    pub fn init_git(&self) {
        let run = |args: &[&str]| {
            let status = std::process::Command::new("git")
                .args(args)
                .current_dir(self.workspace.path())
                .output()
                .expect("git available");
            assert!(status.status.success(), "git {args:?} failed");
        };
        run(&["init", "-b", "main"]);
        run(&["config", "user.email", "engine@test"]);
        run(&["config", "user.name", "engine"]);
        std::fs::write(self.workspace.path().join("README.md"), "# fixture\n").unwrap();
        run(&["add", "-A"]);
        run(&["commit", "-m", "init"]);
    }

    /// Scripted provider handle by name.
    #[must_use]
    pub fn provider(&self, name: &str) -> &Arc<StaticProvider> {
        &self.providers[name]
    }

    /// All events recorded for one run, in emission order.
    #[must_use]
    pub fn events_for(&self, run_id: &RunId) -> Vec<Event> {
        self.sink
            .events()
            .into_iter()
            .filter(|e| e.run_id == *run_id)
            .collect()
    }

    /// Kinds of events for a run, as dotted names.
    #[must_use]
    pub fn event_kinds_for(&self, run_id: &RunId) -> Vec<&'static str> {
        self.events_for(run_id)
            .iter()
            .map(|e| e.kind.as_str())
            .collect()
    }
}

/// A model response proposing one file change, in the extraction format.
#[must_use]
pub fn response_with_file(path: &str, content: &str) -> String {
    format!("Implemented.\n\n```rust path={path}\n{content}\n```\n")
}

fn seed_default_commands(dir: &std::path::Path) {
    let write = |file: &str, content: &str| {
        std::fs::write(dir.join(file), content).unwrap();
    };

    write(
        "implement.md",
        r#"---
name: implement
category: engineering
description: Implement a feature with validation and quality gates
complexity: high
requires_evidence: true
flags_spec:
  - name: consensus
    type: bool
    short: c
  - name: tier
    type: choice
    allowed: [deep_thinking, long_context, fast_iteration, fallback]
expectations:
  expects_file_changes: true
  expects_tests: false
  requires_diff: true
---
Implement the requested change, then validate it.
"#,
    );

    write(
        "analyze.md",
        r#"---
name: analyze
category: analysis
description: Analyze the codebase and report findings
complexity: medium
flags_spec:
  - name: consensus
    type: bool
---
Analyze and report.
"#,
    );

    write(
        "design.md",
        r#"---
name: design
category: architecture
description: Produce a design with optional multi-model consensus
complexity: high
flags_spec:
  - name: consensus
    type: bool
  - name: quorum
    type: number
---
Design the requested system.
"#,
    );
}

fn seed_default_agents(dir: &std::path::Path) {
    let write = |file: &str, content: &str| {
        std::fs::write(dir.join(file), content).unwrap();
    };

    write(
        "security-engineer.md",
        r#"---
id: security-engineer
category: security
description: security review and threat modeling for auth flows
triggers: [security, auth, login, vulnerability]
tools: [read, grep, bash]
languages: [rust]
priority: 5
---
Security persona body.
"#,
    );

    write(
        "backend-engineer.md",
        r#"---
id: backend-engineer
category: backend
description: api endpoint and database design and implementation
triggers: [api, endpoint, database, health, implement]
tools: [read, write, edit, bash]
---
Backend persona body.
"#,
    );

    write(
        "system-architect.md",
        r#"---
id: system-architect
category: architecture
description: system design architecture and component boundaries
triggers: [design, architecture, system]
tools: [read, write]
---
Architect persona body.
"#,
    );
}
