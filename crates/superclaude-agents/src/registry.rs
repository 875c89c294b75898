//! Agent discovery and the bounded registry cache.
//!
//! Discovery walks the configured directories for `*.md` files, parses the
//! YAML frontmatter, and records an id → path index. Parsed agents live in
//! a capacity-bounded cache with least-recently-used eviction; an evicted
//! entry is re-parsed from disk on next access, so the cache ceiling bounds
//! memory without losing agents. The registry is read-mostly: lookups take
//! the read lock, discovery takes the write lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use globset::{Glob, GlobMatcher};
use tracing::{debug, warn};

use superclaude_util::error::RegistryError;
use superclaude_util::frontmatter::split_frontmatter;

use crate::types::Agent;

struct CacheState {
    /// id → source file, for every discovered agent.
    index: HashMap<String, PathBuf>,
    /// Parsed agents, bounded by `ceiling`.
    cache: HashMap<String, Agent>,
    /// Access order, oldest first.
    access_order: Vec<String>,
    discovered: bool,
}

/// The agent registry.
pub struct AgentRegistry {
    roots: Vec<PathBuf>,
    matcher: GlobMatcher,
    ceiling: usize,
    state: RwLock<CacheState>,
}

impl AgentRegistry {
    /// Create a registry over one or more agent directories.
    #[must_use]
    pub fn new(roots: Vec<PathBuf>, cache_ceiling: usize) -> Self {
        Self {
            roots,
            matcher: Glob::new("*.md").expect("static glob").compile_matcher(),
            ceiling: cache_ceiling.max(1),
            state: RwLock::new(CacheState {
                index: HashMap::new(),
                cache: HashMap::new(),
                access_order: Vec::new(),
                discovered: false,
            }),
        }
    }

    /// Discover agents, idempotently. Pass `force` to re-walk the
    /// directories even if discovery already ran.
    pub fn discover(&self, force: bool) -> Result<usize, RegistryError> {
        {
            let state = self.state.read().expect("registry poisoned");
            if state.discovered && !force {
                return Ok(state.index.len());
            }
        }

        let mut index = HashMap::new();
        for root in &self.roots {
            if !root.is_dir() {
                debug!(root = %root.display(), "agent directory absent, skipping");
                continue;
            }
            let entries =
                std::fs::read_dir(root).map_err(|e| RegistryError::DiscoveryFailed {
                    root: root.display().to_string(),
                    reason: e.to_string(),
                })?;

            for entry in entries {
                let entry = entry.map_err(|e| RegistryError::DiscoveryFailed {
                    root: root.display().to_string(),
                    reason: e.to_string(),
                })?;
                let path = entry.path();
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if !self.matcher.is_match(name) {
                    continue;
                }
                match parse_agent_file(&path) {
                    Ok(agent) => {
                        index.insert(agent.id.clone(), path);
                    }
                    Err(reason) => {
                        // Malformed persona files never break discovery
                        warn!(path = %path.display(), reason, "skipping malformed agent file");
                    }
                }
            }
        }

        let mut state = self.state.write().expect("registry poisoned");
        state.index = index;
        state.cache.clear();
        state.access_order.clear();
        state.discovered = true;
        Ok(state.index.len())
    }

    /// Fetch an agent by id, parsing from disk if it was evicted.
    pub fn get(&self, id: &str) -> Result<Agent, RegistryError> {
        self.ensure_discovered()?;

        {
            let mut state = self.state.write().expect("registry poisoned");
            if let Some(agent) = state.cache.get(id).cloned() {
                touch(&mut state.access_order, id);
                return Ok(agent);
            }
        }

        let path = {
            let state = self.state.read().expect("registry poisoned");
            state
                .index
                .get(id)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })?
        };

        let agent = parse_agent_file(&path).map_err(|reason| RegistryError::DiscoveryFailed {
            root: path.display().to_string(),
            reason,
        })?;

        let mut state = self.state.write().expect("registry poisoned");
        state.cache.insert(id.to_string(), agent.clone());
        touch(&mut state.access_order, id);
        while state.cache.len() > self.ceiling {
            let Some(victim) = state.access_order.first().cloned() else {
                break;
            };
            state.access_order.remove(0);
            state.cache.remove(&victim);
        }
        Ok(agent)
    }

    /// All discovered agents, in stable id order.
    pub fn all(&self) -> Result<Vec<Agent>, RegistryError> {
        self.ensure_discovered()?;
        let ids: Vec<String> = {
            let state = self.state.read().expect("registry poisoned");
            let mut ids: Vec<String> = state.index.keys().cloned().collect();
            ids.sort();
            ids
        };
        ids.iter().map(|id| self.get(id)).collect()
    }

    /// Number of discovered agents.
    pub fn len(&self) -> Result<usize, RegistryError> {
        self.ensure_discovered()?;
        Ok(self.state.read().expect("registry poisoned").index.len())
    }

    pub fn is_empty(&self) -> Result<bool, RegistryError> {
        Ok(self.len()? == 0)
    }

    fn ensure_discovered(&self) -> Result<(), RegistryError> {
        let discovered = self.state.read().expect("registry poisoned").discovered;
        if !discovered {
            self.discover(false)?;
        }
        Ok(())
    }
}

fn touch(order: &mut Vec<String>, id: &str) {
    if let Some(pos) = order.iter().position(|x| x == id) {
        order.remove(pos);
    }
    order.push(id.to_string());
}

/// Parse one agent file: frontmatter only, body ignored.
fn parse_agent_file(path: &Path) -> Result<Agent, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let (frontmatter, _body) =
        split_frontmatter(&content).ok_or_else(|| "missing frontmatter block".to_string())?;
    let agent: Agent = serde_yaml::from_str(frontmatter).map_err(|e| e.to_string())?;
    if agent.id.trim().is_empty() {
        return Err("agent id is empty".to_string());
    }
    Ok(agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_agent(dir: &Path, file: &str, id: &str, category: &str, triggers: &[&str]) {
        let triggers_yaml = triggers.join(", ");
        let content = format!(
            "---\nid: {id}\ncategory: {category}\ndescription: {id} persona\ntriggers: [{triggers_yaml}]\n---\nPersona body.\n"
        );
        std::fs::write(dir.join(file), content).unwrap();
    }

    #[test]
    fn discovery_finds_and_indexes_agents() {
        let dir = TempDir::new().unwrap();
        write_agent(dir.path(), "sec.md", "security-engineer", "security", &["security"]);
        write_agent(dir.path(), "fe.md", "frontend-architect", "frontend", &["ui"]);
        std::fs::write(dir.path().join("notes.txt"), "not an agent").unwrap();

        let registry = AgentRegistry::new(vec![dir.path().to_path_buf()], 16);
        assert_eq!(registry.discover(false).unwrap(), 2);
        assert_eq!(registry.get("security-engineer").unwrap().category, "security");
    }

    #[test]
    fn discovery_is_idempotent_and_forceable() {
        let dir = TempDir::new().unwrap();
        write_agent(dir.path(), "a.md", "agent-a", "general", &[]);

        let registry = AgentRegistry::new(vec![dir.path().to_path_buf()], 16);
        assert_eq!(registry.discover(false).unwrap(), 1);

        write_agent(dir.path(), "b.md", "agent-b", "general", &[]);
        // Without force the snapshot is unchanged
        assert_eq!(registry.discover(false).unwrap(), 1);
        assert_eq!(registry.discover(true).unwrap(), 2);
    }

    #[test]
    fn malformed_files_are_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        write_agent(dir.path(), "good.md", "good-agent", "general", &[]);
        std::fs::write(dir.path().join("bad.md"), "no frontmatter here").unwrap();
        std::fs::write(dir.path().join("worse.md"), "---\n: : bad yaml [\n---\n").unwrap();

        let registry = AgentRegistry::new(vec![dir.path().to_path_buf()], 16);
        assert_eq!(registry.discover(false).unwrap(), 1);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let dir = TempDir::new().unwrap();
        let registry = AgentRegistry::new(vec![dir.path().to_path_buf()], 16);
        let err = registry.get("ghost").unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[test]
    fn lru_eviction_reloads_from_disk() {
        let dir = TempDir::new().unwrap();
        for i in 0..4 {
            write_agent(dir.path(), &format!("a{i}.md"), &format!("agent-{i}"), "general", &[]);
        }

        let registry = AgentRegistry::new(vec![dir.path().to_path_buf()], 2);
        for i in 0..4 {
            registry.get(&format!("agent-{i}")).unwrap();
        }
        // Everything is still reachable despite the tiny ceiling
        for i in 0..4 {
            assert_eq!(registry.get(&format!("agent-{i}")).unwrap().id, format!("agent-{i}"));
        }
        let state = registry.state.read().unwrap();
        assert!(state.cache.len() <= 2);
    }

    #[test]
    fn all_returns_stable_id_order() {
        let dir = TempDir::new().unwrap();
        write_agent(dir.path(), "z.md", "zeta", "general", &[]);
        write_agent(dir.path(), "a.md", "alpha", "general", &[]);

        let registry = AgentRegistry::new(vec![dir.path().to_path_buf()], 16);
        let ids: Vec<String> = registry.all().unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["alpha", "zeta"]);
    }
}
