//! Command discovery and lookup.
//!
//! Commands live in a directory of Markdown files: frontmatter metadata,
//! opaque playbook body. The registry caches metadata in memory; the only
//! invalidation is an explicit [`CommandRegistry::reload`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use globset::{Glob, GlobMatcher};
use tracing::{debug, warn};

use superclaude_util::error::{ParseError, RegistryError};
use superclaude_util::frontmatter::split_frontmatter;

use crate::parser::{parse_raw, validate_invocation};
use crate::types::{Command, CommandMetadata};

/// The command registry.
pub struct CommandRegistry {
    roots: Vec<PathBuf>,
    matcher: GlobMatcher,
    cache: RwLock<Option<BTreeMap<String, CommandMetadata>>>,
}

impl CommandRegistry {
    #[must_use]
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            matcher: Glob::new("*.md").expect("static glob").compile_matcher(),
            cache: RwLock::new(None),
        }
    }

    /// Look up a command's metadata by name.
    pub fn get(&self, name: &str) -> Result<Option<CommandMetadata>, RegistryError> {
        self.ensure_loaded()?;
        let cache = self.cache.read().expect("registry poisoned");
        Ok(cache.as_ref().and_then(|c| c.get(name).cloned()))
    }

    /// All known commands, sorted by name.
    pub fn list(&self) -> Result<Vec<CommandMetadata>, RegistryError> {
        self.ensure_loaded()?;
        let cache = self.cache.read().expect("registry poisoned");
        Ok(cache
            .as_ref()
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default())
    }

    /// Complete a prefix against `name` and `namespace:name`, sorted.
    pub fn complete(&self, prefix: &str) -> Result<Vec<String>, RegistryError> {
        self.ensure_loaded()?;
        let cache = self.cache.read().expect("registry poisoned");
        let mut out: Vec<String> = cache
            .as_ref()
            .map(|commands| {
                commands
                    .values()
                    .filter_map(|m| {
                        let qualified = format!("{}:{}", m.namespace, m.name);
                        if m.name.starts_with(prefix) || qualified.starts_with(prefix) {
                            Some(qualified)
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        out.sort();
        Ok(out)
    }

    /// Drop the cache; the next lookup re-reads from disk.
    pub fn reload(&self) {
        *self.cache.write().expect("registry poisoned") = None;
    }

    /// Parse a textual invocation end to end: grammar, registry lookup,
    /// flag validation.
    pub fn parse(&self, text: &str) -> Result<(Command, CommandMetadata), ParseError> {
        let raw = parse_raw(text)?;
        let metadata = self
            .get(&raw.name)
            .map_err(|e| ParseError::UnknownCommand {
                namespace: raw.namespace.clone(),
                name: format!("{} (registry error: {e})", raw.name),
            })?
            .ok_or_else(|| ParseError::UnknownCommand {
                namespace: raw.namespace.clone(),
                name: raw.name.clone(),
            })?;

        if metadata.namespace != raw.namespace {
            return Err(ParseError::UnknownCommand {
                namespace: raw.namespace.clone(),
                name: raw.name.clone(),
            });
        }

        let command = validate_invocation(&raw, &metadata)?;
        Ok((command, metadata))
    }

    fn ensure_loaded(&self) -> Result<(), RegistryError> {
        {
            let cache = self.cache.read().expect("registry poisoned");
            if cache.is_some() {
                return Ok(());
            }
        }

        let mut commands = BTreeMap::new();
        for root in &self.roots {
            if !root.is_dir() {
                debug!(root = %root.display(), "command directory absent, skipping");
                continue;
            }
            let entries = std::fs::read_dir(root).map_err(|e| RegistryError::DiscoveryFailed {
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
                match parse_command_file(&path) {
                    Ok(metadata) => {
                        commands.insert(metadata.name.clone(), metadata);
                    }
                    Err(reason) => {
                        warn!(path = %path.display(), reason, "skipping malformed command file");
                    }
                }
            }
        }

        *self.cache.write().expect("registry poisoned") = Some(commands);
        Ok(())
    }
}

fn parse_command_file(path: &Path) -> Result<CommandMetadata, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let (frontmatter, _body) =
        split_frontmatter(&content).ok_or_else(|| "missing frontmatter block".to_string())?;
    let metadata: CommandMetadata =
        serde_yaml::from_str(frontmatter).map_err(|e| e.to_string())?;
    if metadata.name.trim().is_empty() {
        return Err("command name is empty".to_string());
    }
    Ok(metadata)
}
