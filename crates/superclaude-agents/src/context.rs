//! Task context derivation.
//!
//! A [`TaskContext`] is derived deterministically from the command text and
//! the working directory: same inputs, same context.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Deterministic facts about the task, extracted before agent selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskContext {
    /// The full task text (command body plus positional args).
    pub text: String,
    /// Lowercased alphanumeric tokens from the text, deduplicated.
    pub keywords: Vec<String>,
    pub file_paths: Vec<String>,
    pub file_extensions: Vec<String>,
    pub detected_languages: Vec<String>,
    pub detected_frameworks: Vec<String>,
}

impl TaskContext {
    /// Derive a context from task text and the working directory.
    #[must_use]
    pub fn derive(text: &str, args: &[String], working_dir: &Path) -> Self {
        let full_text = if args.is_empty() {
            text.to_string()
        } else {
            format!("{} {}", text, args.join(" "))
        };

        let keywords = tokenize(&full_text);

        let mut file_paths = Vec::new();
        let mut extensions: BTreeSet<String> = BTreeSet::new();
        for arg in args {
            if looks_like_path(arg) {
                file_paths.push(arg.clone());
                if let Some(ext) = Path::new(arg).extension().and_then(|e| e.to_str()) {
                    extensions.insert(ext.to_ascii_lowercase());
                }
            }
        }

        let mut languages: BTreeSet<String> = extensions
            .iter()
            .filter_map(|ext| language_for_extension(ext))
            .map(str::to_string)
            .collect();
        let mut frameworks: BTreeSet<String> = BTreeSet::new();
        probe_manifests(working_dir, &mut languages, &mut frameworks);

        Self {
            text: full_text,
            keywords,
            file_paths,
            file_extensions: extensions.into_iter().collect(),
            detected_languages: languages.into_iter().collect(),
            detected_frameworks: frameworks.into_iter().collect(),
        }
    }

    /// A context with nothing to go on; selection returns the fallback.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Categories implied by the keywords, used for category matching.
    #[must_use]
    pub fn implied_categories(&self) -> Vec<String> {
        let mut categories = BTreeSet::new();
        for keyword in &self.keywords {
            for (term, category) in CATEGORY_HINTS {
                if keyword == term {
                    categories.insert((*category).to_string());
                }
            }
        }
        categories.into_iter().collect()
    }
}

/// Keyword → implied category table.
const CATEGORY_HINTS: &[(&str, &str)] = &[
    ("security", "security"),
    ("vulnerability", "security"),
    ("auth", "security"),
    ("authentication", "security"),
    ("login", "security"),
    ("test", "quality"),
    ("tests", "quality"),
    ("coverage", "quality"),
    ("refactor", "quality"),
    ("frontend", "frontend"),
    ("ui", "frontend"),
    ("component", "frontend"),
    ("api", "backend"),
    ("backend", "backend"),
    ("endpoint", "backend"),
    ("database", "backend"),
    ("deploy", "devops"),
    ("deployment", "devops"),
    ("docker", "devops"),
    ("pipeline", "devops"),
    ("infra", "devops"),
    ("document", "documentation"),
    ("documentation", "documentation"),
    ("readme", "documentation"),
    ("analyze", "analysis"),
    ("analysis", "analysis"),
    ("performance", "performance"),
    ("optimize", "performance"),
    ("architecture", "architecture"),
    ("design", "architecture"),
];

/// Lowercased alphanumeric tokens, order-preserving, deduplicated.
fn tokenize(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut tokens = Vec::new();
    for raw in text.split(|c: char| !c.is_ascii_alphanumeric()) {
        if raw.len() < 2 {
            continue;
        }
        let token = raw.to_ascii_lowercase();
        if seen.insert(token.clone()) {
            tokens.push(token);
        }
    }
    tokens
}

fn looks_like_path(arg: &str) -> bool {
    arg.contains('/') || Path::new(arg).extension().is_some()
}

fn language_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "rs" => Some("rust"),
        "py" => Some("python"),
        "js" | "jsx" | "mjs" => Some("javascript"),
        "ts" | "tsx" => Some("typescript"),
        "go" => Some("go"),
        "java" => Some("java"),
        "rb" => Some("ruby"),
        "c" | "h" => Some("c"),
        "cc" | "cpp" | "hpp" => Some("cpp"),
        "cs" => Some("csharp"),
        "swift" => Some("swift"),
        "kt" => Some("kotlin"),
        _ => None,
    }
}

/// Detect languages and frameworks from build manifests in the working
/// directory. Only the top level is probed; selection needs hints, not a
/// full dependency graph.
fn probe_manifests(
    working_dir: &Path,
    languages: &mut BTreeSet<String>,
    frameworks: &mut BTreeSet<String>,
) {
    let probe = |name: &str| -> Option<String> {
        let path = working_dir.join(name);
        path.is_file()
            .then(|| std::fs::read_to_string(&path).unwrap_or_default())
    };

    if let Some(manifest) = probe("Cargo.toml") {
        languages.insert("rust".to_string());
        for framework in ["axum", "actix-web", "rocket", "tokio", "warp"] {
            if manifest.contains(framework) {
                frameworks.insert(framework.to_string());
            }
        }
    }
    if let Some(manifest) = probe("package.json") {
        languages.insert("javascript".to_string());
        for framework in ["react", "vue", "svelte", "next", "express"] {
            if manifest.contains(&format!("\"{framework}\"")) {
                frameworks.insert(framework.to_string());
            }
        }
    }
    if probe("pyproject.toml").is_some() || probe("requirements.txt").is_some() {
        languages.insert("python".to_string());
    }
    if probe("go.mod").is_some() {
        languages.insert("go".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn derivation_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let args = vec!["src/auth.rs".to_string()];
        let a = TaskContext::derive("add login security", &args, dir.path());
        let b = TaskContext::derive("add login security", &args, dir.path());
        assert_eq!(a.keywords, b.keywords);
        assert_eq!(a.detected_languages, b.detected_languages);
    }

    #[test]
    fn keywords_are_lowercased_and_deduplicated() {
        let dir = TempDir::new().unwrap();
        let ctx = TaskContext::derive("Add Auth AUTH auth endpoint", &[], dir.path());
        let auth_count = ctx.keywords.iter().filter(|k| *k == "auth").count();
        assert_eq!(auth_count, 1);
        assert!(ctx.keywords.contains(&"endpoint".to_string()));
    }

    #[test]
    fn path_args_yield_extensions_and_languages() {
        let dir = TempDir::new().unwrap();
        let args = vec!["src/main.rs".to_string(), "web/app.tsx".to_string()];
        let ctx = TaskContext::derive("fix", &args, dir.path());
        assert_eq!(ctx.file_paths.len(), 2);
        assert!(ctx.file_extensions.contains(&"rs".to_string()));
        assert!(ctx.detected_languages.contains(&"rust".to_string()));
        assert!(ctx.detected_languages.contains(&"typescript".to_string()));
    }

    #[test]
    fn cargo_manifest_probe_detects_rust_and_frameworks() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("Cargo.toml"),
            "[dependencies]\naxum = \"0.7\"\ntokio = \"1\"\n",
        )
        .unwrap();
        let ctx = TaskContext::derive("add endpoint", &[], dir.path());
        assert!(ctx.detected_languages.contains(&"rust".to_string()));
        assert!(ctx.detected_frameworks.contains(&"axum".to_string()));
    }

    #[test]
    fn implied_categories_from_keywords() {
        let dir = TempDir::new().unwrap();
        let ctx = TaskContext::derive("add login auth to the api", &[], dir.path());
        let categories = ctx.implied_categories();
        assert!(categories.contains(&"security".to_string()));
        assert!(categories.contains(&"backend".to_string()));
    }

    #[test]
    fn empty_text_is_empty_context() {
        let dir = TempDir::new().unwrap();
        let ctx = TaskContext::derive("", &[], dir.path());
        assert!(ctx.is_empty());
    }
}
