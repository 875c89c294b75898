//! Per-run evidence store.
//!
//! Each run owns a directory under the telemetry base:
//!
//! ```text
//! <base>/<run_id>/
//!   command.json  signals.json  assessment.json  consensus.json
//!   stages/<stage>.json
//!   worktree/
//! ```
//!
//! Artifacts are serialized to JCS canonical JSON (RFC 8785), redacted,
//! written atomically, and digested with BLAKE3 so references are stable
//! across platforms. Files are never rewritten after the run closes.

use std::sync::Arc;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use superclaude_redaction::SecretRedactor;
use superclaude_util::atomic_write::write_file_atomic;
use superclaude_util::ids::RunId;
use superclaude_util::paths::RunLayout;

/// Reference to one persisted artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// What the artifact is (`command`, `signals`, `stage.security`, …).
    pub kind: String,
    pub path: Utf8PathBuf,
    /// BLAKE3 hex digest of the canonical bytes.
    pub digest: String,
}

/// The aggregate evidence produced by one completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub run_id: RunId,
    pub command: serde_json::Value,
    pub artifacts: Vec<ArtifactRef>,
    pub signals: serde_json::Value,
    pub assessment: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus: Option<serde_json::Value>,
}

/// Factory for per-run evidence directories.
pub struct EvidenceStore {
    base: Utf8PathBuf,
    redactor: Arc<SecretRedactor>,
}

impl EvidenceStore {
    #[must_use]
    pub fn new(base: impl Into<Utf8PathBuf>, redactor: Arc<SecretRedactor>) -> Self {
        Self {
            base: base.into(),
            redactor,
        }
    }

    #[must_use]
    pub fn base(&self) -> &Utf8Path {
        &self.base
    }

    /// Open (create) the evidence directory for a run.
    pub fn open_run(&self, run_id: &RunId) -> Result<RunEvidence> {
        let layout = RunLayout::new(&self.base, run_id);
        layout.ensure()?;
        Ok(RunEvidence {
            layout,
            redactor: Arc::clone(&self.redactor),
        })
    }
}

/// Handle to one run's evidence directory. Single writer per run.
pub struct RunEvidence {
    layout: RunLayout,
    redactor: Arc<SecretRedactor>,
}

impl RunEvidence {
    #[must_use]
    pub fn run_dir(&self) -> &Utf8Path {
        self.layout.run_dir()
    }

    #[must_use]
    pub fn worktree_dir(&self) -> Utf8PathBuf {
        self.layout.worktree_dir()
    }

    pub fn write_command<T: Serialize>(&self, value: &T) -> Result<ArtifactRef> {
        self.write_canonical("command", self.layout.command_json(), value)
    }

    pub fn write_signals<T: Serialize>(&self, value: &T) -> Result<ArtifactRef> {
        self.write_canonical("signals", self.layout.signals_json(), value)
    }

    pub fn write_assessment<T: Serialize>(&self, value: &T) -> Result<ArtifactRef> {
        self.write_canonical("assessment", self.layout.assessment_json(), value)
    }

    pub fn write_consensus<T: Serialize>(&self, value: &T) -> Result<ArtifactRef> {
        self.write_canonical("consensus", self.layout.consensus_json(), value)
    }

    pub fn write_stage<T: Serialize>(&self, stage: &str, value: &T) -> Result<ArtifactRef> {
        self.write_canonical(
            &format!("stage.{stage}"),
            self.layout.stage_json(stage),
            value,
        )
    }

    /// Persist one loop iteration's raw output under `iterations/`.
    pub fn write_iteration<T: Serialize>(&self, index: u32, value: &T) -> Result<ArtifactRef> {
        let path = self
            .layout
            .run_dir()
            .join(format!("iterations/iteration-{index}.json"));
        self.write_canonical(&format!("iteration.{index}"), path, value)
    }

    /// Serialize → redact → canonicalize → atomic write → digest.
    fn write_canonical<T: Serialize>(
        &self,
        kind: &str,
        path: Utf8PathBuf,
        value: &T,
    ) -> Result<ArtifactRef> {
        let mut json_value = serde_json::to_value(value)
            .with_context(|| format!("Failed to serialize {kind} evidence"))?;
        self.redactor.redact_value(&mut json_value);

        let json_bytes = serde_json_canonicalizer::to_vec(&json_value)
            .with_context(|| format!("Failed to canonicalize {kind} evidence"))?;
        let content = String::from_utf8(json_bytes)
            .with_context(|| format!("Canonical {kind} JSON was not UTF-8"))?;

        write_file_atomic(&path, &content)
            .with_context(|| format!("Failed to write {kind} evidence"))?;

        let digest = blake3::hash(content.as_bytes()).to_hex().to_string();
        Ok(ArtifactRef {
            kind: kind.to_string(),
            path,
            digest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> EvidenceStore {
        let base = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        EvidenceStore::new(base, Arc::new(SecretRedactor::new()))
    }

    #[test]
    fn artifacts_land_in_spec_layout() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let run = store.open_run(&RunId::from_string("r1")).unwrap();

        run.write_command(&json!({"name": "implement"})).unwrap();
        run.write_signals(&json!({"build_pass": true})).unwrap();
        run.write_assessment(&json!({"final_score": 92.0})).unwrap();
        let stage_ref = run.write_stage("security", &json!({"passed": true})).unwrap();

        assert!(run.run_dir().join("command.json").as_std_path().exists());
        assert!(run.run_dir().join("signals.json").as_std_path().exists());
        assert!(run.run_dir().join("assessment.json").as_std_path().exists());
        assert!(run
            .run_dir()
            .join("stages/security.json")
            .as_std_path()
            .exists());
        assert_eq!(stage_ref.kind, "stage.security");
        assert_eq!(stage_ref.digest.len(), 64);
    }

    #[test]
    fn canonical_output_is_key_sorted() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let run = store.open_run(&RunId::from_string("r1")).unwrap();

        run.write_signals(&json!({"zeta": 1, "alpha": 2})).unwrap();
        let content =
            std::fs::read_to_string(run.run_dir().join("signals.json").as_std_path()).unwrap();
        let alpha = content.find("alpha").unwrap();
        let zeta = content.find("zeta").unwrap();
        assert!(alpha < zeta, "JCS output must sort keys");
    }

    #[test]
    fn identical_values_share_a_digest() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let run_a = store.open_run(&RunId::from_string("a")).unwrap();
        let run_b = store.open_run(&RunId::from_string("b")).unwrap();

        let ra = run_a.write_signals(&json!({"tests": 3})).unwrap();
        let rb = run_b.write_signals(&json!({"tests": 3})).unwrap();
        assert_eq!(ra.digest, rb.digest);
        assert_ne!(ra.path, rb.path);
    }

    #[test]
    fn secrets_are_redacted_before_persistence() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let run = store.open_run(&RunId::from_string("r1")).unwrap();

        run.write_consensus(&json!({
            "votes": [{"model": "m", "authorization": "Bearer abc123456789"}]
        }))
        .unwrap();

        let content =
            std::fs::read_to_string(run.run_dir().join("consensus.json").as_std_path()).unwrap();
        assert!(!content.contains("abc123456789"));
        assert!(content.contains("[REDACTED]"));
    }
}
