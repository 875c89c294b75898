//! Run identifiers.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Process-local counter so two runs started in the same second stay distinct.
static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for one end-to-end command execution.
///
/// Format: `<utc yyyymmddThhmmss>-<8 hex>`. Lexicographic order is
/// chronological, which keeps `runs/` directory listings readable and makes
/// the newest run easy to find without parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generate a fresh run id.
    ///
    /// The suffix is a BLAKE3 digest over the timestamp, process id, and a
    /// process-local counter; collisions across concurrent processes on the
    /// same host are vanishingly unlikely and harmless within one (the run
    /// directory create would fail loudly).
    #[must_use]
    pub fn generate() -> Self {
        let now = Utc::now();
        let stamp = now.format("%Y%m%dT%H%M%S").to_string();
        let counter = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);

        let mut hasher = blake3::Hasher::new();
        hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes().as_ref());
        hasher.update(&std::process::id().to_le_bytes());
        hasher.update(&counter.to_le_bytes());
        let digest = hasher.finalize();
        let short = &digest.to_hex()[..8];

        Self(format!("{stamp}-{short}"))
    }

    /// Construct from a known string (deserialization, tests).
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = RunId::generate();
        let b = RunId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn id_shape_is_timestamp_dash_hex() {
        let id = RunId::generate();
        let (stamp, hex) = id.as_str().split_once('-').expect("dash separator");
        assert_eq!(stamp.len(), 15);
        assert!(stamp.contains('T'));
        assert_eq!(hex.len(), 8);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn serde_round_trip_is_transparent() {
        let id = RunId::from_string("20260801T120000-abcd1234");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"20260801T120000-abcd1234\"");
        let back: RunId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
