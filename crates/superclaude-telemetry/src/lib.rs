//! Telemetry and evidence for the superclaude engine.
//!
//! Two halves share this crate: the append-only JSONL event log (one file
//! for all runs, monotonic sequence numbers per run) and the per-run
//! evidence store (canonical-JSON artifacts under `<base>/<run_id>/`).
//! Every payload is redacted before it touches disk.

mod evidence;
mod event;
mod log;

pub use evidence::{ArtifactRef, EvidenceRecord, EvidenceStore, RunEvidence};
pub use event::{Event, EventKind};
pub use log::{EventLog, EventSink, FileSink, MemorySink};
