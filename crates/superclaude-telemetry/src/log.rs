//! The append-only event log.
//!
//! Events flow `append → bounded buffer → sinks`. The buffer makes the log
//! tolerant of slow sinks: when full, the oldest non-terminal event is
//! dropped; terminal events (`assessment.final`, `run.finished`) are always
//! retained and always flushed.

use std::collections::{HashMap, VecDeque};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::warn;

use superclaude_redaction::SecretRedactor;
use superclaude_util::error::TelemetryError;
use superclaude_util::ids::RunId;

use crate::event::{Event, EventKind};

/// Destination for emitted events.
pub trait EventSink: Send + Sync {
    /// Write one event. A sink that cannot keep up may return an error; the
    /// log will retry the event on the next flush.
    fn emit(&self, event: &Event) -> Result<(), TelemetryError>;

    /// Flush any internal buffering.
    fn flush(&self) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// JSONL file sink. Appends serialize across processes via an advisory
/// file lock, so multiple engine invocations can share one `events.jsonl`.
pub struct FileSink {
    path: Utf8PathBuf,
}

impl FileSink {
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl EventSink for FileSink {
    fn emit(&self, event: &Event) -> Result<(), TelemetryError> {
        if let Some(parent) = self.path.parent() {
            superclaude_util::paths::ensure_dir_all(parent).map_err(|e| {
                TelemetryError::WriteFailed {
                    path: self.path.to_string(),
                    reason: e.to_string(),
                }
            })?;
        }

        let line = serde_json::to_string(event).map_err(|e| TelemetryError::Serialize {
            reason: e.to_string(),
        })?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_std_path())
            .map_err(|e| TelemetryError::WriteFailed {
                path: self.path.to_string(),
                reason: e.to_string(),
            })?;

        let mut lock = fd_lock::RwLock::new(file);
        let mut guard = lock.write().map_err(|e| TelemetryError::LockFailed {
            reason: e.to_string(),
        })?;

        guard
            .write_all(line.as_bytes())
            .and_then(|()| guard.write_all(b"\n"))
            .map_err(|e| TelemetryError::WriteFailed {
                path: self.path.to_string(),
                reason: e.to_string(),
            })
    }
}

/// In-process queue sink for tests and embedding.
#[derive(Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("memory sink poisoned").clone()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &Event) -> Result<(), TelemetryError> {
        self.events
            .lock()
            .expect("memory sink poisoned")
            .push(event.clone());
        Ok(())
    }
}

struct LogState {
    seq_by_run: HashMap<String, u64>,
    buffer: VecDeque<Event>,
    dropped: u64,
}

/// The engine's event log.
///
/// Single writer per run; safe for shared use across the executor and the
/// router's consensus voters.
pub struct EventLog {
    state: Mutex<LogState>,
    sinks: Vec<Box<dyn EventSink>>,
    redactor: Arc<SecretRedactor>,
    buffer_cap: usize,
}

impl EventLog {
    #[must_use]
    pub fn new(
        sinks: Vec<Box<dyn EventSink>>,
        redactor: Arc<SecretRedactor>,
        buffer_cap: usize,
    ) -> Self {
        Self {
            state: Mutex::new(LogState {
                seq_by_run: HashMap::new(),
                buffer: VecDeque::new(),
                dropped: 0,
            }),
            sinks,
            redactor,
            buffer_cap: buffer_cap.max(1),
        }
    }

    /// Append an event for a run.
    ///
    /// Assigns the next per-run sequence number, stamps the time, redacts
    /// the payload, and buffers the event. Terminal events force a flush.
    pub fn append(&self, run_id: &RunId, kind: EventKind, mut payload: serde_json::Value) -> u64 {
        self.redactor.redact_value(&mut payload);

        let mut state = self.state.lock().expect("event log poisoned");
        let seq = state
            .seq_by_run
            .entry(run_id.as_str().to_string())
            .and_modify(|s| *s += 1)
            .or_insert(1);
        let seq = *seq;

        state
            .buffer
            .push_back(Event::new(seq, run_id.clone(), kind, payload));

        // Drop-oldest under pressure, but never a terminal event
        while state.buffer.len() > self.buffer_cap {
            let victim = state
                .buffer
                .iter()
                .position(|e| !e.kind.is_terminal());
            match victim {
                Some(idx) => {
                    state.buffer.remove(idx);
                    state.dropped += 1;
                }
                None => break,
            }
        }

        let force = kind.is_terminal();
        drop(state);

        if force {
            if let Err(e) = self.flush() {
                warn!(error = %e, "terminal event flush failed");
            }
        } else {
            // Best-effort; slow sinks just leave events buffered
            let _ = self.flush();
        }

        seq
    }

    /// Drain the buffer into every sink. Events stay buffered if any sink
    /// rejects them, preserving order for the next attempt.
    pub fn flush(&self) -> Result<(), TelemetryError> {
        let mut state = self.state.lock().expect("event log poisoned");
        while let Some(event) = state.buffer.front().cloned() {
            for sink in &self.sinks {
                sink.emit(&event)?;
            }
            state.buffer.pop_front();
        }
        for sink in &self.sinks {
            sink.flush()?;
        }
        Ok(())
    }

    /// Number of events dropped under buffer pressure so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.state.lock().expect("event log poisoned").dropped
    }
}
