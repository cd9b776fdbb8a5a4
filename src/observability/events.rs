//! Structured event stream for `Lurebox`.
//!
//! Discrete, typed events emitted during engine operation. Events are
//! serialized as newline-delimited JSON (JSONL) and include a monotonically
//! increasing sequence number for ordering guarantees.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// A discrete event emitted during `Lurebox` operation.
///
/// Each variant is tagged with `"type"` when serialized to JSON so consumers
/// can dispatch on the event kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The engine has started and the control API is accepting requests.
    EngineStarted {
        /// When the engine started.
        timestamp: DateTime<Utc>,
        /// Control API bind address.
        control_addr: String,
    },

    /// The engine has stopped.
    EngineStopped {
        /// When the engine stopped.
        timestamp: DateTime<Utc>,
        /// Human-readable stop reason.
        reason: String,
    },

    /// An attack session was created and its listener is running.
    SessionCreated {
        /// When the session was created.
        timestamp: DateTime<Utc>,
        /// Session id.
        session_id: Uuid,
        /// Session kind (`"phishing"` or `"mitm"`).
        kind: String,
        /// Port the ephemeral listener bound.
        port: u16,
    },

    /// An attack session was stopped and its listener closed.
    SessionStopped {
        /// When the session stopped.
        timestamp: DateTime<Utc>,
        /// Session id.
        session_id: Uuid,
        /// Stop reason (`"explicit"` or `"shutdown"`).
        reason: String,
    },

    /// Captured traffic was classified as containing auth material.
    CredentialCaptured {
        /// When the capture happened.
        timestamp: DateTime<Utc>,
        /// Session that captured it.
        session_id: Uuid,
        /// Classified auth kind (e.g. `"credentials"`).
        auth_kind: String,
    },

    /// An admission check denied an action.
    AdmissionDenied {
        /// When the check ran.
        timestamp: DateTime<Utc>,
        /// Throttled action type.
        action: String,
        /// Canonical identifier that was denied.
        identifier: String,
        /// Seconds until the window admits the identifier again.
        retry_after_seconds: u64,
    },

    /// A lockout record escalated to a higher level.
    LockoutEscalated {
        /// When the escalation happened.
        timestamp: DateTime<Utc>,
        /// Locked-out identifier.
        identifier: String,
        /// New lockout level.
        level: String,
        /// Cumulative failure count.
        failure_count: u32,
    },

    /// An alert event was dispatched.
    AlertDispatched {
        /// When the alert fired.
        timestamp: DateTime<Utc>,
        /// Alert id.
        alert_id: Uuid,
        /// Alert type (e.g. `"failed_logins"`).
        alert_type: String,
        /// Severity tier.
        severity: String,
    },
}

// ---------------------------------------------------------------------------
// Envelope (adds sequence number via serde flatten)
// ---------------------------------------------------------------------------

/// Wraps an [`Event`] with a monotonically increasing sequence number.
#[derive(Debug, Serialize)]
struct EventEnvelope {
    /// Zero-based, monotonically increasing sequence counter.
    sequence: u64,
    /// The wrapped event (flattened into the same JSON object).
    #[serde(flatten)]
    event: Event,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL event writer.
///
/// Each call to [`emit`](Self::emit) atomically increments the sequence
/// counter, serializes the event as a single JSON line, and flushes the
/// underlying writer. Serialization or I/O failures are silently dropped
/// because observability must never crash the engine.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

// Box<dyn Write> is not Debug — provide a manual impl.
impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Creates an emitter that writes to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates an emitter that writes to stderr.
    ///
    /// This is the default for engine operation — stderr does not conflict
    /// with listener or control API traffic.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Creates an emitter that silently discards all events.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Creates an emitter that writes to a file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created or opened.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Emits an event as a single JSONL line.
    ///
    /// Failures are silently dropped — observability must not crash the
    /// engine.
    pub fn emit(&self, event: Event) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope {
            sequence: seq,
            event,
        };

        if let Ok(mut w) = self.writer.lock() {
            if let Ok(line) = serde_json::to_string(&envelope) {
                let _ = writeln!(w, "{line}");
                let _ = w.flush();
            }
        }
    }

    /// Returns the number of events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
