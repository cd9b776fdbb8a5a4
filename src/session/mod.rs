//! Attack-session module.
//!
//! An attack session is one simulation run: an ephemeral listener bound to
//! a dynamically allocated port plus an append-only buffer of captured
//! events. Sessions are owned by the [`SessionRegistry`] and torn down on
//! explicit stop or engine shutdown.

pub mod listener;
pub mod port;
pub mod registry;

pub use listener::ListenerContext;
pub use port::PortAllocator;
pub use registry::SessionRegistry;

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::correlate::AuthAnalysis;

// ============================================================================
// Session kind and lifecycle state
// ============================================================================

/// The attack variant a session simulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Credential-harvest page served on `GET/POST /login`.
    Phishing,
    /// Intercepting proxy that captures any method/path.
    Mitm,
}

impl SessionKind {
    /// Stable string form used in events, metrics labels, and records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Phishing => "phishing",
            Self::Mitm => "mitm",
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session lifecycle state.
///
/// `Starting → Running → Stopped`; `Running → Stopped` is the only other
/// transition. There is no retry-from-stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Port allocated, listener not yet bound.
    Starting,
    /// Listener accepting connections.
    Running,
    /// Listener closed.
    Stopped,
    /// Listener never came up; recorded for the persisted audit trail.
    Failed,
}

impl SessionState {
    const fn to_u8(self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::Running => 1,
            Self::Stopped => 2,
            Self::Failed => 3,
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Starting,
            1 => Self::Running,
            3 => Self::Failed,
            _ => Self::Stopped,
        }
    }

    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

// ============================================================================
// Captured events
// ============================================================================

/// Best-effort decoded request body.
///
/// Decode failures are swallowed and the raw text kept — the correlator
/// scans serialized text either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "snake_case")]
pub enum CapturedBody {
    /// Parsed `application/json` body.
    Json(serde_json::Value),
    /// Parsed `application/x-www-form-urlencoded` body.
    Form(BTreeMap<String, String>),
    /// Undecodable or unrecognized content type; raw text kept.
    Raw(String),
    /// No body.
    Empty,
}

impl CapturedBody {
    /// Serialized text used for the heuristic auth scan.
    #[must_use]
    pub fn scan_text(&self) -> String {
        match self {
            Self::Json(value) => value.to_string(),
            Self::Form(map) => serde_json::to_string(map).unwrap_or_default(),
            Self::Raw(text) => text.clone(),
            Self::Empty => String::new(),
        }
    }
}

/// One captured inbound request.
///
/// Immutable once appended; each session holds an append-only sequence
/// in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedEvent {
    /// When the request arrived.
    pub timestamp: DateTime<Utc>,
    /// HTTP method.
    pub method: String,
    /// Request path including query string.
    pub path: String,
    /// Header snapshot at capture time.
    pub headers: Vec<(String, String)>,
    /// Best-effort decoded body.
    pub body: CapturedBody,
    /// Derived auth classification.
    pub analysis: AuthAnalysis,
}

// ============================================================================
// Session core
// ============================================================================

/// Shared mutable core of one attack session.
///
/// Shared between the registry entry and the listener's request handlers;
/// all fields are independently synchronized so handlers never contend on
/// a session-wide lock.
pub struct SessionInner {
    /// Opaque unique session id.
    pub id: Uuid,
    /// Attack variant.
    pub kind: SessionKind,
    /// Port the listener bound.
    pub port: u16,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    state: AtomicU8,
    events: Mutex<Vec<CapturedEvent>>,
    success: AtomicBool,
    last_activity: Mutex<Option<DateTime<Utc>>>,
}

impl SessionInner {
    /// Creates a new session core in the `Starting` state.
    #[must_use]
    pub fn new(id: Uuid, kind: SessionKind, port: u16) -> Self {
        Self {
            id,
            kind,
            port,
            created_at: Utc::now(),
            state: AtomicU8::new(SessionState::Starting.to_u8()),
            events: Mutex::new(Vec::new()),
            success: AtomicBool::new(false),
            last_activity: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Transitions to a new lifecycle state.
    pub fn set_state(&self, state: SessionState) {
        self.state.store(state.to_u8(), Ordering::SeqCst);
    }

    /// Whether auth material has been captured on this session.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.success.load(Ordering::SeqCst)
    }

    /// Flips the success flag; returns `true` only for the first flip.
    ///
    /// Repeated discoveries keep the session successful — the flag never
    /// un-sets.
    pub fn mark_success(&self) -> bool {
        !self.success.swap(true, Ordering::SeqCst)
    }

    /// Appends a captured event, preserving arrival order.
    ///
    /// Allowed in any lifecycle state: an in-flight request finishing
    /// after `stop()` still records its event without reopening the
    /// listener.
    pub fn append_event(&self, event: CapturedEvent) {
        let timestamp = event.timestamp;
        {
            let mut events = self.events.lock().expect("event buffer lock poisoned");
            events.push(event);
        }
        let mut last = self
            .last_activity
            .lock()
            .expect("last_activity lock poisoned");
        *last = Some(timestamp);
    }

    /// Number of captured events.
    #[must_use]
    pub fn captured_count(&self) -> usize {
        self.events.lock().expect("event buffer lock poisoned").len()
    }

    /// Snapshot of the captured event sequence.
    #[must_use]
    pub fn events_snapshot(&self) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .expect("event buffer lock poisoned")
            .clone()
    }

    /// Timestamp of the most recent capture, if any.
    #[must_use]
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        *self
            .last_activity
            .lock()
            .expect("last_activity lock poisoned")
    }

    /// Status view served by `GET /sessions/{id}`.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.id,
            kind: self.kind,
            port: self.port,
            status: self.state(),
            captured_count: self.captured_count(),
            last_activity: self.last_activity(),
            success: self.succeeded(),
        }
    }
}

impl std::fmt::Debug for SessionInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionInner")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("port", &self.port)
            .field("state", &self.state())
            .field("captured", &self.captured_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// API-facing views
// ============================================================================

/// Summary returned on session creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// New session id.
    pub session_id: Uuid,
    /// URL of the ephemeral listener.
    pub listener_url: String,
    /// Lifecycle state at return time.
    pub status: SessionState,
}

/// Status payload for a session query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Session id.
    pub session_id: Uuid,
    /// Attack variant.
    pub kind: SessionKind,
    /// Listener port.
    pub port: u16,
    /// Lifecycle state.
    pub status: SessionState,
    /// Number of captured events.
    pub captured_count: usize,
    /// Timestamp of the most recent capture.
    pub last_activity: Option<DateTime<Utc>>,
    /// Whether auth material has been captured.
    pub success: bool,
}

/// Options accepted on session creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Target descriptor (e.g. the phished address pre-filled into the
    /// harvest page).
    pub target: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::AuthAnalysis;

    fn event_at(method: &str) -> CapturedEvent {
        CapturedEvent {
            timestamp: Utc::now(),
            method: method.to_string(),
            path: "/login".to_string(),
            headers: vec![],
            body: CapturedBody::Empty,
            analysis: AuthAnalysis::default(),
        }
    }

    #[test]
    fn new_session_is_starting_and_unsuccessful() {
        let inner = SessionInner::new(Uuid::new_v4(), SessionKind::Phishing, 9090);
        assert_eq!(inner.state(), SessionState::Starting);
        assert!(!inner.succeeded());
        assert_eq!(inner.captured_count(), 0);
        assert!(inner.last_activity().is_none());
    }

    #[test]
    fn mark_success_flips_exactly_once() {
        let inner = SessionInner::new(Uuid::new_v4(), SessionKind::Phishing, 9090);
        assert!(inner.mark_success());
        assert!(!inner.mark_success());
        assert!(inner.succeeded());
    }

    #[test]
    fn events_preserve_append_order() {
        let inner = SessionInner::new(Uuid::new_v4(), SessionKind::Mitm, 9091);
        inner.append_event(event_at("GET"));
        inner.append_event(event_at("POST"));
        inner.append_event(event_at("PUT"));

        let events = inner.events_snapshot();
        let methods: Vec<&str> = events.iter().map(|e| e.method.as_str()).collect();
        assert_eq!(methods, ["GET", "POST", "PUT"]);
        assert!(inner.last_activity().is_some());
    }

    #[test]
    fn append_allowed_after_stop() {
        let inner = SessionInner::new(Uuid::new_v4(), SessionKind::Mitm, 9091);
        inner.set_state(SessionState::Stopped);
        inner.append_event(event_at("POST"));
        assert_eq!(inner.captured_count(), 1);
        assert_eq!(inner.state(), SessionState::Stopped);
    }

    #[test]
    fn state_round_trips_through_u8() {
        for state in [
            SessionState::Starting,
            SessionState::Running,
            SessionState::Stopped,
            SessionState::Failed,
        ] {
            assert_eq!(SessionState::from_u8(state.to_u8()), state);
        }
    }

    #[test]
    fn scan_text_covers_all_encodings() {
        let json = CapturedBody::Json(serde_json::json!({"password": "x"}));
        assert!(json.scan_text().contains("password"));

        let form = CapturedBody::Form(BTreeMap::from([(
            "username".to_string(),
            "alice".to_string(),
        )]));
        assert!(form.scan_text().contains("username"));

        let raw = CapturedBody::Raw("otp=123456".to_string());
        assert!(raw.scan_text().contains("otp"));

        assert!(CapturedBody::Empty.scan_text().is_empty());
    }
}
