//! Attack-session registry.
//!
//! Single owner of all session state. Creation allocates a port, persists
//! the initial record, and starts the listener; stop is idempotent and
//! safe to race with creation during shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ListenerConfig;
use crate::defense::alert::{AlertDispatcher, AlertType};
use crate::error::SessionError;
use crate::observability::{Event, EventEmitter, metrics};
use crate::session::listener::{self, ListenerContext};
use crate::session::port::PortAllocator;
use crate::session::{
    CapturedEvent, SessionInner, SessionKind, SessionOptions, SessionState, SessionStatus,
    SessionSummary,
};
use crate::store::{LabStore, PersistedSession};

struct SessionEntry {
    inner: Arc<SessionInner>,
    cancel: CancellationToken,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

/// Owns every attack session for the lifetime of the engine.
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionEntry>,
    allocator: PortAllocator,
    config: ListenerConfig,
    store: Arc<dyn LabStore>,
    alerts: Arc<AlertDispatcher>,
    emitter: Arc<EventEmitter>,
    shutting_down: AtomicBool,
}

impl SessionRegistry {
    /// Creates a registry over the given listener config and services.
    #[must_use]
    pub fn new(
        config: ListenerConfig,
        store: Arc<dyn LabStore>,
        alerts: Arc<AlertDispatcher>,
        emitter: Arc<EventEmitter>,
    ) -> Self {
        let allocator = PortAllocator::new(
            config.bind_host.clone(),
            config.port_start,
            config.port_range,
        );
        Self {
            sessions: DashMap::new(),
            allocator,
            config,
            store,
            alerts,
            emitter,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Creates a session: allocate port, persist, start listener.
    ///
    /// A listener start failure rolls the persisted record to `failed`
    /// and surfaces as [`SessionError::CreateFailed`]; the registry keeps
    /// running either way. A session created while `stop_all` is in
    /// flight is stopped immediately and returned in the stopped state.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::CreateFailed`] when the listener cannot
    /// start.
    pub async fn create(
        self: &Arc<Self>,
        kind: SessionKind,
        options: SessionOptions,
    ) -> Result<SessionSummary, SessionError> {
        let id = Uuid::new_v4();
        let port = self.allocator.allocate().await;

        let tcp = match listener::bind(&self.config.bind_host, port).await {
            Ok(tcp) => tcp,
            Err(e) => {
                // Keep the audit trail: a session that never came up is
                // still recorded, in the failed state.
                let inner = SessionInner::new(id, kind, port);
                inner.set_state(SessionState::Failed);
                self.persist(&inner).await;
                tracing::warn!(session = %id, port, error = %e, "listener start failed");
                return Err(SessionError::CreateFailed(e.to_string()));
            }
        };
        let port = tcp.local_addr().map(|addr| addr.port()).unwrap_or(port);

        let inner = Arc::new(SessionInner::new(id, kind, port));
        self.persist(&inner).await;

        // Insert before serving so a request landing the instant the
        // listener task starts finds its session in the map.
        let cancel = CancellationToken::new();
        self.sessions.insert(
            id,
            SessionEntry {
                inner: Arc::clone(&inner),
                cancel: cancel.clone(),
                handle: std::sync::Mutex::new(None),
            },
        );

        let ctx = Arc::new(ListenerContext {
            registry: Arc::clone(self),
            session: Arc::clone(&inner),
            read_timeout: self.config.read_timeout(),
            max_body_bytes: self.config.max_body_bytes,
            target: options.target,
        });
        let handle = listener::serve(ctx, tcp, cancel);
        if let Some(entry) = self.sessions.get(&id) {
            *entry.handle.lock().expect("handle lock poisoned") = Some(handle);
        }

        inner.set_state(SessionState::Running);
        self.persist(&inner).await;

        metrics::record_session_created(kind.as_str());
        metrics::set_sessions_active(self.active_count());
        self.emitter.emit(Event::SessionCreated {
            timestamp: Utc::now(),
            session_id: id,
            kind: kind.as_str().to_owned(),
            port,
        });
        tracing::info!(session = %id, kind = kind.as_str(), port, "session created");

        // Lost race with stop_all: tear the new session down right away.
        if self.shutting_down.load(Ordering::SeqCst) {
            let _ = self.stop(id, "shutdown").await;
        }

        Ok(SessionSummary {
            session_id: id,
            listener_url: format!("http://{}:{port}", self.config.bind_host),
            status: inner.state(),
        })
    }

    /// Status of one session.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<SessionStatus> {
        self.sessions.get(&id).map(|entry| entry.inner.status())
    }

    /// Records a captured event against a session.
    ///
    /// The first event carrying auth material flips the session's success
    /// flag exactly once and fires a capture alert with severity derived
    /// from the classified kind. Recording against a stopped session is
    /// allowed; the listener stays down.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for an unknown id.
    pub async fn record_event(&self, id: Uuid, event: CapturedEvent) -> Result<(), SessionError> {
        let (inner, first_find) = {
            let entry = self.sessions.get(&id).ok_or(SessionError::NotFound(id))?;
            let inner = Arc::clone(&entry.inner);
            let first_find = event.analysis.found && inner.mark_success();
            inner.append_event(event.clone());
            (inner, first_find)
        };

        metrics::record_capture(inner.kind.as_str(), event.analysis.found);

        if first_find {
            let kind = event.analysis.kind;
            let kind_str = kind.map_or("unknown", |k| k.as_str());
            self.emitter.emit(Event::CredentialCaptured {
                timestamp: event.timestamp,
                session_id: id,
                auth_kind: kind_str.to_owned(),
            });
            tracing::info!(session = %id, auth_kind = kind_str, "auth material captured");

            if let Some(kind) = kind {
                self.alerts
                    .trigger(
                        AlertType::CredentialCapture,
                        &format!("session:{id}"),
                        serde_json::json!({
                            "session_kind": inner.kind.as_str(),
                            "auth_kind": kind.as_str(),
                            "path": event.path,
                            "evidence": event.analysis.evidence,
                        }),
                        kind.severity(),
                    )
                    .await;
            }
        }

        self.persist(&inner).await;
        Ok(())
    }

    /// Stops a session's listener.
    ///
    /// Idempotent: stopping a stopped session is a no-op that still
    /// returns `Ok`. The session stays in the registry so its status and
    /// captures remain queryable.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for an unknown id.
    pub async fn stop(&self, id: Uuid, reason: &str) -> Result<(), SessionError> {
        let (inner, handle) = {
            let entry = self.sessions.get(&id).ok_or(SessionError::NotFound(id))?;
            if entry.inner.state() == SessionState::Stopped {
                return Ok(());
            }
            entry.cancel.cancel();
            let handle = entry.handle.lock().expect("handle lock poisoned").take();
            (Arc::clone(&entry.inner), handle)
        };

        // Let in-flight requests drain before declaring the stop done.
        if let Some(handle) = handle {
            handle.await.ok();
        }

        inner.set_state(SessionState::Stopped);
        self.persist(&inner).await;
        metrics::set_sessions_active(self.active_count());
        self.emitter.emit(Event::SessionStopped {
            timestamp: Utc::now(),
            session_id: id,
            reason: reason.to_owned(),
        });
        tracing::info!(session = %id, reason, "session stopped");
        Ok(())
    }

    /// Stops every session; safe to race with concurrent `create` calls.
    pub async fn stop_all(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let ids: Vec<Uuid> = self.sessions.iter().map(|e| *e.key()).collect();
        for id in ids {
            let _ = self.stop(id, "shutdown").await;
        }
    }

    /// Number of sessions with a running listener.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.inner.state() == SessionState::Running)
            .count()
    }

    /// Writes the full current record for a session to the store.
    ///
    /// Failures are warnings; the registry remains the source of truth.
    async fn persist(&self, inner: &SessionInner) {
        let record = PersistedSession {
            kind: inner.kind,
            port: inner.port,
            created_at: inner.created_at,
            status: inner.state(),
            events: inner.events_snapshot(),
        };
        if let Err(e) = self.store.put_session(inner.id, record).await {
            tracing::warn!(session = %inner.id, error = %e, "session persist failed");
        }
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("active", &self.active_count())
            .finish_non_exhaustive()
    }
}
