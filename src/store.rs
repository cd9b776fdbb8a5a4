//! Persistence seam.
//!
//! The engine is the source of truth for live state; the store is an
//! audit trail. Write failures are logged as warnings and never bubble
//! into session or admission behavior.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;
use crate::session::{CapturedEvent, SessionKind, SessionState};

/// Lockout record as written to the external store.
///
/// Keyed by the canonical rate-limit identifier (lockouts are
/// identifier-scoped, not session-scoped); rewritten on escalation and
/// deleted on reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedLockout {
    /// Lockout level string (`"short"`, `"medium"`, ...).
    pub level: String,
    /// When the lockout expires.
    pub expires_at: DateTime<Utc>,
}

/// Full session record as written to the external store.
///
/// Rewritten whole on every update; readers never see a partially
/// patched record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    /// Attack variant.
    pub kind: SessionKind,
    /// Listener port.
    pub port: u16,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Lifecycle state at write time.
    pub status: SessionState,
    /// Captured events in arrival order.
    pub events: Vec<CapturedEvent>,
}

/// Alert record as written to the external store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedAlert {
    /// Alert id.
    pub alert_id: Uuid,
    /// Alert type string.
    pub alert_type: String,
    /// Severity string.
    pub severity: String,
    /// Identifier or account the alert concerns.
    pub subject: String,
    /// Free-form detail payload.
    pub details: Value,
    /// When the alert fired.
    pub timestamp: DateTime<Utc>,
    /// Set when an operator acknowledges the alert.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
}

/// Audit-trail sink for sessions and alerts.
///
/// Implementations must tolerate concurrent writers; callers treat every
/// error as a warning.
#[async_trait]
pub trait LabStore: Send + Sync {
    /// Writes or rewrites the full record for a session.
    async fn put_session(&self, id: Uuid, record: PersistedSession) -> Result<(), StoreError>;

    /// Reads a session record back, if present.
    async fn get_session(&self, id: Uuid) -> Result<Option<PersistedSession>, StoreError>;

    /// Appends an alert record.
    async fn put_alert(&self, record: PersistedAlert) -> Result<(), StoreError>;

    /// Marks a stored alert acknowledged; returns `false` if unknown.
    async fn acknowledge_alert(&self, alert_id: Uuid) -> Result<bool, StoreError>;

    /// Writes or rewrites the lockout record for a canonical identifier.
    async fn put_lockout(
        &self,
        identifier: &str,
        record: PersistedLockout,
    ) -> Result<(), StoreError>;

    /// Reads a lockout record back, if present.
    async fn get_lockout(&self, identifier: &str)
    -> Result<Option<PersistedLockout>, StoreError>;

    /// Removes a lockout record after a reset; unknown identifiers are a
    /// no-op.
    async fn delete_lockout(&self, identifier: &str) -> Result<(), StoreError>;
}

/// In-memory [`LabStore`] used by the engine and by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: dashmap::DashMap<Uuid, PersistedSession>,
    alerts: Mutex<Vec<PersistedAlert>>,
    lockouts: dashmap::DashMap<String, PersistedLockout>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored alerts.
    #[must_use]
    pub fn alert_count(&self) -> usize {
        self.alerts.lock().expect("alert log lock poisoned").len()
    }

    /// Snapshot of stored alerts, in append order.
    #[must_use]
    pub fn alerts_snapshot(&self) -> Vec<PersistedAlert> {
        self.alerts
            .lock()
            .expect("alert log lock poisoned")
            .clone()
    }

    /// Snapshot of stored session records.
    #[must_use]
    pub fn sessions_snapshot(&self) -> Vec<(Uuid, PersistedSession)> {
        self.sessions
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }
}

#[async_trait]
impl LabStore for MemoryStore {
    async fn put_session(&self, id: Uuid, record: PersistedSession) -> Result<(), StoreError> {
        self.sessions.insert(id, record);
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<PersistedSession>, StoreError> {
        Ok(self.sessions.get(&id).map(|r| r.clone()))
    }

    async fn put_alert(&self, record: PersistedAlert) -> Result<(), StoreError> {
        self.alerts
            .lock()
            .expect("alert log lock poisoned")
            .push(record);
        Ok(())
    }

    async fn acknowledge_alert(&self, alert_id: Uuid) -> Result<bool, StoreError> {
        let mut alerts = self.alerts.lock().expect("alert log lock poisoned");
        match alerts.iter_mut().find(|a| a.alert_id == alert_id) {
            Some(alert) => {
                alert.acknowledged_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn put_lockout(
        &self,
        identifier: &str,
        record: PersistedLockout,
    ) -> Result<(), StoreError> {
        self.lockouts.insert(identifier.to_owned(), record);
        Ok(())
    }

    async fn get_lockout(
        &self,
        identifier: &str,
    ) -> Result<Option<PersistedLockout>, StoreError> {
        Ok(self.lockouts.get(identifier).map(|r| r.clone()))
    }

    async fn delete_lockout(&self, identifier: &str) -> Result<(), StoreError> {
        self.lockouts.remove(identifier);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::assert_ok;

    use super::*;

    fn record(status: SessionState) -> PersistedSession {
        PersistedSession {
            kind: SessionKind::Phishing,
            port: 9090,
            created_at: Utc::now(),
            status,
            events: vec![],
        }
    }

    #[tokio::test]
    async fn put_session_rewrites_whole_record() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();

        assert_ok!(store.put_session(id, record(SessionState::Running)).await);
        assert_ok!(store.put_session(id, record(SessionState::Stopped)).await);

        let read = assert_ok!(store.get_session(id).await).unwrap();
        assert_eq!(read.status, SessionState::Stopped);
    }

    #[tokio::test]
    async fn get_unknown_session_is_none() {
        let store = MemoryStore::new();
        assert!(store.get_session(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn acknowledge_sets_timestamp_once_known() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store
            .put_alert(PersistedAlert {
                alert_id: id,
                alert_type: "failed_logins".to_owned(),
                severity: "critical".to_owned(),
                subject: "user:alice|ip:10.0.0.1".to_owned(),
                details: serde_json::json!({}),
                timestamp: Utc::now(),
                acknowledged_at: None,
            })
            .await
            .unwrap();

        assert!(!store.acknowledge_alert(Uuid::new_v4()).await.unwrap());
        assert!(store.acknowledge_alert(id).await.unwrap());
        assert!(store.alerts_snapshot()[0].acknowledged_at.is_some());
    }

    #[test]
    fn persisted_session_serializes_expected_shape() {
        let rec = record(SessionState::Running);
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["kind"], "phishing");
        assert_eq!(value["status"], "running");
        assert!(value["events"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn lockout_records_round_trip_and_delete() {
        let store = MemoryStore::new();
        let id = "user:alice|ip:10.0.0.1";

        assert!(assert_ok!(store.get_lockout(id).await).is_none());

        assert_ok!(
            store
                .put_lockout(id, PersistedLockout {
                    level: "medium".to_owned(),
                    expires_at: Utc::now(),
                })
                .await
        );
        let read = assert_ok!(store.get_lockout(id).await).unwrap();
        assert_eq!(read.level, "medium");

        assert_ok!(store.delete_lockout(id).await);
        assert!(assert_ok!(store.get_lockout(id).await).is_none());
        // Deleting again is a no-op.
        assert_ok!(store.delete_lockout(id).await);
    }
}
