//! Progressive lockout escalation.
//!
//! Tracks per-identifier failure streaks and maps the cumulative count to
//! an escalating lockout duration. Levels only ever go up within a
//! streak; the sole ways down are an explicit success or an admin clear.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::defense::alert::{AlertDispatcher, AlertType, Severity};
use crate::observability::{Event, EventEmitter, metrics};
use crate::store::{LabStore, PersistedLockout};

/// Escalation tier of a lockout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockoutLevel {
    /// No lockout in effect.
    None,
    /// Up to 3 failures: 5 minutes.
    Short,
    /// Up to 6 failures: 30 minutes.
    Medium,
    /// Up to 10 failures: 2 hours.
    Long,
    /// Beyond 10 failures: 24 hours.
    Extended,
}

impl LockoutLevel {
    /// Level for a cumulative failure count.
    #[must_use]
    pub const fn for_failures(count: u32) -> Self {
        match count {
            0 => Self::None,
            1..=3 => Self::Short,
            4..=6 => Self::Medium,
            7..=10 => Self::Long,
            _ => Self::Extended,
        }
    }

    /// Lockout duration at this level.
    #[must_use]
    pub fn duration(self) -> ChronoDuration {
        match self {
            Self::None => ChronoDuration::zero(),
            Self::Short => ChronoDuration::minutes(5),
            Self::Medium => ChronoDuration::minutes(30),
            Self::Long => ChronoDuration::hours(2),
            Self::Extended => ChronoDuration::hours(24),
        }
    }

    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
            Self::Extended => "extended",
        }
    }
}

impl std::fmt::Display for LockoutLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lockout state for one identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutRecord {
    /// Canonical identifier the record applies to.
    pub identifier: String,
    /// Current escalation tier.
    pub level: LockoutLevel,
    /// Cumulative failures in the current streak.
    pub failure_count: u32,
    /// When the lockout lifts.
    pub expires_at: DateTime<Utc>,
}

/// Per-identifier lockout tracker.
///
/// Failure bookkeeping is synchronous over a concurrent map; alert
/// dispatch and store writes happen after the map guard is released so a
/// slow channel never blocks other identifiers. The engine is the source
/// of truth; the store holds an identifier-keyed audit copy rewritten on
/// escalation and deleted on reset.
pub struct LockoutEngine {
    records: DashMap<String, LockoutRecord>,
    alerts: Arc<AlertDispatcher>,
    emitter: Arc<EventEmitter>,
    store: Arc<dyn LabStore>,
}

impl LockoutEngine {
    /// Creates an engine wired to the given dispatcher, event stream,
    /// and audit store.
    #[must_use]
    pub fn new(
        alerts: Arc<AlertDispatcher>,
        emitter: Arc<EventEmitter>,
        store: Arc<dyn LabStore>,
    ) -> Self {
        Self {
            records: DashMap::new(),
            alerts,
            emitter,
            store,
        }
    }

    /// Records one failure and returns the updated record.
    ///
    /// On a level change the expiry is rewritten to `now + duration` and,
    /// when the new level is `Long` or `Extended`, exactly one alert
    /// fires (high and critical severity respectively).
    pub async fn record_failure(&self, identifier: &str) -> LockoutRecord {
        let now = Utc::now();

        // Mutate inside the guard, alert after it drops.
        let (record, escalated_to) = {
            let mut entry = self
                .records
                .entry(identifier.to_owned())
                .or_insert_with(|| LockoutRecord {
                    identifier: identifier.to_owned(),
                    level: LockoutLevel::None,
                    failure_count: 0,
                    expires_at: now,
                });

            entry.failure_count += 1;
            let new_level = LockoutLevel::for_failures(entry.failure_count);
            let escalated = new_level > entry.level;
            if escalated {
                entry.level = new_level;
                entry.expires_at = now + new_level.duration();
            }
            (entry.clone(), escalated.then_some(new_level))
        };

        if let Some(level) = escalated_to {
            if let Err(e) = self
                .store
                .put_lockout(identifier, PersistedLockout {
                    level: level.as_str().to_owned(),
                    expires_at: record.expires_at,
                })
                .await
            {
                tracing::warn!(identifier, error = %e, "lockout persist failed");
            }
            metrics::record_lockout(level.as_str());
            self.emitter.emit(Event::LockoutEscalated {
                timestamp: now,
                identifier: identifier.to_owned(),
                level: level.as_str().to_owned(),
                failure_count: record.failure_count,
            });
            tracing::info!(
                identifier,
                level = level.as_str(),
                failure_count = record.failure_count,
                "lockout escalated"
            );

            let severity = match level {
                LockoutLevel::Long => Some(Severity::High),
                LockoutLevel::Extended => Some(Severity::Critical),
                _ => None,
            };
            if let Some(severity) = severity {
                self.alerts
                    .trigger(
                        AlertType::FailedLogins,
                        identifier,
                        serde_json::json!({
                            "failure_count": record.failure_count,
                            "lockout_level": level.as_str(),
                            "expires_at": record.expires_at,
                        }),
                        severity,
                    )
                    .await;
            }
        }

        record
    }

    /// Whether `identifier` is currently locked out.
    ///
    /// Pure read; unseen identifiers are never locked.
    #[must_use]
    pub fn is_locked(&self, identifier: &str) -> bool {
        self.records.get(identifier).is_some_and(|record| {
            record.level != LockoutLevel::None && Utc::now() < record.expires_at
        })
    }

    /// Current record for `identifier`, if any failures are on file.
    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<LockoutRecord> {
        self.records.get(identifier).map(|r| r.clone())
    }

    /// Resets the streak after a legitimate success.
    pub async fn record_success(&self, identifier: &str) {
        if self.records.remove(identifier).is_some() {
            self.delete_persisted(identifier).await;
            tracing::debug!(identifier, "lockout streak reset on success");
        }
    }

    /// Admin reset; identical effect to a success signal.
    pub async fn clear(&self, identifier: &str) {
        if self.records.remove(identifier).is_some() {
            self.delete_persisted(identifier).await;
            tracing::info!(identifier, "lockout cleared by admin");
        }
    }

    async fn delete_persisted(&self, identifier: &str) {
        if let Err(e) = self.store.delete_lockout(identifier).await {
            tracing::warn!(identifier, error = %e, "lockout delete failed");
        }
    }
}

impl std::fmt::Debug for LockoutEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockoutEngine")
            .field("tracked", &self.records.len())
            .finish_non_exhaustive()
    }
}
