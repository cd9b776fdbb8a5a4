//! Sliding-window rate limiting with adaptive threat scaling.
//!
//! Admission checks are pure in-memory operations over per-identifier
//! attempt windows; they never suspend on I/O.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::{ActionType, RateLimitRule, ThreatLevel};
use crate::observability::metrics;

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Whether the action is admitted.
    pub allowed: bool,
    /// Attempts left in the current window after this check.
    pub remaining: u32,
    /// Seconds until the window admits this identifier again; zero when
    /// allowed.
    pub retry_after_seconds: u64,
}

/// Per-action usage counters for the statistics snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ActionStats {
    /// Total admission checks performed.
    pub total_checks: u64,
    /// Checks that were denied.
    pub denied: u64,
    /// Identifiers with a live attempt window.
    pub active_identifiers: usize,
}

/// Builds the canonical rate-limit identifier for an action.
///
/// Login-class actions key on the user and source address together so one
/// address cannot burn the budget of every account, and one account
/// cannot be locked from a single address spraying others. Address-scoped
/// actions ignore the user entirely.
#[must_use]
pub fn canonical_identifier(action: ActionType, user: Option<&str>, ip: &str) -> String {
    match action {
        ActionType::LoginAttempt | ActionType::OtpRequest | ActionType::PasswordReset => {
            format!("user:{}|ip:{ip}", user.unwrap_or("anonymous"))
        }
        ActionType::ApiCall | ActionType::Registration => format!("ip:{ip}"),
    }
}

#[derive(Default)]
struct Counters {
    total: AtomicU64,
    denied: AtomicU64,
}

/// Sliding-window limiter over `(action, identifier)` pairs.
///
/// Every check records an attempt, allowed or not, so hammering a denied
/// identifier keeps the window full.
pub struct RateLimiter {
    rules: std::collections::BTreeMap<ActionType, RateLimitRule>,
    windows: DashMap<(ActionType, String), Vec<Instant>>,
    counters: DashMap<ActionType, Counters>,
    threat: AtomicU8,
}

impl RateLimiter {
    /// Creates a limiter with per-action rules and an initial threat level.
    #[must_use]
    pub fn new(
        rules: std::collections::BTreeMap<ActionType, RateLimitRule>,
        threat: ThreatLevel,
    ) -> Self {
        Self {
            rules,
            windows: DashMap::new(),
            counters: DashMap::new(),
            threat: AtomicU8::new(threat_to_u8(threat)),
        }
    }

    /// Current threat level.
    #[must_use]
    pub fn threat_level(&self) -> ThreatLevel {
        threat_from_u8(self.threat.load(Ordering::SeqCst))
    }

    /// Adjusts the threat level; takes effect on the next check.
    pub fn set_threat_level(&self, level: ThreatLevel) {
        self.threat.store(threat_to_u8(level), Ordering::SeqCst);
    }

    /// Checks and records one attempt for `(action, identifier)`.
    pub fn check(&self, action: ActionType, identifier: &str) -> Decision {
        self.check_at(action, identifier, Instant::now())
    }

    /// [`check`](Self::check) against an explicit clock reading.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn check_at(&self, action: ActionType, identifier: &str, now: Instant) -> Decision {
        let rule = self
            .rules
            .get(&action)
            .copied()
            .unwrap_or_else(RateLimitRule::fallback);
        let (window, max_attempts) = scale_rule(rule, self.threat_level());

        let mut entry = self
            .windows
            .entry((action, identifier.to_owned()))
            .or_default();
        let attempts = entry.value_mut();
        attempts.retain(|t| now.duration_since(*t) < window);

        let used = u32::try_from(attempts.len()).unwrap_or(u32::MAX);
        let allowed = used < max_attempts;
        let retry_after_seconds = if allowed {
            0
        } else {
            // The window readmits when the attempt holding the oldest
            // still-counted slot ages out.
            let blocking_idx = attempts.len() - max_attempts as usize;
            let frees_in = window.saturating_sub(now.duration_since(attempts[blocking_idx]));
            frees_in.as_secs_f64().ceil() as u64
        };

        attempts.push(now);
        let remaining = max_attempts.saturating_sub(used.saturating_add(1));

        let counters = self.counters.entry(action).or_default();
        counters.total.fetch_add(1, Ordering::Relaxed);
        if !allowed {
            counters.denied.fetch_add(1, Ordering::Relaxed);
        }
        drop(counters);

        metrics::record_admission(action, allowed);
        if !allowed {
            tracing::debug!(
                action = action.as_str(),
                identifier,
                retry_after_seconds,
                "admission denied"
            );
        }

        Decision {
            allowed,
            remaining,
            retry_after_seconds,
        }
    }

    /// Usage counters for one action.
    #[must_use]
    pub fn stats(&self, action: ActionType) -> ActionStats {
        let (total_checks, denied) = self.counters.get(&action).map_or((0, 0), |c| {
            (
                c.total.load(Ordering::Relaxed),
                c.denied.load(Ordering::Relaxed),
            )
        });
        let active_identifiers = self
            .windows
            .iter()
            .filter(|entry| entry.key().0 == action)
            .count();
        ActionStats {
            total_checks,
            denied,
            active_identifiers,
        }
    }

    /// Drops every attempt window for `identifier` across all actions.
    ///
    /// Admin reset; usage counters are left intact.
    pub fn clear(&self, identifier: &str) {
        self.windows.retain(|(_, id), _| id != identifier);
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("threat", &self.threat_level())
            .field("tracked_windows", &self.windows.len())
            .finish_non_exhaustive()
    }
}

const fn threat_to_u8(level: ThreatLevel) -> u8 {
    match level {
        ThreatLevel::Low => 0,
        ThreatLevel::Normal => 1,
        ThreatLevel::High => 2,
        ThreatLevel::Critical => 3,
    }
}

const fn threat_from_u8(v: u8) -> ThreatLevel {
    match v {
        0 => ThreatLevel::Low,
        2 => ThreatLevel::High,
        3 => ThreatLevel::Critical,
        _ => ThreatLevel::Normal,
    }
}

/// Scales a rule for the current threat level.
///
/// Low threat relaxes the attempt budget; high and critical tighten the
/// budget and stretch the window. Budgets never scale below one attempt.
fn scale_rule(rule: RateLimitRule, threat: ThreatLevel) -> (Duration, u32) {
    let window = rule.window();
    let max = f64::from(rule.max_attempts);
    match threat {
        ThreatLevel::Normal => (window, rule.max_attempts),
        ThreatLevel::Low => (window, scaled_attempts(max * 1.5)),
        ThreatLevel::High => (window * 2, scaled_attempts(max * 0.5)),
        ThreatLevel::Critical => (window * 3, scaled_attempts(max * 0.3)),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled_attempts(scaled: f64) -> u32 {
    (scaled.ceil() as u32).max(1)
}
