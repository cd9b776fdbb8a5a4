//! Metrics collection for `Lurebox`.
//!
//! Prometheus-compatible metrics with label cardinality protection and
//! typed convenience functions for recording measurements.

use std::sync::atomic::{AtomicBool, Ordering};

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::ActionType;
use crate::error::LureboxError;

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Sanitizes an action label.
///
/// Action types are a closed enum so this is infallible, but identifiers
/// never become labels — attacker-controlled values would explode
/// cardinality.
#[must_use]
pub const fn action_label(action: ActionType) -> &'static str {
    action.as_str()
}

/// Initializes the global metrics recorder.
///
/// When `port` is `Some`, a Prometheus HTTP listener is started on
/// `127.0.0.1:<port>`. When `None`, the recorder is installed without
/// an HTTP endpoint.
///
/// # Errors
///
/// Returns `LureboxError::Io` if the recorder or HTTP listener cannot be
/// installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), LureboxError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| LureboxError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

/// Registers metric descriptions with the global recorder.
fn describe_metrics() {
    describe_gauge!(
        "lurebox_sessions_active",
        "Number of attack sessions with a running listener"
    );
    describe_counter!(
        "lurebox_sessions_created_total",
        "Total attack sessions created"
    );
    describe_counter!(
        "lurebox_captures_total",
        "Captured events recorded across all sessions"
    );
    describe_counter!(
        "lurebox_auth_material_total",
        "Captured events classified as containing auth material"
    );
    describe_counter!(
        "lurebox_admission_checks_total",
        "Rate-limit admission checks performed"
    );
    describe_counter!(
        "lurebox_admission_denied_total",
        "Rate-limit admission checks denied"
    );
    describe_counter!("lurebox_lockouts_total", "Lockout escalations applied");
    describe_counter!("lurebox_alerts_total", "Alert events dispatched");
    describe_counter!(
        "lurebox_alert_channel_failures_total",
        "Per-channel alert delivery failures"
    );
    describe_counter!(
        "lurebox_defense_actions_total",
        "Automated defense responses executed"
    );
}

/// Updates the active-session gauge.
pub fn set_sessions_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("lurebox_sessions_active").set(count as f64);
}

/// Records a session creation, labeled by kind.
pub fn record_session_created(kind: &'static str) {
    counter!("lurebox_sessions_created_total", "kind" => kind).increment(1);
}

/// Records a captured event; `found` marks auth material.
pub fn record_capture(kind: &'static str, found: bool) {
    counter!("lurebox_captures_total", "kind" => kind).increment(1);
    if found {
        counter!("lurebox_auth_material_total", "kind" => kind).increment(1);
    }
}

/// Records an admission check outcome.
pub fn record_admission(action: ActionType, allowed: bool) {
    let label = action_label(action);
    counter!("lurebox_admission_checks_total", "action" => label).increment(1);
    if !allowed {
        counter!("lurebox_admission_denied_total", "action" => label).increment(1);
    }
}

/// Records a lockout escalation, labeled by level.
pub fn record_lockout(level: &'static str) {
    counter!("lurebox_lockouts_total", "level" => level).increment(1);
}

/// Records a dispatched alert, labeled by severity.
pub fn record_alert(severity: &'static str) {
    counter!("lurebox_alerts_total", "severity" => severity).increment(1);
}

/// Records a per-channel alert delivery failure.
pub fn record_channel_failure(channel: &'static str) {
    counter!("lurebox_alert_channel_failures_total", "channel" => channel).increment(1);
}

/// Records an automated defense response.
pub fn record_defense_action(action: &'static str) {
    counter!("lurebox_defense_actions_total", "action" => action).increment(1);
}
