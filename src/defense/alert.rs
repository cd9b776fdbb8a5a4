//! Alert dispatch and automated defense responses.
//!
//! Alerts are persisted first, then fanned out to notification channels
//! selected by severity, then followed by automated responses for the
//! high tiers. Every step is independent: a failed channel is recorded
//! and the rest still run, and nothing here ever raises to the caller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AlertError;
use crate::observability::{Event, EventEmitter, metrics};
use crate::store::{LabStore, PersistedAlert};

// ============================================================================
// Severity, type, channels
// ============================================================================

/// Alert severity tier; selects the notification channel set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational; email only.
    Low,
    /// Worth a look; email and push.
    Medium,
    /// Active concern; all channels.
    High,
    /// Immediate response; all channels plus automated actions.
    Critical,
}

impl Severity {
    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the alert is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// A failed-login streak crossed a lockout threshold.
    FailedLogins,
    /// Login from a device not seen before.
    UnknownDevice,
    /// Request pattern flagged as anomalous.
    SuspiciousPattern,
    /// Login from an unexpected location.
    UnusualLocation,
    /// An attack session captured auth material.
    CredentialCapture,
}

impl AlertType {
    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FailedLogins => "failed_logins",
            Self::UnknownDevice => "unknown_device",
            Self::SuspiciousPattern => "suspicious_pattern",
            Self::UnusualLocation => "unusual_location",
            Self::CredentialCapture => "credential_capture",
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Simulated notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Email notification.
    Email,
    /// SMS notification.
    Sms,
    /// Mobile push notification.
    Push,
}

impl Channel {
    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Push => "push",
        }
    }
}

/// Channel set for a severity tier.
#[must_use]
pub const fn channels_for(severity: Severity) -> &'static [Channel] {
    match severity {
        Severity::High | Severity::Critical => &[Channel::Email, Channel::Sms, Channel::Push],
        Severity::Medium => &[Channel::Email, Channel::Push],
        Severity::Low => &[Channel::Email],
    }
}

// ============================================================================
// Alert event
// ============================================================================

/// Delivery outcome for one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelResult {
    /// The channel attempted.
    pub channel: Channel,
    /// Whether delivery succeeded.
    pub delivered: bool,
    /// Failure detail when delivery did not succeed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One dispatched alert with its full outcome record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Alert id.
    pub alert_id: Uuid,
    /// What the alert is about.
    pub alert_type: AlertType,
    /// Severity tier.
    pub severity: Severity,
    /// Identifier or account the alert concerns.
    pub subject: String,
    /// Free-form detail payload.
    pub details: Value,
    /// Per-channel delivery outcomes.
    pub channel_results: Vec<ChannelResult>,
    /// Automated defense actions taken.
    pub actions: Vec<String>,
    /// When the alert fired.
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Channel policy
// ============================================================================

/// Decides whether a simulated channel delivery succeeds.
///
/// Injected so tests pin outcomes instead of depending on chance.
pub trait ChannelPolicy: Send + Sync {
    /// Delivery outcome for one channel attempt.
    ///
    /// # Errors
    ///
    /// Returns [`AlertError::ChannelFailed`] when delivery does not
    /// succeed.
    fn deliver(&self, channel: Channel, alert: &AlertEvent) -> Result<(), AlertError>;
}

/// Policy under which every channel always delivers.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysDeliver;

impl ChannelPolicy for AlwaysDeliver {
    fn deliver(&self, _channel: Channel, _alert: &AlertEvent) -> Result<(), AlertError> {
        Ok(())
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Routes alerts to channels and automated responses.
pub struct AlertDispatcher {
    store: Arc<dyn LabStore>,
    emitter: Arc<EventEmitter>,
    policy: Box<dyn ChannelPolicy>,
    webhook: Option<(reqwest::Client, String)>,
}

impl AlertDispatcher {
    /// Creates a dispatcher with the given channel policy.
    #[must_use]
    pub fn new(
        store: Arc<dyn LabStore>,
        emitter: Arc<EventEmitter>,
        policy: Box<dyn ChannelPolicy>,
        webhook_url: Option<String>,
    ) -> Self {
        Self {
            store,
            emitter,
            policy,
            webhook: webhook_url.map(|url| (reqwest::Client::new(), url)),
        }
    }

    /// Dispatches an alert end to end.
    ///
    /// Persist first, then notify, then respond. Channel and store
    /// failures are recorded and logged but never surfaced; the returned
    /// event always reflects what actually happened.
    pub async fn trigger(
        &self,
        alert_type: AlertType,
        subject: &str,
        details: Value,
        severity: Severity,
    ) -> AlertEvent {
        let mut alert = AlertEvent {
            alert_id: Uuid::new_v4(),
            alert_type,
            severity,
            subject: subject.to_owned(),
            details,
            channel_results: Vec::new(),
            actions: Vec::new(),
            timestamp: Utc::now(),
        };

        if let Err(e) = self
            .store
            .put_alert(PersistedAlert {
                alert_id: alert.alert_id,
                alert_type: alert.alert_type.as_str().to_owned(),
                severity: alert.severity.as_str().to_owned(),
                subject: alert.subject.clone(),
                details: alert.details.clone(),
                timestamp: alert.timestamp,
                acknowledged_at: None,
            })
            .await
        {
            tracing::warn!(alert_id = %alert.alert_id, error = %e, "alert persist failed");
        }

        for &channel in channels_for(severity) {
            let result = match self.policy.deliver(channel, &alert) {
                Ok(()) => ChannelResult {
                    channel,
                    delivered: true,
                    error: None,
                },
                Err(e) => {
                    metrics::record_channel_failure(channel.as_str());
                    tracing::warn!(
                        alert_id = %alert.alert_id,
                        channel = channel.as_str(),
                        error = %e,
                        "alert channel delivery failed"
                    );
                    ChannelResult {
                        channel,
                        delivered: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            alert.channel_results.push(result);
        }

        self.post_webhook(&alert).await;

        if matches!(severity, Severity::High | Severity::Critical) {
            self.run_automated_responses(&mut alert);
        }

        metrics::record_alert(severity.as_str());
        self.emitter.emit(Event::AlertDispatched {
            timestamp: alert.timestamp,
            alert_id: alert.alert_id,
            alert_type: alert.alert_type.as_str().to_owned(),
            severity: severity.as_str().to_owned(),
        });
        tracing::info!(
            alert_id = %alert.alert_id,
            alert_type = alert.alert_type.as_str(),
            severity = severity.as_str(),
            subject = alert.subject,
            "alert dispatched"
        );

        alert
    }

    /// Marks a stored alert acknowledged.
    ///
    /// Returns `false` when the alert id is unknown or the store write
    /// failed.
    pub async fn acknowledge(&self, alert_id: Uuid) -> bool {
        match self.store.acknowledge_alert(alert_id).await {
            Ok(known) => known,
            Err(e) => {
                tracing::warn!(%alert_id, error = %e, "alert acknowledge failed");
                false
            }
        }
    }

    async fn post_webhook(&self, alert: &AlertEvent) {
        let Some((client, url)) = &self.webhook else {
            return;
        };
        let outcome = client.post(url).json(alert).send().await;
        match outcome {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                metrics::record_channel_failure("webhook");
                tracing::warn!(
                    alert_id = %alert.alert_id,
                    status = %resp.status(),
                    "webhook returned non-success status"
                );
            }
            Err(e) => {
                metrics::record_channel_failure("webhook");
                tracing::warn!(alert_id = %alert.alert_id, error = %e, "webhook post failed");
            }
        }
    }

    /// Automated responses for high-tier alerts.
    ///
    /// Keyed by alert type; each executed response is logged as a defense
    /// action regardless of how notification delivery went.
    fn run_automated_responses(&self, alert: &mut AlertEvent) {
        let mut actions: Vec<&'static str> = Vec::new();
        match alert.alert_type {
            AlertType::FailedLogins => {
                if alert.severity == Severity::Critical {
                    actions.push("temporary_account_lock");
                }
            }
            AlertType::UnknownDevice | AlertType::SuspiciousPattern => {
                actions.push("session_invalidation");
            }
            AlertType::UnusualLocation => {
                actions.push("require_reauth");
            }
            AlertType::CredentialCapture => {}
        }

        for action in actions {
            metrics::record_defense_action(action);
            tracing::info!(
                alert_id = %alert.alert_id,
                action,
                subject = alert.subject,
                "automated defense response executed"
            );
            alert.actions.push(action.to_owned());
        }
    }
}

impl std::fmt::Debug for AlertDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertDispatcher")
            .field("webhook", &self.webhook.as_ref().map(|(_, url)| url))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
