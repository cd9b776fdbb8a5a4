//! Engine configuration.
//!
//! YAML-backed configuration for the control API, ephemeral listeners,
//! rate-limit rules, and alert channels. Every field has a default so an
//! empty file (or no file at all) yields a working lab engine.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ============================================================================
// Action types
// ============================================================================

/// Throttled action categories.
///
/// Each action type carries one canonical identifier scope: login-class
/// actions (`LoginAttempt`, `OtpRequest`, `PasswordReset`) are keyed by a
/// `user + ip` composite, while `ApiCall` and `Registration` are keyed by
/// ip alone. See [`crate::defense::rate_limit::canonical_identifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Password login attempts (user + ip composite).
    LoginAttempt,
    /// One-time-code requests (user + ip composite).
    OtpRequest,
    /// Password reset requests (user + ip composite).
    PasswordReset,
    /// Generic API calls (ip scoped).
    ApiCall,
    /// Account registrations (ip scoped).
    Registration,
}

impl ActionType {
    /// All known action types, used for default rule tables and metrics
    /// label cardinality protection.
    pub const ALL: [Self; 5] = [
        Self::LoginAttempt,
        Self::OtpRequest,
        Self::PasswordReset,
        Self::ApiCall,
        Self::Registration,
    ];

    /// Stable string form used in routes, metrics labels, and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoginAttempt => "login_attempt",
            Self::OtpRequest => "otp_request",
            Self::PasswordReset => "password_reset",
            Self::ApiCall => "api_call",
            Self::Registration => "registration",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "login_attempt" => Ok(Self::LoginAttempt),
            "otp_request" => Ok(Self::OtpRequest),
            "password_reset" => Ok(Self::PasswordReset),
            "api_call" => Ok(Self::ApiCall),
            "registration" => Ok(Self::Registration),
            other => Err(format!("unknown action type: {other}")),
        }
    }
}

// ============================================================================
// Threat level
// ============================================================================

/// Adaptive rate-limiting threat level.
///
/// Scales rule limits before the standard admission check runs: higher
/// levels shrink the attempt budget and stretch the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    /// Relaxed limits (50% more attempts).
    Low,
    /// Default limits.
    #[default]
    Normal,
    /// Halved attempts, doubled window.
    High,
    /// 30% of attempts, tripled window.
    Critical,
}

// ============================================================================
// Rate-limit rules
// ============================================================================

/// A single sliding-window rule: `max_attempts` within `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    /// Window length in seconds.
    pub window_secs: u64,
    /// Maximum attempts admitted within one window.
    pub max_attempts: u32,
}

impl RateLimitRule {
    /// Window length as a [`Duration`].
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Permissive rule applied when an action has no configured entry.
    #[must_use]
    pub const fn fallback() -> Self {
        Self {
            window_secs: 60,
            max_attempts: 1000,
        }
    }
}

/// Default rule table.
///
/// Mirrors the platform defaults: 5 logins per 15 minutes, 3 OTP requests
/// per 5 minutes, 3 password resets per hour, 100 API calls per minute,
/// 5 registrations per hour.
#[must_use]
pub fn default_rate_limits() -> BTreeMap<ActionType, RateLimitRule> {
    BTreeMap::from([
        (
            ActionType::LoginAttempt,
            RateLimitRule {
                window_secs: 15 * 60,
                max_attempts: 5,
            },
        ),
        (
            ActionType::OtpRequest,
            RateLimitRule {
                window_secs: 5 * 60,
                max_attempts: 3,
            },
        ),
        (
            ActionType::PasswordReset,
            RateLimitRule {
                window_secs: 60 * 60,
                max_attempts: 3,
            },
        ),
        (
            ActionType::ApiCall,
            RateLimitRule {
                window_secs: 60,
                max_attempts: 100,
            },
        ),
        (
            ActionType::Registration,
            RateLimitRule {
                window_secs: 60 * 60,
                max_attempts: 5,
            },
        ),
    ])
}

// ============================================================================
// Engine configuration
// ============================================================================

/// Control API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Address the control API binds to.
    pub bind_addr: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7600".to_string(),
        }
    }
}

/// Ephemeral listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host the per-session listeners bind to.
    pub bind_host: String,
    /// First port probed by the allocator.
    pub port_start: u16,
    /// Number of sequential ports probed before the random fallback.
    pub port_range: u16,
    /// Per-request body read timeout in milliseconds.
    pub read_timeout_ms: u64,
    /// Maximum buffered request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            port_start: 9090,
            port_range: 100,
            read_timeout_ms: 5000,
            max_body_bytes: 64 * 1024,
        }
    }
}

impl ListenerConfig {
    /// Body read timeout as a [`Duration`].
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Alert dispatch configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Optional webhook endpoint; alerts are POSTed there as JSON in
    /// addition to the simulated channels.
    pub webhook_url: Option<String>,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Control API settings.
    pub control: ControlConfig,
    /// Ephemeral listener settings.
    pub listeners: ListenerConfig,
    /// Per-action sliding-window rules.
    pub rate_limits: BTreeMap<ActionType, RateLimitRule>,
    /// Current adaptive threat level.
    pub threat_level: ThreatLevel,
    /// Alert channel settings.
    pub alerts: AlertConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            control: ControlConfig::default(),
            listeners: ListenerConfig::default(),
            rate_limits: default_rate_limits(),
            threat_level: ThreatLevel::default(),
            alerts: AlertConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a YAML file and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingFile`] if the file does not exist,
    /// [`ConfigError::ParseError`] on malformed YAML, or
    /// [`ConfigError::InvalidValue`] when validation fails.
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;
        let config: Self = serde_yaml::from_str(&raw).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates field ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for zero-sized port ranges,
    /// empty rate-limit windows, or a zero attempt budget.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.listeners.port_range == 0 {
            return Err(ConfigError::InvalidValue {
                field: "listeners.port_range".to_string(),
                value: "0".to_string(),
                expected: "a positive probe range".to_string(),
            });
        }
        if self.listeners.max_body_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "listeners.max_body_bytes".to_string(),
                value: "0".to_string(),
                expected: "a positive body size limit".to_string(),
            });
        }
        for (action, rule) in &self.rate_limits {
            if rule.window_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("rate_limits.{action}.window_secs"),
                    value: "0".to_string(),
                    expected: "a positive window".to_string(),
                });
            }
            if rule.max_attempts == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("rate_limits.{action}.max_attempts"),
                    value: "0".to_string(),
                    expected: "a positive attempt budget".to_string(),
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listeners.port_start, 9090);
        assert_eq!(config.control.bind_addr, "127.0.0.1:7600");
        assert_eq!(config.threat_level, ThreatLevel::Normal);
    }

    #[test]
    fn default_rules_match_platform_defaults() {
        let rules = default_rate_limits();
        assert_eq!(rules[&ActionType::LoginAttempt].max_attempts, 5);
        assert_eq!(rules[&ActionType::LoginAttempt].window_secs, 900);
        assert_eq!(rules[&ActionType::OtpRequest].max_attempts, 3);
        assert_eq!(rules[&ActionType::ApiCall].max_attempts, 100);
        assert_eq!(rules[&ActionType::ApiCall].window_secs, 60);
        assert_eq!(rules[&ActionType::Registration].window_secs, 3600);
    }

    #[test]
    fn action_type_round_trips_through_str() {
        for action in ActionType::ALL {
            let parsed: ActionType = action.as_str().parse().unwrap();
            assert_eq!(parsed, action);
        }
    }

    #[test]
    fn unknown_action_type_is_rejected() {
        assert!("teleport".parse::<ActionType>().is_err());
    }

    #[test]
    fn load_partial_yaml_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "listeners:\n  port_start: 9500\nthreat_level: high"
        )
        .unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.listeners.port_start, 9500);
        assert_eq!(config.listeners.port_range, 100); // default preserved
        assert_eq!(config.threat_level, ThreatLevel::High);
        assert_eq!(config.rate_limits, default_rate_limits());
    }

    #[test]
    fn load_missing_file_errors() {
        let err = EngineConfig::load(Path::new("/nonexistent/lurebox.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile { .. }));
    }

    #[test]
    fn load_malformed_yaml_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listeners: [not, a, map").unwrap();
        let err = EngineConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn zero_port_range_is_invalid() {
        let mut config = EngineConfig::default();
        config.listeners.port_range = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn zero_attempt_budget_is_invalid() {
        let mut config = EngineConfig::default();
        config
            .rate_limits
            .insert(ActionType::ApiCall, RateLimitRule {
                window_secs: 60,
                max_attempts: 0,
            });
        assert!(config.validate().is_err());
    }
}
