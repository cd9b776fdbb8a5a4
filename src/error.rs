//! Error types for `Lurebox`.
//!
//! Domain-specific error enums aggregated into a single top-level type
//! with Unix exit-code mapping for the CLI.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `Lurebox` CLI operations.
///
/// These codes follow Unix conventions.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Session error (port exhaustion, listener bind failure)
    pub const SESSION_ERROR: i32 = 4;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `Lurebox` operations.
///
/// Aggregates all domain-specific errors and provides a unified
/// interface for error handling and exit code mapping.
#[derive(Debug, Error)]
pub enum LureboxError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Attack-session lifecycle error
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Persistence error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl LureboxError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Session(_) => ExitCode::SESSION_ERROR,
            Self::Store(_) | Self::Json(_) => ExitCode::ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Error message from the parser
        message: String,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },
}

// ============================================================================
// Session Errors
// ============================================================================

/// Attack-session lifecycle errors.
///
/// These cover port allocation, listener startup, and registry lookups.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The chosen port could not be bound (range exhausted or claimed
    /// between the probe and the real bind).
    #[error("failed to bind port {port}: {reason}")]
    PortBindFailed {
        /// Port that could not be bound
        port: u16,
        /// Underlying bind error
        reason: String,
    },

    /// Session creation failed after the port fallback was also exhausted.
    /// The registry itself stays alive; only this call fails.
    #[error("session creation failed: {0}")]
    CreateFailed(String),

    /// Unknown session id on a query or stop call.
    #[error("session not found: {0}")]
    NotFound(Uuid),

    /// Reading a request body exceeded the configured timeout.
    /// Aborts only the offending request.
    #[error("request body read timed out after {timeout_ms}ms")]
    BodyReadTimeout {
        /// Configured read timeout in milliseconds
        timeout_ms: u64,
    },
}

// ============================================================================
// Persistence Errors
// ============================================================================

/// Errors from the external key-value/JSON store.
///
/// Write failures are surfaced as warnings by callers — the registry
/// remains the source of truth while a session is alive.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write to the backing store failed
    #[error("persistence write failed: {0}")]
    WriteFailed(String),

    /// Record serialization failed
    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ============================================================================
// Alert Errors
// ============================================================================

/// Per-channel alert dispatch errors.
///
/// Recorded on the alert event; never propagated to the trigger caller.
#[derive(Debug, Error)]
pub enum AlertError {
    /// A notification channel failed to deliver
    #[error("channel '{channel}' failed: {reason}")]
    ChannelFailed {
        /// Channel name (e.g. `"email"`)
        channel: String,
        /// Failure description
        reason: String,
    },
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `Lurebox` operations.
pub type Result<T> = std::result::Result<T, LureboxError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitCode::SUCCESS, 0);
        assert_eq!(ExitCode::ERROR, 1);
        assert_eq!(ExitCode::CONFIG_ERROR, 2);
        assert_eq!(ExitCode::IO_ERROR, 3);
        assert_eq!(ExitCode::SESSION_ERROR, 4);
        assert_eq!(ExitCode::USAGE_ERROR, 64);
        assert_eq!(ExitCode::INTERRUPTED, 130);
        assert_eq!(ExitCode::TERMINATED, 143);
    }

    #[test]
    fn test_session_error_exit_code() {
        let err: LureboxError = SessionError::NotFound(Uuid::nil()).into();
        assert_eq!(err.exit_code(), ExitCode::SESSION_ERROR);
    }

    #[test]
    fn test_config_error_exit_code() {
        let err: LureboxError = ConfigError::MissingFile {
            path: PathBuf::from("/test"),
        }
        .into();
        assert_eq!(err.exit_code(), ExitCode::CONFIG_ERROR);
    }

    #[test]
    fn test_io_error_exit_code() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err: LureboxError = io_err.into();
        assert_eq!(err.exit_code(), ExitCode::IO_ERROR);
    }

    #[test]
    fn test_port_bind_failed_display() {
        let err = SessionError::PortBindFailed {
            port: 9090,
            reason: "address in use".to_string(),
        };
        assert!(err.to_string().contains("9090"));
        assert!(err.to_string().contains("address in use"));
    }

    #[test]
    fn test_body_read_timeout_display() {
        let err = SessionError::BodyReadTimeout { timeout_ms: 5000 };
        assert!(err.to_string().contains("5000"));
    }

    #[test]
    fn test_alert_error_display() {
        let err = AlertError::ChannelFailed {
            channel: "sms".to_string(),
            reason: "carrier unreachable".to_string(),
        };
        assert!(err.to_string().contains("sms"));
        assert!(err.to_string().contains("carrier unreachable"));
    }
}
