//! Defense-throttling module.
//!
//! Adaptive rate limiting, progressive lockout escalation, and alert
//! dispatch with automated responses.

pub mod alert;
pub mod lockout;
pub mod rate_limit;

pub use alert::{AlertDispatcher, AlertEvent, AlertType, ChannelPolicy, Severity};
pub use lockout::{LockoutEngine, LockoutLevel, LockoutRecord};
pub use rate_limit::{Decision, RateLimiter, canonical_identifier};
