//! `Lurebox` — attack-session and defense-throttling engine.
//!
//! Core of an educational attack/defense simulation platform. The engine
//! spins up short-lived per-attack listeners (phishing pages, intercepting
//! proxies) with dynamic port allocation, correlates inbound traffic to
//! detect captured auth material, and enforces adaptive rate limiting with
//! progressive lockout escalation and automated defensive responses.
//!
//! Everything here is simulation plumbing for isolated lab environments;
//! no real credentials are verified and no real traffic is intercepted.

pub mod api;
pub mod cli;
pub mod config;
pub mod correlate;
pub mod defense;
pub mod error;
pub mod observability;
pub mod session;
pub mod store;

pub use config::EngineConfig;
pub use error::{LureboxError, Result};
pub use session::SessionRegistry;
