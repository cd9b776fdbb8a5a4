//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use lurebox::api::AppState;
use lurebox::config::{ListenerConfig, ThreatLevel, default_rate_limits};
use lurebox::defense::alert::{AlertDispatcher, AlwaysDeliver};
use lurebox::defense::lockout::LockoutEngine;
use lurebox::defense::rate_limit::RateLimiter;
use lurebox::observability::EventEmitter;
use lurebox::session::SessionRegistry;
use lurebox::store::{LabStore, MemoryStore};

/// Fully wired in-process engine.
pub struct TestEngine {
    pub registry: Arc<SessionRegistry>,
    pub limiter: Arc<RateLimiter>,
    pub lockouts: Arc<LockoutEngine>,
    pub alerts: Arc<AlertDispatcher>,
    pub store: Arc<MemoryStore>,
    pub emitter: Arc<EventEmitter>,
}

impl TestEngine {
    /// Builds an engine whose listeners bind ephemeral ports.
    pub fn new() -> Self {
        Self::with_config(ListenerConfig {
            // Port 0 probes always succeed and the OS assigns a free port,
            // so parallel tests never collide.
            port_start: 0,
            port_range: 1,
            ..ListenerConfig::default()
        })
    }

    /// Builds an engine with custom listener settings.
    pub fn with_config(config: ListenerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let emitter = Arc::new(EventEmitter::noop());
        let alerts = Arc::new(AlertDispatcher::new(
            Arc::clone(&store) as Arc<dyn LabStore>,
            Arc::clone(&emitter),
            Box::new(AlwaysDeliver),
            None,
        ));
        let registry = Arc::new(SessionRegistry::new(
            config,
            Arc::clone(&store) as Arc<dyn LabStore>,
            Arc::clone(&alerts),
            Arc::clone(&emitter),
        ));
        let limiter = Arc::new(RateLimiter::new(default_rate_limits(), ThreatLevel::Normal));
        let lockouts = Arc::new(LockoutEngine::new(
            Arc::clone(&alerts),
            Arc::clone(&emitter),
            Arc::clone(&store) as Arc<dyn LabStore>,
        ));

        Self {
            registry,
            limiter,
            lockouts,
            alerts,
            store,
            emitter,
        }
    }

    /// Control API state over this engine.
    pub fn app_state(&self) -> AppState {
        AppState {
            registry: Arc::clone(&self.registry),
            limiter: Arc::clone(&self.limiter),
            lockouts: Arc::clone(&self.lockouts),
            alerts: Arc::clone(&self.alerts),
            emitter: Arc::clone(&self.emitter),
        }
    }
}
