//! `serve` command handler.
//!
//! Wires the full engine together: config, observability, stores, defense
//! engines, session registry, and the control API server.

use std::sync::Arc;

use chrono::Utc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::api::{self, AppState};
use crate::cli::args::ServeArgs;
use crate::config::EngineConfig;
use crate::defense::alert::{AlertDispatcher, AlwaysDeliver};
use crate::defense::lockout::LockoutEngine;
use crate::defense::rate_limit::RateLimiter;
use crate::error::LureboxError;
use crate::observability::{Event, EventEmitter, init_metrics};
use crate::session::SessionRegistry;
use crate::store::{LabStore, MemoryStore};

/// Start the engine and serve until cancelled.
///
/// # Errors
///
/// Returns a config error for an unloadable or invalid configuration, or
/// an I/O error if the control API cannot bind.
pub async fn run(args: &ServeArgs, cancel: CancellationToken) -> Result<(), LureboxError> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(bind) = &args.bind {
        config.control.bind_addr.clone_from(bind);
    }
    config.validate()?;

    if let Some(port) = args.metrics_port {
        init_metrics(Some(port))?;
        tracing::info!(port, "Prometheus metrics endpoint started");
    }

    let emitter = Arc::new(match &args.events_file {
        Some(path) => EventEmitter::from_file(path)?,
        None => EventEmitter::stderr(),
    });

    let store: Arc<dyn LabStore> = Arc::new(MemoryStore::new());
    let alerts = Arc::new(AlertDispatcher::new(
        Arc::clone(&store),
        Arc::clone(&emitter),
        Box::new(AlwaysDeliver),
        config.alerts.webhook_url.clone(),
    ));
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limits.clone(),
        config.threat_level,
    ));
    let lockouts = Arc::new(LockoutEngine::new(
        Arc::clone(&alerts),
        Arc::clone(&emitter),
        Arc::clone(&store),
    ));
    let registry = Arc::new(SessionRegistry::new(
        config.listeners.clone(),
        Arc::clone(&store),
        Arc::clone(&alerts),
        Arc::clone(&emitter),
    ));

    let state = AppState {
        registry: Arc::clone(&registry),
        limiter,
        lockouts,
        alerts,
        emitter: Arc::clone(&emitter),
    };
    let router = api::router(state);

    let listener = TcpListener::bind(&config.control.bind_addr)
        .await
        .map_err(LureboxError::Io)?;
    let bound_addr = listener.local_addr().map_err(LureboxError::Io)?;

    emitter.emit(Event::EngineStarted {
        timestamp: Utc::now(),
        control_addr: bound_addr.to_string(),
    });
    tracing::info!(%bound_addr, "control API started");

    let serve_cancel = cancel.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            serve_cancel.cancelled().await;
        })
        .await
        .map_err(LureboxError::Io)?;

    registry.stop_all().await;
    emitter.emit(Event::EngineStopped {
        timestamp: Utc::now(),
        reason: "shutdown".to_owned(),
    });
    tracing::info!("engine stopped");
    Ok(())
}
