//! Control API.
//!
//! The operator-facing HTTP surface: session lifecycle, admission checks,
//! and admin resets. Runs on its own bind address, separate from every
//! ephemeral listener.

use std::str::FromStr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{ActionType, ThreatLevel};
use crate::defense::alert::AlertDispatcher;
use crate::defense::lockout::LockoutEngine;
use crate::defense::rate_limit::RateLimiter;
use crate::error::SessionError;
use crate::observability::{Event, EventEmitter};
use crate::session::{SessionKind, SessionOptions, SessionRegistry};

/// Shared handles behind every control API handler.
#[derive(Clone)]
pub struct AppState {
    /// Session owner.
    pub registry: Arc<SessionRegistry>,
    /// Admission rate limiter.
    pub limiter: Arc<RateLimiter>,
    /// Lockout tracker.
    pub lockouts: Arc<LockoutEngine>,
    /// Alert dispatcher.
    pub alerts: Arc<AlertDispatcher>,
    /// Structured event stream.
    pub emitter: Arc<EventEmitter>,
}

/// Builds the control API router.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/stop", post(stop_session))
        .route("/admission/{action}", post(check_admission))
        .route("/admission/{action}/success", post(admission_success))
        .route("/admission/{action}/stats", get(admission_stats))
        .route("/admin/clear", post(admin_clear))
        .route("/admin/threat-level", post(set_threat_level))
        .route("/alerts/{id}/ack", post(acknowledge_alert))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Error payload returned by every failing control API call.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(id) => Self::NotFound(format!("unknown session: {id}")),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Session handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    kind: SessionKind,
    #[serde(default)]
    target: Option<String>,
}

async fn health() -> &'static str {
    "ok"
}

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Response, ApiError> {
    let summary = state
        .registry
        .create(req.kind, SessionOptions { target: req.target })
        .await?;
    Ok((StatusCode::CREATED, Json(summary)).into_response())
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let status = state
        .registry
        .get(id)
        .ok_or_else(|| ApiError::NotFound(format!("unknown session: {id}")))?;
    Ok(Json(status).into_response())
}

async fn stop_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    state.registry.stop(id, "explicit").await?;
    Ok(Json(serde_json::json!({"stopped": true})).into_response())
}

// ---------------------------------------------------------------------------
// Admission handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct IdentifierRequest {
    identifier: String,
}

/// Admission decision returned to callers.
#[derive(Debug, Serialize)]
struct AdmissionResponse {
    allowed: bool,
    remaining: u32,
    retry_after_seconds: u64,
    locked: bool,
}

fn parse_action(raw: &str) -> Result<ActionType, ApiError> {
    ActionType::from_str(raw).map_err(ApiError::BadRequest)
}

/// Lockout gate first, rate window second.
///
/// A locked identifier is refused without touching its rate window; a
/// denied rate check counts as one more failure toward the lockout
/// streak.
async fn check_admission(
    State(state): State<AppState>,
    Path(action): Path<String>,
    Json(req): Json<IdentifierRequest>,
) -> Result<Response, ApiError> {
    let action = parse_action(&action)?;
    let identifier = req.identifier;

    if state.lockouts.is_locked(&identifier) {
        let retry_after_seconds = state
            .lockouts
            .get(&identifier)
            .map_or(0, |record| {
                (record.expires_at - chrono::Utc::now()).num_seconds().max(0)
            })
            .unsigned_abs();
        state.emitter.emit(Event::AdmissionDenied {
            timestamp: chrono::Utc::now(),
            action: action.as_str().to_owned(),
            identifier,
            retry_after_seconds,
        });
        return Ok(Json(AdmissionResponse {
            allowed: false,
            remaining: 0,
            retry_after_seconds,
            locked: true,
        })
        .into_response());
    }

    let decision = state.limiter.check(action, &identifier);
    if !decision.allowed {
        state.lockouts.record_failure(&identifier).await;
        state.emitter.emit(Event::AdmissionDenied {
            timestamp: chrono::Utc::now(),
            action: action.as_str().to_owned(),
            identifier: identifier.clone(),
            retry_after_seconds: decision.retry_after_seconds,
        });
    }

    Ok(Json(AdmissionResponse {
        allowed: decision.allowed,
        remaining: decision.remaining,
        retry_after_seconds: decision.retry_after_seconds,
        locked: false,
    })
    .into_response())
}

async fn admission_success(
    State(state): State<AppState>,
    Path(action): Path<String>,
    Json(req): Json<IdentifierRequest>,
) -> Result<Response, ApiError> {
    parse_action(&action)?;
    state.lockouts.record_success(&req.identifier).await;
    Ok(Json(serde_json::json!({"cleared": true})).into_response())
}

async fn admission_stats(
    State(state): State<AppState>,
    Path(action): Path<String>,
) -> Result<Response, ApiError> {
    let action = parse_action(&action)?;
    Ok(Json(state.limiter.stats(action)).into_response())
}

// ---------------------------------------------------------------------------
// Admin handlers
// ---------------------------------------------------------------------------

async fn admin_clear(
    State(state): State<AppState>,
    Json(req): Json<IdentifierRequest>,
) -> Response {
    state.limiter.clear(&req.identifier);
    state.lockouts.clear(&req.identifier).await;
    Json(serde_json::json!({"cleared": true})).into_response()
}

#[derive(Debug, Deserialize)]
struct ThreatLevelRequest {
    level: ThreatLevel,
}

async fn set_threat_level(
    State(state): State<AppState>,
    Json(req): Json<ThreatLevelRequest>,
) -> Response {
    state.limiter.set_threat_level(req.level);
    tracing::info!(level = ?req.level, "threat level updated");
    Json(serde_json::json!({"threat_level": req.level})).into_response()
}

async fn acknowledge_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    if state.alerts.acknowledge(id).await {
        Ok(Json(serde_json::json!({"acknowledged": true})).into_response())
    } else {
        Err(ApiError::NotFound(format!("unknown alert: {id}")))
    }
}
