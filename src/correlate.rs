//! Credential correlation.
//!
//! Classifies captured traffic by scanning headers and the serialized body
//! for auth material. This is a heuristic substring scan, not a parser:
//! a body that merely mentions "password" in prose will classify as
//! credentials. Good enough for a simulation lab, documented as such.

use serde::{Deserialize, Serialize};

use crate::defense::alert::Severity;
use crate::session::CapturedBody;

/// The kind of auth material detected in a captured request.
///
/// Ordered by detection priority: when several kinds match, the first in
/// this order wins as the classification and the rest land in evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    /// `Authorization` header present.
    BearerToken,
    /// Cookie name containing `session`, `auth`, or `token`.
    SessionCookie,
    /// Body text containing `password` or `username`.
    Credentials,
    /// Body text containing `2fa`, `otp`, or `totp`.
    TwoFaCode,
}

impl AuthKind {
    /// Stable string form used in events and alert payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BearerToken => "bearer_token",
            Self::SessionCookie => "session_cookie",
            Self::Credentials => "credentials",
            Self::TwoFaCode => "2fa_code",
        }
    }

    /// Alert severity when this kind is captured.
    ///
    /// Full credentials are the worst case; a bare session cookie the
    /// mildest.
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::Credentials => Severity::Critical,
            Self::TwoFaCode => Severity::High,
            Self::BearerToken => Severity::Medium,
            Self::SessionCookie => Severity::Low,
        }
    }
}

impl std::fmt::Display for AuthKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of scanning one captured request for auth material.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthAnalysis {
    /// Whether any auth material was detected.
    pub found: bool,
    /// Highest-priority kind detected, if any.
    pub kind: Option<AuthKind>,
    /// One entry per matched indicator, in detection order.
    pub evidence: Vec<String>,
}

/// Scans headers and body for auth material.
///
/// Detection order is fixed: Authorization header, then cookies, then body
/// credentials, then body 2FA markers. The first match sets `kind`; every
/// match contributes evidence. Header names and cookie/body text are
/// matched case-insensitively.
#[must_use]
pub fn analyze(headers: &[(String, String)], body: &CapturedBody) -> AuthAnalysis {
    let mut analysis = AuthAnalysis::default();

    if headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("authorization"))
    {
        record(&mut analysis, AuthKind::BearerToken, "authorization header");
    }

    let cookies: String = headers
        .iter()
        .filter(|(name, _)| name.eq_ignore_ascii_case("cookie"))
        .map(|(_, value)| value.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("; ");
    if ["session", "auth", "token"]
        .iter()
        .any(|marker| cookies.contains(marker))
    {
        record(&mut analysis, AuthKind::SessionCookie, "session cookie");
    }

    let text = body.scan_text().to_ascii_lowercase();
    if ["password", "username"]
        .iter()
        .any(|marker| text.contains(marker))
    {
        record(&mut analysis, AuthKind::Credentials, "credential fields in body");
    }
    if ["2fa", "otp", "totp"].iter().any(|marker| text.contains(marker)) {
        record(&mut analysis, AuthKind::TwoFaCode, "2fa token in body");
    }

    analysis
}

fn record(analysis: &mut AuthAnalysis, kind: AuthKind, evidence: &str) {
    analysis.found = true;
    if analysis.kind.is_none() {
        analysis.kind = Some(kind);
    }
    analysis.evidence.push(evidence.to_owned());
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn header(name: &str, value: &str) -> (String, String) {
        (name.to_owned(), value.to_owned())
    }

    #[test]
    fn empty_request_yields_no_findings() {
        let analysis = analyze(&[], &CapturedBody::Empty);
        assert!(!analysis.found);
        assert!(analysis.kind.is_none());
        assert!(analysis.evidence.is_empty());
    }

    #[test]
    fn authorization_header_classifies_as_bearer() {
        let headers = vec![header("Authorization", "Bearer abc123")];
        let analysis = analyze(&headers, &CapturedBody::Empty);
        assert!(analysis.found);
        assert_eq!(analysis.kind, Some(AuthKind::BearerToken));
    }

    #[test]
    fn cookie_markers_classify_as_session_cookie() {
        for cookie in ["sessionid=xyz", "auth=1", "csrf_token=a"] {
            let headers = vec![header("Cookie", cookie)];
            let analysis = analyze(&headers, &CapturedBody::Empty);
            assert_eq!(analysis.kind, Some(AuthKind::SessionCookie), "{cookie}");
        }
    }

    #[test]
    fn unrelated_cookie_is_ignored() {
        let headers = vec![header("Cookie", "theme=dark; lang=en")];
        let analysis = analyze(&headers, &CapturedBody::Empty);
        assert!(!analysis.found);
    }

    #[test]
    fn form_body_with_password_classifies_as_credentials() {
        let body = CapturedBody::Form(BTreeMap::from([
            ("username".to_owned(), "alice".to_owned()),
            ("password".to_owned(), "hunter2".to_owned()),
        ]));
        let analysis = analyze(&[], &body);
        assert_eq!(analysis.kind, Some(AuthKind::Credentials));
    }

    #[test]
    fn json_body_with_otp_classifies_as_2fa() {
        let body = CapturedBody::Json(serde_json::json!({"otp": "123456"}));
        let analysis = analyze(&[], &body);
        assert_eq!(analysis.kind, Some(AuthKind::TwoFaCode));
    }

    #[test]
    fn detection_is_case_insensitive() {
        let body = CapturedBody::Raw("PASSWORD=secret".to_owned());
        let analysis = analyze(&[], &body);
        assert_eq!(analysis.kind, Some(AuthKind::Credentials));
    }

    #[test]
    fn first_match_wins_but_evidence_accumulates() {
        let headers = vec![
            header("Authorization", "Bearer t"),
            header("Cookie", "sessionid=1"),
        ];
        let body = CapturedBody::Raw("username=a&password=b&otp=123".to_owned());
        let analysis = analyze(&headers, &body);

        assert_eq!(analysis.kind, Some(AuthKind::BearerToken));
        assert_eq!(analysis.evidence.len(), 4);
    }

    #[test]
    fn severity_mapping_by_kind() {
        assert_eq!(AuthKind::Credentials.severity(), Severity::Critical);
        assert_eq!(AuthKind::TwoFaCode.severity(), Severity::High);
        assert_eq!(AuthKind::BearerToken.severity(), Severity::Medium);
        assert_eq!(AuthKind::SessionCookie.severity(), Severity::Low);
    }
}
