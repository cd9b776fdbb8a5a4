mod common;

use common::TestEngine;
use lurebox::session::{SessionKind, SessionOptions, SessionState};
use lurebox::store::LabStore;

#[tokio::test(flavor = "multi_thread")]
async fn phishing_session_captures_credentials_end_to_end() {
    let engine = TestEngine::new();
    let summary = engine
        .registry
        .create(
            SessionKind::Phishing,
            SessionOptions {
                target: Some("victim@example.com".to_owned()),
            },
        )
        .await
        .unwrap();
    assert_eq!(summary.status, SessionState::Running);

    let client = reqwest::Client::new();
    let base = &summary.listener_url;

    // Harvest page, with the target pre-filled.
    let page = client
        .get(format!("{base}/login"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(page.contains("<form"));
    assert!(page.contains("victim@example.com"));

    // Victim submits credentials.
    let response = client
        .post(format!("{base}/login"))
        .form(&[("username", "victim@example.com"), ("password", "hunter2")])
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body = response.text().await.unwrap();
    assert!(body.contains("Thank you"));

    let status = engine.registry.get(summary.session_id).unwrap();
    assert!(status.success);
    assert_eq!(status.captured_count, 2);
    assert!(status.last_activity.is_some());

    // Exactly one capture alert, critical because full credentials landed.
    let alerts = engine.store.alerts_snapshot();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_type, "credential_capture");
    assert_eq!(alerts[0].severity, "critical");

    // Persisted record mirrors the registry view.
    let record = engine
        .store
        .get_session(summary.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.events.len(), 2);
    assert_eq!(record.status, SessionState::Running);

    engine.registry.stop(summary.session_id, "explicit").await.unwrap();
    assert!(
        client
            .get(format!("{base}/login"))
            .send()
            .await
            .is_err(),
        "stopped listener must refuse connections"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_phishing_path_is_404_but_still_captured() {
    let engine = TestEngine::new();
    let summary = engine
        .registry
        .create(SessionKind::Phishing, SessionOptions::default())
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/favicon.ico", summary.listener_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    let status = engine.registry.get(summary.session_id).unwrap();
    assert_eq!(status.captured_count, 1);
    assert!(!status.success);

    engine.registry.stop_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn mitm_session_intercepts_any_path() {
    let engine = TestEngine::new();
    let summary = engine
        .registry
        .create(SessionKind::Mitm, SessionOptions::default())
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let base = &summary.listener_url;

    // API-looking path gets JSON.
    let api = client
        .get(format!("{base}/api/v1/profile"))
        .send()
        .await
        .unwrap();
    assert_eq!(
        api.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );

    // Auth-looking path gets a simulated login page.
    let login = client
        .get(format!("{base}/account/signin"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(login.contains("<form"));

    // A bearer token on any request counts as a capture.
    client
        .delete(format!("{base}/whatever"))
        .header("authorization", "Bearer sekrit")
        .send()
        .await
        .unwrap();

    let status = engine.registry.get(summary.session_id).unwrap();
    assert_eq!(status.captured_count, 3);
    assert!(status.success);

    let alerts = engine.store.alerts_snapshot();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, "medium"); // bearer token tier

    engine.registry.stop_all().await;
}
