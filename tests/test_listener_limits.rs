mod common;

use std::time::Duration;

use common::TestEngine;
use lurebox::config::ListenerConfig;
use lurebox::session::{SessionKind, SessionOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test(flavor = "multi_thread")]
async fn oversized_body_is_rejected_and_not_recorded() {
    let engine = TestEngine::with_config(ListenerConfig {
        port_start: 0,
        port_range: 1,
        max_body_bytes: 64,
        ..ListenerConfig::default()
    });
    let summary = engine
        .registry
        .create(SessionKind::Phishing, SessionOptions::default())
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/login", summary.listener_url))
        .header("content-type", "application/x-www-form-urlencoded")
        .body(format!("password={}", "x".repeat(1024)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    // The oversized request left no trace on the session.
    let status = engine.registry.get(summary.session_id).unwrap();
    assert_eq!(status.captured_count, 0);
    assert!(!status.success);

    // Only that request was aborted; the listener keeps capturing.
    let ok = client
        .get(format!("{}/login", summary.listener_url))
        .send()
        .await
        .unwrap();
    assert!(ok.status().is_success());
    assert_eq!(
        engine.registry.get(summary.session_id).unwrap().captured_count,
        1
    );

    engine.registry.stop_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn stalled_body_read_times_out_with_a_generic_error() {
    let engine = TestEngine::with_config(ListenerConfig {
        port_start: 0,
        port_range: 1,
        read_timeout_ms: 200,
        ..ListenerConfig::default()
    });
    let summary = engine
        .registry
        .create(SessionKind::Phishing, SessionOptions::default())
        .await
        .unwrap();
    let addr = summary.listener_url.trim_start_matches("http://").to_owned();

    // Declare a body and never finish sending it.
    let mut stream = TcpStream::connect(&addr).await.unwrap();
    stream
        .write_all(
            b"POST /login HTTP/1.1\r\n\
              host: lab\r\n\
              content-type: application/x-www-form-urlencoded\r\n\
              content-length: 512\r\n\r\n\
              password=",
        )
        .await
        .unwrap();

    let mut buf = vec![0u8; 1024];
    let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("no response before the read timeout fired")
        .unwrap();
    let response = String::from_utf8_lossy(&buf[..n]);
    assert!(
        response.starts_with("HTTP/1.1 400"),
        "expected a generic 400, got: {response}"
    );

    // Nothing recorded, and the session keeps serving.
    let status = engine.registry.get(summary.session_id).unwrap();
    assert_eq!(status.captured_count, 0);
    let ok = reqwest::get(format!("{}/login", summary.listener_url))
        .await
        .unwrap();
    assert!(ok.status().is_success());

    engine.registry.stop_all().await;
}
