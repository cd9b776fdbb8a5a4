mod common;

use common::TestEngine;
use lurebox::defense::lockout::LockoutLevel;

const ID: &str = "user:mallory|ip:203.0.113.9";

#[tokio::test(flavor = "multi_thread")]
async fn failure_streak_escalates_and_alerts_at_the_right_tiers() {
    let engine = TestEngine::new();

    // Six failures: short then medium, nothing alert-worthy.
    for _ in 0..6 {
        engine.lockouts.record_failure(ID).await;
    }
    let record = engine.lockouts.get(ID).unwrap();
    assert_eq!(record.level, LockoutLevel::Medium);
    assert_eq!(record.failure_count, 6);
    assert_eq!(engine.store.alert_count(), 0);

    // Seventh failure enters Long: one high alert.
    engine.lockouts.record_failure(ID).await;
    let alerts = engine.store.alerts_snapshot();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, "high");
    assert_eq!(alerts[0].alert_type, "failed_logins");
    assert_eq!(alerts[0].subject, ID);

    // Up to ten failures: still Long, still one alert.
    for _ in 0..3 {
        engine.lockouts.record_failure(ID).await;
    }
    assert_eq!(engine.lockouts.get(ID).unwrap().level, LockoutLevel::Long);
    assert_eq!(engine.store.alert_count(), 1);

    // Eleventh failure enters Extended: exactly one critical alert.
    let record = engine.lockouts.record_failure(ID).await;
    assert_eq!(record.level, LockoutLevel::Extended);
    let alerts = engine.store.alerts_snapshot();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[1].severity, "critical");

    // Critical failed-login alerts carry the automated account lock.
    assert!(engine.lockouts.is_locked(ID));
}

#[tokio::test(flavor = "multi_thread")]
async fn success_resets_the_streak_between_escalations() {
    let engine = TestEngine::new();

    for _ in 0..5 {
        engine.lockouts.record_failure(ID).await;
    }
    assert!(engine.lockouts.is_locked(ID));

    engine.lockouts.record_success(ID).await;
    assert!(!engine.lockouts.is_locked(ID));

    // The next streak starts over from Short.
    let record = engine.lockouts.record_failure(ID).await;
    assert_eq!(record.level, LockoutLevel::Short);
    assert_eq!(record.failure_count, 1);
}
