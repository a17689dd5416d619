//! Tests for rivven-dal target configuration

use rivven_dal::config::{SensitiveString, TargetConfig, DEFAULT_PORT};
use rivven_dal::error::ErrorCategory;
use std::time::Duration;

#[test]
fn test_from_json_camel_case_aliases() {
    let target = TargetConfig::from_json(
        r#"{
            "host": "db.local",
            "port": 3307,
            "user": "app",
            "password": "s3cret",
            "database": "crm",
            "connectionLimit": 4,
            "acquireTimeout": 250,
            "testOnBorrow": false
        }"#,
    )
    .unwrap();

    assert_eq!(target.port(), 3307);
    assert_eq!(target.connection_limit, 4);
    assert_eq!(target.acquire_timeout(), Duration::from_millis(250));
    assert!(!target.test_on_borrow);
    assert_eq!(target.password.expose_secret(), "s3cret");
}

#[test]
fn test_from_json_defaults() {
    let target =
        TargetConfig::from_json(r#"{"host": "h", "user": "u", "database": "d"}"#).unwrap();

    assert_eq!(target.port(), DEFAULT_PORT);
    assert_eq!(target.connection_limit, 10);
    assert_eq!(target.connect_timeout(), Duration::from_secs(10));
    assert!(target.test_on_borrow);
}

#[test]
fn test_from_json_rejects_invalid() {
    let err = TargetConfig::from_json(r#"{"host": "h", "user": "u"}"#).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);

    let err = TargetConfig::from_json(
        r#"{"host": "h", "user": "u", "database": "d", "connection_limit": 5000}"#,
    )
    .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);

    let err = TargetConfig::from_json(r#"{"host": "", "user": "u", "database": "d"}"#)
        .unwrap_err();
    assert!(err.to_string().contains("invalid target d"));
}

#[test]
fn test_builders() {
    let target = TargetConfig::new("h", "u", "p", "d")
        .with_port(3310)
        .with_connection_limit(2)
        .with_acquire_timeout(Duration::from_secs(1))
        .with_test_on_borrow(false);

    assert_eq!(target.display_target(), "h:3310/d");
    assert_eq!(target.connection_limit, 2);
    assert_eq!(target.acquire_timeout_ms, 1000);
    assert!(!target.test_on_borrow);
    assert!(target.check().is_ok());
}

#[test]
fn test_sensitive_string() {
    let secret = SensitiveString::from("hunter2");

    assert_eq!(format!("{secret:?}"), "[REDACTED]");
    assert_eq!(serde_json::to_string(&secret).unwrap(), "\"***REDACTED***\"");
    assert_eq!(secret.expose_secret(), "hunter2");
}
