//! Unit tests for rivven-dal error module

use rivven_dal::error::{Error, ErrorCategory};

#[test]
fn test_error_connection() {
    let err = Error::connection("Failed to connect");

    assert_eq!(err.category(), ErrorCategory::Connection);
    assert!(err.to_string().contains("Failed to connect"));
    assert!(err.is_retriable());
}

#[test]
fn test_error_pool_exhausted() {
    let err = Error::pool_exhausted("timeout waiting for connection (50ms)");

    assert_eq!(err.category(), ErrorCategory::PoolExhausted);
    assert!(err.is_retriable());
}

#[test]
fn test_error_config() {
    let err = Error::config("connection_limit out of range");

    assert_eq!(err.category(), ErrorCategory::Configuration);
    assert!(err.to_string().contains("connection_limit"));
    assert!(!err.is_retriable());
}

#[test]
fn test_error_transaction() {
    let err = Error::transaction("COMMIT failed");

    assert_eq!(err.category(), ErrorCategory::Transaction);
    assert!(err.to_string().contains("COMMIT failed"));
    assert!(!err.is_retriable());
}

#[test]
fn test_error_empty_sets() {
    let insert = Error::empty_insert("items");
    let update = Error::empty_update("items");

    assert_eq!(insert.category(), ErrorCategory::Statement);
    assert_eq!(update.category(), ErrorCategory::Statement);
    assert_eq!(insert.to_string(), "empty insert set for table items");
    assert_eq!(update.to_string(), "empty update set for table items");
}

#[test]
fn test_error_invalid_value_with_column() {
    let err = Error::invalid_value("LIST");
    assert_eq!(err.to_string(), "invalid value type LIST");

    let err = err.for_column("tags");
    assert_eq!(err.category(), ErrorCategory::Value);
    assert_eq!(err.to_string(), "invalid value type LIST for column tags");

    // The first column attached wins
    let err = err.for_column("other");
    assert!(err.to_string().ends_with("for column tags"));
}

#[test]
fn test_for_column_leaves_other_errors_alone() {
    let err = Error::empty_insert("t").for_column("a");
    assert!(matches!(err, Error::EmptyInsertSet { .. }));
}

#[test]
fn test_error_duplicate_key() {
    let err = Error::DuplicateKey {
        key: "sku".into(),
        value: "A-1".into(),
    };

    assert_eq!(err.category(), ErrorCategory::Staging);
    assert_eq!(err.to_string(), "duplicate \"sku\" in staging area: A-1");
    assert!(!err.is_retriable());
}

#[test]
fn test_error_statement_carries_sql() {
    let err = Error::statement_with_sql("Unknown column 'x'", "SELECT x FROM t");

    assert_eq!(err.category(), ErrorCategory::Execution);
    assert_eq!(err.sql(), Some("SELECT x FROM t"));
    assert_eq!(Error::statement("boom").sql(), None);
}

#[test]
fn test_error_source_chain() {
    let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
    let err = Error::connection_with_source("lost connection", io);

    let source = std::error::Error::source(&err).map(ToString::to_string);
    assert_eq!(source.as_deref(), Some("reset by peer"));
}

#[test]
fn test_category_display() {
    assert_eq!(ErrorCategory::Connection.to_string(), "connection");
    assert_eq!(ErrorCategory::Value.to_string(), "value");
}
