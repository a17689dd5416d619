//! Tests for the rivven-dal MySQL backend against a real server
//!
//! Run with: cargo test -p rivven-dal --test mysql_test -- --ignored

#![cfg(feature = "mysql")]

use rivven_dal::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::mysql::Mysql;

struct MySqlServer {
    _container: ContainerAsync<Mysql>,
    manager: ConnectionManager,
}

async fn start() -> MySqlServer {
    let container = Mysql::default()
        .with_env_var("MYSQL_ROOT_PASSWORD", "rootpassword")
        .start()
        .await
        .expect("Failed to start MySQL container");
    let host = container.get_host().await.unwrap().to_string();
    let port = container.get_host_port_ipv4(3306).await.unwrap();

    let target = TargetConfig::new(host, "root", "rootpassword", "test").with_port(port);
    let manager = ConnectionManager::new(target, Arc::new(MySqlConnectionFactory)).unwrap();

    // The container reports ready before it accepts logins
    for _ in 0..120 {
        if manager.execute("SELECT 1", &[], false).await.is_ok() {
            return MySqlServer {
                _container: container,
                manager,
            };
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("MySQL did not become ready");
}

#[tokio::test]
#[ignore = "Requires Docker; run with --ignored"]
async fn test_mysql_pooled_connection_refuses_stacked_statements() {
    let server = start().await;
    let manager = &server.manager;

    manager
        .execute("CREATE TABLE items (id INT PRIMARY KEY, sku VARCHAR(16))", &[], false)
        .await
        .unwrap();

    let err = manager
        .execute(
            "INSERT INTO items VALUES (1, 'A'); INSERT INTO items VALUES (2, 'B')",
            &[],
            false,
        )
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Execution);

    let rows = manager
        .execute("SELECT COUNT(*) AS n FROM items", &[], false)
        .await
        .unwrap();
    assert_eq!(rows.into_records(), vec![record! { "n" => 0 }]);

    // The same text is fine on a batch connection
    let batch = manager
        .execute_batch(
            &["INSERT INTO items VALUES (1, 'A')", "INSERT INTO items VALUES (2, 'B')"],
            false,
        )
        .await
        .unwrap();
    assert_eq!(batch.results().len(), 2);
    assert_eq!(batch.affected_rows(), 2);
}

#[tokio::test]
#[ignore = "Requires Docker; run with --ignored"]
async fn test_mysql_values_round_trip_typed() {
    let server = start().await;
    let manager = &server.manager;

    manager
        .execute(
            "CREATE TABLE people (id BIGINT AUTO_INCREMENT PRIMARY KEY, name VARCHAR(32), active TINYINT)",
            &[],
            false,
        )
        .await
        .unwrap();

    let inserted = manager
        .insert("people", &record! { "name" => "O'Brien", "active" => true }, true)
        .await
        .unwrap();
    assert_eq!(inserted.last_insert_id(), Some(1));

    let rows = manager
        .select("people", &record! { "name" => "O'Brien" }, false)
        .await
        .unwrap();
    assert_eq!(
        rows.into_records(),
        vec![record! { "id" => 1, "name" => "O'Brien", "active" => 1 }]
    );

    let err = manager
        .execute("SELECT * FROM people WHERE id = ?", &[Value::List(vec![Value::Int(1)])], false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidValueType { .. }));
}
