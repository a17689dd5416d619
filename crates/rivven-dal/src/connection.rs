//! Connection traits for rivven-dal
//!
//! Core abstractions for database connectivity:
//! - Connection: pooled connection with statement execution and transaction control
//! - BatchConnection: non-pooled connection that runs multi-statement text
//! - ConnectionFactory: opens both kinds for a [`TargetConfig`]

use async_trait::async_trait;

use crate::config::TargetConfig;
use crate::error::Result;
use crate::types::{Row, RowSet, Value};

/// A connection to a database
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a statement and return its rows and modification counters
    async fn query(&self, sql: &str, params: &[Value]) -> Result<RowSet>;

    /// Execute a statement that modifies data, returns affected row count
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        Ok(self.query(sql, params).await?.affected_rows())
    }

    /// Execute a statement and return the first row (convenience method)
    async fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params).await?.into_iter().next())
    }

    /// Start a transaction on this connection
    async fn begin(&self) -> Result<()>;

    /// Commit the open transaction
    async fn commit(&self) -> Result<()>;

    /// Roll back the open transaction
    async fn rollback(&self) -> Result<()>;

    /// Check if connection is valid/alive
    async fn is_valid(&self) -> bool;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// A dedicated connection opened in multi-statement mode.
///
/// Never pooled: opened for one batch and closed right after.
#[async_trait]
pub trait BatchConnection: Send + Sync {
    /// Run `;`-separated statements, one result set per statement
    async fn execute_multi(&self, sql: &str) -> Result<RowSet>;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// Factory for creating connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Create a new poolable connection
    async fn connect(&self, target: &TargetConfig) -> Result<Box<dyn Connection>>;

    /// Create a new multi-statement connection
    async fn connect_batch(&self, target: &TargetConfig) -> Result<Box<dyn BatchConnection>>;

    /// Short backend name for log lines
    fn backend(&self) -> &'static str;
}
