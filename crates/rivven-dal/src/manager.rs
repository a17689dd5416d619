//! Connection and transaction manager
//!
//! [`ConnectionManager`] owns the active [`Pool`] and hands out scoped
//! resources:
//!
//! - [`ScopedConnection`]: returned to the pool when dropped
//! - [`ScopedTransaction`]: `BEGIN` on acquire, then exactly one of commit or
//!   rollback before the connection goes back
//!
//! # Example
//!
//! ```rust,ignore
//! use rivven_dal::prelude::*;
//!
//! let manager = ConnectionManager::new(target, Arc::new(MySqlConnectionFactory))?;
//!
//! manager
//!     .transaction(|tx| {
//!         Box::pin(async move {
//!             tx.execute("INSERT INTO audit (msg) VALUES (?)", &["start".into()]).await?;
//!             tx.execute("UPDATE jobs SET state = 'running' WHERE id = ?", &[7.into()]).await?;
//!             Ok(())
//!         })
//!     })
//!     .await?;
//! ```

use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::builder::{build_insert, build_multi_insert, build_select, build_update, Statement};
use crate::config::TargetConfig;
use crate::connection::{Connection, ConnectionFactory};
use crate::error::{Error, Result};
use crate::literal::to_param;
use crate::pool::{Pool, PoolStats, ScopedConnection};
use crate::types::{Record, RowSet, Value};

/// `tracing` target for statement text
pub const SQL_LOG_TARGET: &str = "rivven_dal::sql";

/// A transaction bound to one pooled connection.
///
/// Finish with [`commit`](Self::commit) or [`rollback`](Self::rollback).
/// A guard dropped without either rolls back on a spawned task and only then
/// gives the connection back.
pub struct ScopedTransaction {
    conn: Option<ScopedConnection>,
}

impl ScopedTransaction {
    async fn begin(mut conn: ScopedConnection) -> Result<Self> {
        // A cancelled BEGIN leaves the session state unknown.
        conn.taint();
        if let Err(e) = conn.begin().await {
            conn.discard().await;
            return Err(e);
        }
        conn.untaint();
        Ok(Self { conn: Some(conn) })
    }

    fn take(&mut self) -> Result<ScopedConnection> {
        let mut conn = self
            .conn
            .take()
            .ok_or_else(|| Error::transaction("transaction already finished"))?;
        // Closed rather than parked if the caller is cancelled mid-COMMIT.
        conn.taint();
        Ok(conn)
    }

    /// Commit and release the connection.
    ///
    /// If the commit fails, a rollback is attempted before release.
    pub async fn commit(mut self) -> Result<()> {
        let mut conn = self.take()?;
        match conn.commit().await {
            Ok(()) => {
                conn.untaint();
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Commit failed, rolling back");
                finish_rollback(conn).await;
                Err(e)
            }
        }
    }

    /// Roll back and release the connection
    pub async fn rollback(mut self) -> Result<()> {
        let mut conn = self.take()?;
        match conn.rollback().await {
            Ok(()) => {
                conn.untaint();
                Ok(())
            }
            Err(e) => {
                conn.discard().await;
                Err(e)
            }
        }
    }

    /// Get the underlying connection
    pub fn connection(&self) -> &(dyn Connection + 'static) {
        self.conn
            .as_ref()
            .map(ScopedConnection::connection)
            .expect("transaction already finished")
    }
}

impl std::ops::Deref for ScopedTransaction {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection()
    }
}

impl Drop for ScopedTransaction {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        warn!("Transaction dropped without commit or rollback, rolling back");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(finish_rollback(conn));
            }
            // No runtime to roll back on: the connection must not be reused.
            Err(_) => conn.abandon(),
        }
    }
}

impl std::fmt::Debug for ScopedTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedTransaction")
            .field("open", &self.conn.is_some())
            .finish()
    }
}

async fn finish_rollback(mut conn: ScopedConnection) {
    conn.taint();
    match conn.rollback().await {
        Ok(()) => conn.untaint(),
        Err(e) => {
            warn!(error = %e, "Rollback failed, discarding connection");
            conn.discard().await;
        }
    }
}

/// Owner of the active connection pool.
///
/// `configure` swaps in a new pool. Callers holding or waiting for a
/// resource of the old pool finish on it; the old pool closes each
/// connection as it comes back.
pub struct ConnectionManager {
    pool: RwLock<Arc<Pool>>,
    factory: Arc<dyn ConnectionFactory>,
}

impl ConnectionManager {
    /// Create a manager with a pool for `target`
    pub fn new(target: TargetConfig, factory: Arc<dyn ConnectionFactory>) -> Result<Self> {
        let pool = Pool::new(target, Arc::clone(&factory))?;
        info!(
            target_db = %pool.target().display_target(),
            backend = factory.backend(),
            "Connection manager ready"
        );
        Ok(Self {
            pool: RwLock::new(pool),
            factory,
        })
    }

    /// Replace the pool with one for `target`.
    ///
    /// The old pool is retired, not shut down: its idle connections are
    /// closed, but callers already waiting on it are still served and
    /// nothing waits for checked-out connections.
    pub async fn configure(&self, target: TargetConfig) -> Result<()> {
        let next = Pool::new(target, Arc::clone(&self.factory))?;
        let previous = std::mem::replace(&mut *self.pool.write(), Arc::clone(&next));
        info!(
            from = %previous.target().display_target(),
            to = %next.target().display_target(),
            "Connection pool replaced"
        );
        previous.retire().await;
        Ok(())
    }

    /// Snapshot of the active pool
    pub fn pool(&self) -> Arc<Pool> {
        Arc::clone(&self.pool.read())
    }

    /// Check out a connection from the active pool
    pub async fn acquire_connection(&self) -> Result<ScopedConnection> {
        self.pool().get().await
    }

    /// Check out a connection and start a transaction on it
    pub async fn acquire_transaction(&self) -> Result<ScopedTransaction> {
        let conn = self.acquire_connection().await?;
        ScopedTransaction::begin(conn).await
    }

    /// Run `f` with a scoped connection
    pub async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c ScopedConnection) -> BoxFuture<'c, Result<T>>,
    {
        let conn = self.acquire_connection().await?;
        let outcome = f(&conn).await;
        drop(conn);
        outcome
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`; the
    /// error from `f` is returned unchanged.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'t> FnOnce(&'t ScopedTransaction) -> BoxFuture<'t, Result<T>>,
    {
        let tx = self.acquire_transaction().await?;
        let outcome = f(&tx).await;
        match outcome {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                debug!(error = %e, "Unit of work failed, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Execute one statement on a fresh scoped connection.
    ///
    /// With `log` set, the statement is emitted on the `rivven_dal::sql`
    /// target before it runs.
    pub async fn execute(&self, sql: &str, params: &[Value], log: bool) -> Result<RowSet> {
        if log {
            info!(target: SQL_LOG_TARGET, sql, params = ?params, "Executing statement");
        }
        // Lists and JSON containers never bind to a single placeholder.
        for param in params {
            to_param(param)?;
        }
        let conn = self.acquire_connection().await?;
        let result = conn.query(sql, params).await;
        drop(conn);
        result
    }

    /// Execute a built statement
    pub async fn execute_statement(&self, statement: &Statement, log: bool) -> Result<RowSet> {
        self.execute(statement.sql(), statement.params(), log).await
    }

    /// Run several statements as one multi-statement text.
    ///
    /// Uses a dedicated non-pooled connection that is closed afterwards,
    /// whether the batch succeeded or not.
    pub async fn execute_batch<S: AsRef<str>>(&self, statements: &[S], log: bool) -> Result<RowSet> {
        let sql = join_statements(statements);
        if sql.is_empty() {
            return Ok(RowSet::default());
        }
        if log {
            info!(target: SQL_LOG_TARGET, sql = %sql, "Executing batch");
        }

        let pool = self.pool();
        let conn = self.factory.connect_batch(pool.target()).await?;
        let result = conn.execute_multi(&sql).await;
        if let Err(e) = conn.close().await {
            warn!(error = %e, "Error closing batch connection");
        }
        result
    }

    /// `SELECT *` with equality predicates
    pub async fn select(&self, table: &str, predicates: &Record, log: bool) -> Result<RowSet> {
        self.execute_statement(&build_select(table, predicates)?, log)
            .await
    }

    /// Insert one record
    pub async fn insert(&self, table: &str, record: &Record, log: bool) -> Result<RowSet> {
        self.execute_statement(&build_insert(table, record)?, log)
            .await
    }

    /// Insert several records with one statement
    pub async fn insert_many(&self, table: &str, records: &[Record], log: bool) -> Result<RowSet> {
        self.execute_statement(&build_multi_insert(table, records)?, log)
            .await
    }

    /// Update rows matching `predicates`
    pub async fn update(
        &self,
        table: &str,
        predicates: &Record,
        assignments: &Record,
        log: bool,
    ) -> Result<RowSet> {
        self.execute_statement(&build_update(table, predicates, assignments)?, log)
            .await
    }

    /// Statistics of the active pool
    pub fn stats(&self) -> PoolStats {
        self.pool().stats()
    }

    /// Connections of the active pool that can be checked out without waiting
    pub fn available(&self) -> usize {
        self.pool().available()
    }

    /// Close the active pool
    pub async fn close(&self) {
        self.pool().close().await;
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("pool", &*self.pool.read())
            .field("backend", &self.factory.backend())
            .finish()
    }
}

/// Join statements with `;`, dropping blanks and trailing separators
fn join_statements<S: AsRef<str>>(statements: &[S]) -> String {
    statements
        .iter()
        .map(|s| s.as_ref().trim().trim_end_matches(';').trim_end())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_statements() {
        let sql = join_statements(&["INSERT INTO t VALUES (1);", "  ", "UPDATE t SET a = 2 ;;"]);
        assert_eq!(sql, "INSERT INTO t VALUES (1); UPDATE t SET a = 2");
        assert_eq!(join_statements::<&str>(&[]), "");
    }
}
