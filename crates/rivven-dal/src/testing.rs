//! Testing utilities for rivven-dal
//!
//! [`MockConnectionFactory`] is an in-memory backend that records every
//! statement in a shared journal:
//!
//! - outside a transaction a statement is committed immediately
//! - inside a transaction statements are buffered and only reach the journal
//!   on `COMMIT`; `ROLLBACK` discards them
//! - `SELECT` returns canned rows registered with
//!   [`with_rows`](MockConnectionFactory::with_rows), or else the committed
//!   journal as `(seq, sql)` rows
//!
//! # Example
//!
//! ```rust,ignore
//! use rivven_dal::testing::MockConnectionFactory;
//!
//! let mock = MockConnectionFactory::new();
//! let manager = ConnectionManager::new(target, Arc::new(mock.clone()))?;
//!
//! manager.execute("INSERT INTO t (a) VALUES (?)", &[1.into()], false).await?;
//! assert_eq!(mock.committed(), vec!["INSERT INTO t (a) VALUES (1)"]);
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::builder::Statement;
use crate::config::TargetConfig;
use crate::connection::{BatchConnection, Connection, ConnectionFactory};
use crate::error::{Error, Result};
use crate::types::{Record, Row, RowSet, Value};

#[derive(Debug, Default)]
struct MockState {
    committed: Vec<String>,
    executed: Vec<String>,
    canned: Vec<(String, Vec<Record>)>,
    opened: usize,
    closed: usize,
    batch_opened: usize,
    batch_closed: usize,
    next_insert_id: u64,
    fail_next_connect: bool,
    fail_marker: Option<String>,
    invalid: bool,
}

impl MockState {
    fn check_failure(&self, sql: &str) -> Result<()> {
        match &self.fail_marker {
            Some(marker) if sql.contains(marker.as_str()) => Err(Error::statement_with_sql(
                format!("mock failure on '{marker}'"),
                sql,
            )),
            _ => Ok(()),
        }
    }

    fn select(&self, sql: &str) -> RowSet {
        if let Some((_, rows)) = self.canned.iter().find(|(pattern, _)| sql.contains(pattern)) {
            return RowSet::new(rows.iter().cloned().map(Row::from).collect());
        }
        let rows = self
            .committed
            .iter()
            .enumerate()
            .map(|(i, stmt)| {
                Row::new(
                    vec!["seq".into(), "sql".into()],
                    vec![Value::Int(i as i64), Value::Text(stmt.clone())],
                )
            })
            .collect();
        RowSet::new(rows)
    }

    fn modify(&mut self, sql: &str) -> RowSet {
        let last_insert_id = if starts_with_keyword(sql, "INSERT") {
            self.next_insert_id += 1;
            Some(self.next_insert_id)
        } else {
            None
        };
        RowSet::affected(1, last_insert_id)
    }
}

/// In-memory [`ConnectionFactory`] with a shared statement journal
#[derive(Debug, Clone, Default)]
pub struct MockConnectionFactory {
    state: Arc<Mutex<MockState>>,
}

impl MockConnectionFactory {
    /// Create a new mock backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `SELECT`s containing `pattern` with `rows`
    pub fn with_rows(self, pattern: impl Into<String>, rows: Vec<Record>) -> Self {
        self.state.lock().canned.push((pattern.into(), rows));
        self
    }

    /// Fail the next `connect`/`connect_batch` call
    pub fn fail_next_connect(&self) {
        self.state.lock().fail_next_connect = true;
    }

    /// Fail every statement whose text contains `marker`
    pub fn fail_statements_containing(&self, marker: impl Into<String>) {
        self.state.lock().fail_marker = Some(marker.into());
    }

    /// Report every open connection as invalid on the next validation
    pub fn invalidate_connections(&self) {
        self.state.lock().invalid = true;
    }

    /// Clear configured failures
    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.fail_next_connect = false;
        state.fail_marker = None;
        state.invalid = false;
    }

    /// Committed statements, in commit order
    pub fn committed(&self) -> Vec<String> {
        self.state.lock().committed.clone()
    }

    /// Every statement attempted, including transaction control
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().executed.clone()
    }

    /// Pooled connections opened
    pub fn opened(&self) -> usize {
        self.state.lock().opened
    }

    /// Pooled connections closed
    pub fn closed(&self) -> usize {
        self.state.lock().closed
    }

    /// Batch connections opened
    pub fn batch_opened(&self) -> usize {
        self.state.lock().batch_opened
    }

    /// Batch connections closed
    pub fn batch_closed(&self) -> usize {
        self.state.lock().batch_closed
    }

    fn take_connect_failure(&self) -> Result<()> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_connect) {
            return Err(Error::connection("mock connect failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    async fn connect(&self, _target: &TargetConfig) -> Result<Box<dyn Connection>> {
        self.take_connect_failure()?;
        self.state.lock().opened += 1;
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
            pending: Mutex::new(None),
            closed: AtomicBool::new(false),
        }))
    }

    async fn connect_batch(&self, _target: &TargetConfig) -> Result<Box<dyn BatchConnection>> {
        self.take_connect_failure()?;
        self.state.lock().batch_opened += 1;
        Ok(Box::new(MockBatchConnection {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }

    fn backend(&self) -> &'static str {
        "mock"
    }
}

/// Pooled mock connection
#[derive(Debug)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
    /// Buffered statements of the open transaction, `None` outside one
    pending: Mutex<Option<Vec<String>>>,
    closed: AtomicBool,
}

impl MockConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::connection("connection is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<RowSet> {
        self.ensure_open()?;
        let text = if params.is_empty() {
            sql.to_string()
        } else {
            Statement::new(sql, params.to_vec()).inline()?
        };

        let mut state = self.state.lock();
        state.executed.push(text.clone());
        state.check_failure(&text)?;

        if starts_with_keyword(&text, "SELECT") {
            return Ok(state.select(&text));
        }
        let result = state.modify(&text);
        match self.pending.lock().as_mut() {
            Some(buffer) => buffer.push(text),
            None => state.committed.push(text),
        }
        Ok(result)
    }

    async fn begin(&self) -> Result<()> {
        self.ensure_open()?;
        self.state.lock().executed.push("BEGIN".into());
        let mut pending = self.pending.lock();
        if pending.is_some() {
            return Err(Error::transaction("transaction already open"));
        }
        *pending = Some(Vec::new());
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        state.executed.push("COMMIT".into());
        state.check_failure("COMMIT")?;
        let buffered = self
            .pending
            .lock()
            .take()
            .ok_or_else(|| Error::transaction("no transaction open"))?;
        state.committed.extend(buffered);
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.ensure_open()?;
        self.state.lock().executed.push("ROLLBACK".into());
        self.pending.lock().take();
        Ok(())
    }

    async fn is_valid(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && !self.state.lock().invalid
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.state.lock().closed += 1;
        }
        Ok(())
    }
}

/// Multi-statement mock connection
#[derive(Debug)]
pub struct MockBatchConnection {
    state: Arc<Mutex<MockState>>,
    closed: AtomicBool,
}

#[async_trait]
impl BatchConnection for MockBatchConnection {
    async fn execute_multi(&self, sql: &str) -> Result<RowSet> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::connection("connection is closed"));
        }
        let mut state = self.state.lock();
        let mut results = Vec::new();
        for stmt in split_statements(sql) {
            state.executed.push(stmt.clone());
            state.check_failure(&stmt)?;
            if starts_with_keyword(&stmt, "SELECT") {
                results.push(state.select(&stmt));
            } else {
                results.push(state.modify(&stmt));
                state.committed.push(stmt);
            }
        }
        Ok(RowSet::batch(results))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.state.lock().batch_closed += 1;
        }
        Ok(())
    }
}

fn starts_with_keyword(sql: &str, keyword: &str) -> bool {
    sql.trim_start()
        .get(..keyword.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(keyword))
}

/// Split multi-statement text on `;` outside quotes
fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in sql.chars() {
        match (quote, c) {
            (None, ';') => {
                statements.push(std::mem::take(&mut current));
                continue;
            }
            (None, '\'' | '`' | '"') => quote = Some(c),
            (Some(q), _) if q == c => quote = None,
            _ => {}
        }
        current.push(c);
    }
    statements.push(current);

    statements
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_statements_respects_quotes() {
        let parts = split_statements("INSERT INTO t VALUES ('a;b'); UPDATE t SET a = 1;");
        assert_eq!(parts, vec!["INSERT INTO t VALUES ('a;b')", "UPDATE t SET a = 1"]);
    }

    #[test]
    fn test_starts_with_keyword() {
        assert!(starts_with_keyword("  select * from t", "SELECT"));
        assert!(!starts_with_keyword("UPDATE t", "SELECT"));
        assert!(!starts_with_keyword("SEL", "SELECT"));
    }
}
