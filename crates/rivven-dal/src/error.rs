//! Error types for rivven-dal
//!
//! Errors are classified so an outer orchestrator can decide about retries:
//! - Retriable errors (connection loss, pool exhaustion)
//! - Non-retriable errors (empty statements, bad values, duplicate staging keys)
//!
//! This crate never retries on its own.

use std::fmt;
use thiserror::Error;

/// Result type for rivven-dal operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Statement could not be built from the supplied columns/values
    Statement,
    /// A value could not be rendered as SQL
    Value,
    /// Staging classification failure
    Staging,
    /// Connection-related errors (retriable)
    Connection,
    /// Pool exhausted or closed (retriable with backoff)
    PoolExhausted,
    /// The database rejected a statement
    Execution,
    /// Begin/commit/rollback failure
    Transaction,
    /// Configuration error
    Configuration,
}

impl ErrorCategory {
    /// Whether errors in this category are generally retriable
    #[inline]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Connection | Self::PoolExhausted)
    }
}

/// Main error type for rivven-dal
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    /// INSERT requested without any column/value
    #[error("empty insert set for table {table}")]
    EmptyInsertSet { table: String },

    /// UPDATE requested without predicates or assignments
    #[error("empty update set for table {table}")]
    EmptyUpdateSet { table: String },

    /// A multi-row insert row does not match the column list of the first row
    #[error("row {row} of insert into {table} has {found} values, expected {expected}")]
    ColumnCountMismatch {
        table: String,
        row: usize,
        expected: usize,
        found: usize,
    },

    /// Value has no SQL scalar representation
    #[error("invalid value type {type_name}{}", column_suffix(.column))]
    InvalidValueType {
        type_name: &'static str,
        column: Option<String>,
    },

    /// Table or column name rejected by identifier validation
    #[error("invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: String },

    /// Staging submission collided on the unique key
    #[error("duplicate \"{key}\" in staging area: {value}")]
    DuplicateKey { key: String, value: String },

    /// Baseline replaced while a classification pass is in progress
    #[error("staging baseline cannot be replaced after {accepted} submissions; reset first")]
    StagingSealed { accepted: usize },

    /// Connection failed
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection pool exhausted or closed
    #[error("pool exhausted: {message}")]
    PoolExhausted { message: String },

    /// Statement execution failed
    #[error("statement failed: {message}")]
    StatementFailed {
        message: String,
        sql: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Transaction control failed
    #[error("transaction error: {message}")]
    Transaction { message: String },

    /// Configuration error
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::EmptyInsertSet { .. }
            | Self::EmptyUpdateSet { .. }
            | Self::ColumnCountMismatch { .. }
            | Self::InvalidIdentifier { .. } => ErrorCategory::Statement,
            Self::InvalidValueType { .. } => ErrorCategory::Value,
            Self::DuplicateKey { .. } | Self::StagingSealed { .. } => ErrorCategory::Staging,
            Self::Connection { .. } => ErrorCategory::Connection,
            Self::PoolExhausted { .. } => ErrorCategory::PoolExhausted,
            Self::StatementFailed { .. } => ErrorCategory::Execution,
            Self::Transaction { .. } => ErrorCategory::Transaction,
            Self::Configuration { .. } => ErrorCategory::Configuration,
        }
    }

    /// Whether this error is retriable
    #[inline]
    pub fn is_retriable(&self) -> bool {
        self.category().is_retriable()
    }

    /// The SQL text attached to a statement failure, if any
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::StatementFailed { sql, .. } => sql.as_deref(),
            _ => None,
        }
    }

    /// Create an empty insert error
    pub fn empty_insert(table: impl Into<String>) -> Self {
        Self::EmptyInsertSet {
            table: table.into(),
        }
    }

    /// Create an empty update error
    pub fn empty_update(table: impl Into<String>) -> Self {
        Self::EmptyUpdateSet {
            table: table.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(type_name: &'static str) -> Self {
        Self::InvalidValueType {
            type_name,
            column: None,
        }
    }

    /// Attach the offending column to an invalid value error
    pub fn for_column(self, column: &str) -> Self {
        match self {
            Self::InvalidValueType {
                type_name,
                column: None,
            } => Self::InvalidValueType {
                type_name,
                column: Some(column.to_string()),
            },
            other => other,
        }
    }

    /// Create an identifier error
    pub fn identifier(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a pool exhausted error
    pub fn pool_exhausted(message: impl Into<String>) -> Self {
        Self::PoolExhausted {
            message: message.into(),
        }
    }

    /// Create a statement failure
    pub fn statement(message: impl Into<String>) -> Self {
        Self::StatementFailed {
            message: message.into(),
            sql: None,
            source: None,
        }
    }

    /// Create a statement failure carrying the SQL text
    pub fn statement_with_sql(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::StatementFailed {
            message: message.into(),
            sql: Some(sql.into()),
            source: None,
        }
    }

    /// Create a transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

fn column_suffix(column: &Option<String>) -> String {
    column
        .as_deref()
        .map(|c| format!(" for column {c}"))
        .unwrap_or_default()
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Statement => write!(f, "statement"),
            Self::Value => write!(f, "value"),
            Self::Staging => write!(f, "staging"),
            Self::Connection => write!(f, "connection"),
            Self::PoolExhausted => write!(f, "pool_exhausted"),
            Self::Execution => write!(f, "execution"),
            Self::Transaction => write!(f, "transaction"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retriable() {
        assert!(ErrorCategory::Connection.is_retriable());
        assert!(ErrorCategory::PoolExhausted.is_retriable());

        assert!(!ErrorCategory::Statement.is_retriable());
        assert!(!ErrorCategory::Staging.is_retriable());
        assert!(!ErrorCategory::Execution.is_retriable());
    }

    #[test]
    fn test_invalid_value_column_context() {
        let err = Error::invalid_value("LIST").for_column("tags");
        assert_eq!(err.to_string(), "invalid value type LIST for column tags");

        let err = Error::invalid_value("JSON");
        assert_eq!(err.to_string(), "invalid value type JSON");
    }

    #[test]
    fn test_statement_error_carries_sql() {
        let err = Error::statement_with_sql("syntax error", "SELEC 1");
        assert_eq!(err.sql(), Some("SELEC 1"));
        assert_eq!(err.category(), ErrorCategory::Execution);
        assert!(Error::statement("boom").sql().is_none());
    }
}
