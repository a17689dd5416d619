//! # rivven-dal
//!
//! Relational data access layer for the Rivven platform.
//!
//! This crate is the thin layer between application code and a MySQL-family
//! database: it turns records into SQL, owns the connection pool and makes
//! sure every checked-out connection and every transaction is finished.
//!
//! ## Features
//!
//! - **Value Serialization**: Typed values rendered as escaped SQL literals or bound parameters
//! - **Statement Building**: INSERT, multi-row INSERT, UPDATE and SELECT from ordered records
//! - **Scoped Resources**: Pooled connections and transactions released on every exit path
//! - **Batch Execution**: Multi-statement text on a dedicated, non-pooled connection
//! - **Staging**: Classify candidate records into inserts and updates against a baseline
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rivven_dal::prelude::*;
//! use std::sync::Arc;
//!
//! let target = TargetConfig::new("localhost", "app", "secret", "inventory");
//! let manager = ConnectionManager::new(target, Arc::new(MySqlConnectionFactory))?;
//!
//! // Baseline from the database, candidates from the caller
//! let mut staging = StagingArea::new();
//! staging.load_baseline(manager.select("items", &Record::new(), false).await?)?;
//! for record in incoming {
//!     staging.submit(record, "sku", "id")?;
//! }
//!
//! // All inserts and updates in one transaction
//! let report = staging.drain().apply(&manager, "items", "id", true).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `mysql` - MySQL/MariaDB support via mysql_async (default)
//! - `full` - All features enabled

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod builder;
pub mod config;
pub mod connection;
pub mod error;
pub mod literal;
pub mod manager;
pub mod pool;
pub mod security;
pub mod staging;
pub mod testing;
pub mod types;

#[cfg(feature = "mysql")]
pub mod mysql;

/// Prelude module for convenient imports
pub mod prelude {
    // Error types
    pub use crate::error::{Error, ErrorCategory, Result};

    // Value and type system
    pub use crate::record;
    pub use crate::types::{record_from_json, Record, Row, RowSet, Value};

    // Serialization and statements
    pub use crate::builder::{
        build_insert, build_multi_insert, build_select, build_update, Statement,
    };
    pub use crate::literal::{to_param, to_sql_literal};

    // Connections, pool and manager
    pub use crate::config::{SensitiveString, TargetConfig};
    pub use crate::connection::{BatchConnection, Connection, ConnectionFactory};
    pub use crate::manager::{ConnectionManager, ScopedTransaction, SQL_LOG_TARGET};
    pub use crate::pool::{Pool, PoolStats, ScopedConnection};

    // Staging
    pub use crate::staging::{Classification, StagedChanges, StagingArea, StagingReport};

    #[cfg(feature = "mysql")]
    pub use crate::mysql::MySqlConnectionFactory;
}

// Re-export commonly used items at crate root
pub use error::{Error, Result};
pub use types::{Record, Value};
