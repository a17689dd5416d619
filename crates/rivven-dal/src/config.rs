//! Database target configuration
//!
//! A [`TargetConfig`] describes one database: where it lives, how to log in
//! and how many connections the pool may hold. It deserializes from the
//! snake_case field names as well as the camelCase names used by older
//! descriptors (`connectionLimit`).
//!
//! # Example
//!
//! ```
//! use rivven_dal::config::TargetConfig;
//!
//! let target: TargetConfig = serde_json::from_str(
//!     r#"{"host": "db.local", "user": "app", "password": "s3cret",
//!         "database": "crm", "connectionLimit": 4}"#,
//! ).unwrap();
//!
//! assert_eq!(target.connection_limit, 4);
//! assert_eq!(target.port(), 3306);
//! assert!(!format!("{target:?}").contains("s3cret"));
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::error::{Error, Result};

/// Default MySQL port
pub const DEFAULT_PORT: u16 = 3306;

/// Wrapper for sensitive configuration values
///
/// Prevents accidental logging of secrets while allowing access when needed.
#[derive(Clone)]
pub struct SensitiveString(SecretString);

impl SensitiveString {
    /// Create a new sensitive string
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::new(value.into().into_boxed_str()))
    }

    /// Expose the secret value
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Default for SensitiveString {
    fn default() -> Self {
        Self::new("")
    }
}

impl std::fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl From<String> for SensitiveString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SensitiveString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Serialize as redacted to prevent accidental exposure in config dumps
impl Serialize for SensitiveString {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str("***REDACTED***")
    }
}

impl<'de> Deserialize<'de> for SensitiveString {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

/// Database target descriptor
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TargetConfig {
    /// Server host name or address
    #[validate(length(min = 1, max = 255))]
    pub host: String,

    /// Server port (default: 3306)
    #[serde(default)]
    pub port: Option<u16>,

    /// Login user
    #[validate(length(min = 1))]
    pub user: String,

    /// Login password
    #[serde(default)]
    pub password: SensitiveString,

    /// Database (schema) name
    #[validate(length(min = 1, max = 64))]
    pub database: String,

    /// Maximum concurrent pooled connections (default: 10)
    #[serde(default = "default_connection_limit", alias = "connectionLimit")]
    #[validate(range(min = 1, max = 1000))]
    pub connection_limit: u32,

    /// Maximum time to wait for a pooled connection in milliseconds (default: 10000)
    #[serde(default = "default_acquire_timeout_ms", alias = "acquireTimeout")]
    #[validate(range(min = 1))]
    pub acquire_timeout_ms: u64,

    /// Maximum time to establish a physical connection in milliseconds (default: 10000)
    #[serde(default = "default_connect_timeout_ms", alias = "connectTimeout")]
    #[validate(range(min = 1))]
    pub connect_timeout_ms: u64,

    /// Ping idle connections before handing them out (default: true)
    #[serde(default = "default_true", alias = "testOnBorrow")]
    pub test_on_borrow: bool,
}

fn default_connection_limit() -> u32 {
    10
}

fn default_acquire_timeout_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: None,
            user: String::new(),
            password: SensitiveString::default(),
            database: String::new(),
            connection_limit: default_connection_limit(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            test_on_borrow: true,
        }
    }
}

impl TargetConfig {
    /// Create a target from its login coordinates
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<SensitiveString>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
            database: database.into(),
            ..Default::default()
        }
    }

    /// Parse a JSON descriptor and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let target: Self = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("invalid target descriptor: {e}")))?;
        target.check()?;
        Ok(target)
    }

    /// Set the server port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the maximum number of pooled connections
    pub fn with_connection_limit(mut self, limit: u32) -> Self {
        self.connection_limit = limit;
        self
    }

    /// Set the pool acquire timeout
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = timeout.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    /// Enable/disable validation of idle connections on borrow
    pub fn with_test_on_borrow(mut self, test: bool) -> Self {
        self.test_on_borrow = test;
        self
    }

    /// Effective server port
    #[inline]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Pool acquire timeout
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Physical connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Validate field constraints, mapping failures to [`Error::Configuration`]
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::config(format!("invalid target {}: {e}", self.database)))
    }

    /// `host:port/database` for log lines
    pub fn display_target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port(), self.database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let target: TargetConfig = serde_json::from_str(
            r#"{"host": "h", "user": "u", "database": "d"}"#,
        )
        .unwrap();

        assert_eq!(target.connection_limit, 10);
        assert_eq!(target.acquire_timeout(), Duration::from_secs(10));
        assert_eq!(target.password.expose_secret(), "");
        assert!(target.test_on_borrow);
        assert!(target.check().is_ok());
    }

    #[test]
    fn test_password_redacted() {
        let target = TargetConfig::new("h", "u", "hunter2", "d");
        assert!(!format!("{target:?}").contains("hunter2"));

        let json = serde_json::to_string(&target).unwrap();
        assert!(json.contains("***REDACTED***"));
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn test_zero_connection_limit_rejected() {
        let target = TargetConfig::new("h", "u", "p", "d").with_connection_limit(0);
        let err = target.check().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_display_target() {
        let target = TargetConfig::new("db", "u", "p", "crm").with_port(3307);
        assert_eq!(target.display_target(), "db:3307/crm");
    }
}
