//! MySQL backend for rivven-dal
//!
//! Provides MySQL-specific implementations on top of `mysql_async`:
//! - Pooled connections, always over prepared statements so one call runs
//!   exactly one statement
//! - Transaction control through `BEGIN`/`COMMIT`/`ROLLBACK`
//! - Multi-statement batch connections
//!
//! Values read back are typed from the column metadata, so a `BIGINT` column
//! yields [`Value::Int`] whichever protocol carried it.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use mysql_async::consts::ColumnType;
use mysql_async::prelude::*;
use mysql_async::{Column, Conn, OptsBuilder, Params};
use rust_decimal::Decimal;
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::TargetConfig;
use crate::connection::{BatchConnection, Connection, ConnectionFactory};
use crate::error::{Error, Result};
use crate::types::{Row, RowSet, Value};

/// Convert a Value to a MySQL parameter.
///
/// Composites have no single-placeholder form and are rejected.
fn value_to_sql(value: &Value) -> Result<mysql_async::Value> {
    Ok(match value {
        Value::Null => mysql_async::Value::NULL,
        Value::Missing => mysql_async::Value::from(String::new()),
        Value::Bool(b) => mysql_async::Value::from(*b),
        Value::Int(n) => mysql_async::Value::from(*n),
        Value::UInt(n) => mysql_async::Value::from(*n),
        Value::Float(n) => mysql_async::Value::from(*n),
        // Sent as text so MySQL keeps the exact DECIMAL digits
        Value::Decimal(d) => mysql_async::Value::from(d.to_string()),
        Value::Text(s) => mysql_async::Value::from(s.clone()),
        Value::Bytes(b) => mysql_async::Value::from(b.clone()),
        Value::Date(d) => {
            mysql_async::Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0)
        }
        Value::Time(t) => mysql_async::Value::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1000,
        ),
        Value::DateTime(dt) => datetime_to_sql(dt),
        Value::DateTimeTz(dt) => datetime_to_sql(&dt.naive_utc()),
        Value::Json(serde_json::Value::Array(_) | serde_json::Value::Object(_))
        | Value::List(_) => return Err(Error::invalid_value(value.type_name())),
        Value::Json(scalar) => return value_to_sql(&Value::from(scalar.clone())),
    })
}

fn datetime_to_sql(dt: &NaiveDateTime) -> mysql_async::Value {
    let (date, time) = (dt.date(), dt.time());
    mysql_async::Value::Date(
        date.year() as u16,
        date.month() as u8,
        date.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
        time.nanosecond() / 1000,
    )
}

/// Convert a MySQL value to a Value, typed by its column
fn mysql_value_to_value(val: mysql_async::Value, column: &Column) -> Value {
    match val {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Bytes(b) => text_to_value(b, column),
        mysql_async::Value::Int(n) => Value::Int(n),
        mysql_async::Value::UInt(n) => i64::try_from(n).map_or(Value::UInt(n), Value::Int),
        mysql_async::Value::Float(f) => Value::Float(f64::from(f)),
        mysql_async::Value::Double(d) => Value::Float(d),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            let Some(date) = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32) else {
                return Value::Null;
            };
            if column.column_type() == ColumnType::MYSQL_TYPE_DATE {
                return Value::Date(date);
            }
            NaiveTime::from_hms_micro_opt(hour as u32, min as u32, sec as u32, micro)
                .map_or(Value::Null, |time| Value::DateTime(NaiveDateTime::new(date, time)))
        }
        mysql_async::Value::Time(neg, days, hour, min, sec, micro) => {
            if !neg && days == 0 {
                if let Some(time) =
                    NaiveTime::from_hms_micro_opt(hour as u32, min as u32, sec as u32, micro)
                {
                    return Value::Time(time);
                }
            }
            // Durations outside a wall-clock day stay textual
            let hours = days * 24 + hour as u32;
            let sign = if neg { "-" } else { "" };
            Value::Text(format!("{sign}{hours:02}:{min:02}:{sec:02}"))
        }
    }
}

/// Type text-protocol bytes by the column they came from
fn text_to_value(bytes: Vec<u8>, column: &Column) -> Value {
    let text = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => return Value::Bytes(e.into_bytes()),
    };

    match column.column_type() {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_YEAR => match text.parse::<i64>() {
            Ok(n) => Value::Int(n),
            Err(_) => parse_or_text(text, Value::UInt),
        },
        ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => {
            parse_or_text(text, Value::Float)
        }
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
            parse_or_text::<Decimal>(text, Value::Decimal)
        }
        ColumnType::MYSQL_TYPE_DATE => parse_or_text(text, Value::Date),
        ColumnType::MYSQL_TYPE_TIME => parse_or_text(text, Value::Time),
        ColumnType::MYSQL_TYPE_DATETIME | ColumnType::MYSQL_TYPE_TIMESTAMP => {
            match NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f") {
                Ok(dt) => Value::DateTime(dt),
                Err(_) => Value::Text(text),
            }
        }
        ColumnType::MYSQL_TYPE_JSON => match serde_json::from_str(&text) {
            Ok(json) => Value::Json(json),
            Err(_) => Value::Text(text),
        },
        _ => Value::Text(text),
    }
}

fn parse_or_text<T: FromStr>(text: String, wrap: impl FnOnce(T) -> Value) -> Value {
    match T::from_str(&text) {
        Ok(v) => wrap(v),
        Err(_) => Value::Text(text),
    }
}

fn convert_rows(rows: Vec<mysql_async::Row>) -> Vec<Row> {
    rows.into_iter()
        .map(|row| {
            let columns = row.columns();
            let names = columns.iter().map(|c| c.name_str().to_string()).collect();
            let values = row
                .unwrap_raw()
                .into_iter()
                .zip(columns.iter())
                .map(|(v, c)| v.map_or(Value::Null, |v| mysql_value_to_value(v, c)))
                .collect();
            Row::new(names, values)
        })
        .collect()
}

/// Server-side rejections are statement failures; everything else means the
/// connection itself is in trouble.
fn driver_error(e: mysql_async::Error, sql: &str) -> Error {
    if let mysql_async::Error::Server(server) = &e {
        let message = format!("{} ({})", server.message, server.code);
        return Error::StatementFailed {
            message,
            sql: Some(sql.to_string()),
            source: Some(Box::new(e)),
        };
    }
    Error::connection_with_source("MySQL connection failure", e)
}

async fn open(target: &TargetConfig) -> Result<Conn> {
    let opts = OptsBuilder::default()
        .ip_or_hostname(target.host.clone())
        .tcp_port(target.port())
        .user(Some(target.user.clone()))
        .pass(Some(target.password.expose_secret().to_string()))
        .db_name(Some(target.database.clone()));

    let conn = tokio::time::timeout(target.connect_timeout(), Conn::new(opts))
        .await
        .map_err(|_| {
            Error::connection(format!(
                "timed out connecting to {} after {}ms",
                target.display_target(),
                target.connect_timeout_ms
            ))
        })?
        .map_err(|e| {
            Error::connection_with_source(
                format!("failed to connect to {}", target.display_target()),
                e,
            )
        })?;

    debug!(target_db = %target.display_target(), "Connected to MySQL");
    Ok(conn)
}

/// MySQL pooled connection
pub struct MySqlConnection {
    conn: Mutex<Option<Conn>>,
}

impl MySqlConnection {
    /// Wrap an established connection
    pub fn new(conn: Conn) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
        }
    }

    /// Open a connection to `target`
    pub async fn connect(target: &TargetConfig) -> Result<Self> {
        Ok(Self::new(open(target).await?))
    }

    async fn control(&self, sql: &'static str) -> Result<()> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| Error::connection("connection is closed"))?;
        conn.query_drop(sql)
            .await
            .map_err(|e| Error::transaction(format!("{sql} failed: {e}")))
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<RowSet> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| Error::connection("connection is closed"))?;

        // Always prepared: the server refuses stacked statements here, those
        // belong on a batch connection.
        let params = if params.is_empty() {
            Params::Empty
        } else {
            Params::Positional(params.iter().map(value_to_sql).collect::<Result<_>>()?)
        };
        let mut result = conn
            .exec_iter(sql, params)
            .await
            .map_err(|e| driver_error(e, sql))?;
        let rows: Vec<mysql_async::Row> =
            result.collect().await.map_err(|e| driver_error(e, sql))?;
        let (affected, last_insert_id) = (result.affected_rows(), result.last_insert_id());
        result.drop_result().await.map_err(|e| driver_error(e, sql))?;

        Ok(RowSet::new(convert_rows(rows)).with_counts(affected, last_insert_id))
    }

    async fn begin(&self) -> Result<()> {
        self.control("BEGIN").await
    }

    async fn commit(&self) -> Result<()> {
        self.control("COMMIT").await
    }

    async fn rollback(&self) -> Result<()> {
        self.control("ROLLBACK").await
    }

    async fn is_valid(&self) -> bool {
        match self.conn.lock().await.as_mut() {
            Some(conn) => conn.ping().await.is_ok(),
            None => false,
        }
    }

    async fn close(&self) -> Result<()> {
        if let Some(conn) = self.conn.lock().await.take() {
            conn.disconnect()
                .await
                .map_err(|e| Error::connection_with_source("failed to close connection", e))?;
        }
        Ok(())
    }
}

/// MySQL connection for multi-statement text
pub struct MySqlBatchConnection {
    conn: Mutex<Option<Conn>>,
}

#[async_trait]
impl BatchConnection for MySqlBatchConnection {
    async fn execute_multi(&self, sql: &str) -> Result<RowSet> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| Error::connection("connection is closed"))?;

        let mut result = conn.query_iter(sql).await.map_err(|e| driver_error(e, sql))?;
        let mut sets = Vec::new();
        loop {
            let rows: Vec<mysql_async::Row> =
                result.collect().await.map_err(|e| driver_error(e, sql))?;
            sets.push(
                RowSet::new(convert_rows(rows))
                    .with_counts(result.affected_rows(), result.last_insert_id()),
            );
            if result.is_empty() {
                break;
            }
        }
        Ok(RowSet::batch(sets))
    }

    async fn close(&self) -> Result<()> {
        if let Some(conn) = self.conn.lock().await.take() {
            conn.disconnect()
                .await
                .map_err(|e| Error::connection_with_source("failed to close batch connection", e))?;
        }
        Ok(())
    }
}

/// MySQL connection factory
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnectionFactory;

#[async_trait]
impl ConnectionFactory for MySqlConnectionFactory {
    async fn connect(&self, target: &TargetConfig) -> Result<Box<dyn Connection>> {
        Ok(Box::new(MySqlConnection::connect(target).await?))
    }

    async fn connect_batch(&self, target: &TargetConfig) -> Result<Box<dyn BatchConnection>> {
        // mysql_async negotiates CLIENT_MULTI_STATEMENTS on every connection;
        // only this text-protocol path makes use of it.
        Ok(Box::new(MySqlBatchConnection {
            conn: Mutex::new(Some(open(target).await?)),
        }))
    }

    fn backend(&self) -> &'static str {
        "mysql"
    }
}
