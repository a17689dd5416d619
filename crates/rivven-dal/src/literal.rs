//! Value serialization for rivven-dal
//!
//! Two views over the same formatting rules:
//!
//! - [`to_sql_literal`] renders a [`Value`] as inline SQL literal text
//! - [`to_param`] maps a [`Value`] to the value bound for a `?` placeholder
//!
//! | input                         | literal                 | bound parameter        |
//! |-------------------------------|-------------------------|------------------------|
//! | `Null`                        | `NULL`                  | `Null`                 |
//! | `Missing`                     | `''`                    | `Text("")`             |
//! | integer / float / decimal     | `42`, `1.5`             | unchanged              |
//! | `Bool`                        | `1` / `0`               | `Int(1)` / `Int(0)`    |
//! | date / datetime / timestamptz | `'YYYY-MM-DD HH:MM:SS'` | `Text(..)` same format |
//! | text                          | `'it''s'`               | unchanged              |
//!
//! Lists and JSON containers have no scalar form and fail with
//! [`Error::InvalidValueType`].

use chrono::{NaiveDateTime, NaiveTime};

use crate::error::{Error, Result};
use crate::security::escape_string_literal;
use crate::types::Value;

/// Format used for every temporal literal
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const TIME_FORMAT: &str = "%H:%M:%S";

/// Render a value as SQL literal text.
///
/// ```
/// use rivven_dal::literal::to_sql_literal;
/// use rivven_dal::Value;
///
/// assert_eq!(to_sql_literal(&Value::Null).unwrap(), "NULL");
/// assert_eq!(to_sql_literal(&Value::Missing).unwrap(), "''");
/// assert_eq!(to_sql_literal(&Value::from(42)).unwrap(), "42");
/// assert_eq!(to_sql_literal(&Value::from("it's")).unwrap(), "'it''s'");
/// ```
pub fn to_sql_literal(value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok("NULL".to_string()),
        Value::Missing => Ok("''".to_string()),
        Value::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        Value::Int(n) => Ok(n.to_string()),
        Value::UInt(n) => Ok(n.to_string()),
        Value::Float(n) => format_float(*n),
        Value::Decimal(d) => Ok(d.to_string()),
        Value::Text(s) => Ok(quote(s)),
        Value::Bytes(b) => match std::str::from_utf8(b) {
            Ok(s) => Ok(quote(s)),
            Err(_) => Err(Error::invalid_value(value.type_name())),
        },
        Value::Date(d) => Ok(quote(&format_datetime(&d.and_time(NaiveTime::MIN)))),
        Value::Time(t) => Ok(quote(&t.format(TIME_FORMAT).to_string())),
        Value::DateTime(dt) => Ok(quote(&format_datetime(dt))),
        Value::DateTimeTz(dt) => Ok(quote(&format_datetime(&dt.naive_utc()))),
        Value::Json(json) => match json {
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                Err(Error::invalid_value(value.type_name()))
            }
            scalar => to_sql_literal(&Value::from(scalar.clone())),
        },
        Value::List(_) => Err(Error::invalid_value(value.type_name())),
    }
}

/// Map a value to the parameter bound for a placeholder.
///
/// Applies the same rules as [`to_sql_literal`] without quoting: the
/// missing marker becomes an empty string and temporal values become
/// their `YYYY-MM-DD HH:MM:SS` text.
pub fn to_param(value: &Value) -> Result<Value> {
    match value {
        Value::Missing => Ok(Value::Text(String::new())),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(n) if !n.is_finite() => Err(Error::invalid_value(value.type_name())),
        Value::Date(d) => Ok(Value::Text(format_datetime(&d.and_time(NaiveTime::MIN)))),
        Value::Time(t) => Ok(Value::Text(t.format(TIME_FORMAT).to_string())),
        Value::DateTime(dt) => Ok(Value::Text(format_datetime(dt))),
        Value::DateTimeTz(dt) => Ok(Value::Text(format_datetime(&dt.naive_utc()))),
        Value::Json(json) => match json {
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                Err(Error::invalid_value(value.type_name()))
            }
            scalar => to_param(&Value::from(scalar.clone())),
        },
        Value::List(_) => Err(Error::invalid_value(value.type_name())),
        Value::Null
        | Value::Int(_)
        | Value::UInt(_)
        | Value::Float(_)
        | Value::Decimal(_)
        | Value::Text(_)
        | Value::Bytes(_) => Ok(value.clone()),
    }
}

/// Format a timestamp the way every temporal literal is written
pub fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

fn quote(text: &str) -> String {
    format!("'{}'", escape_string_literal(text))
}

// `Display` for f64 never switches to exponent notation; NaN and the
// infinities have no SQL literal.
fn format_float(n: f64) -> Result<String> {
    if n.is_finite() {
        Ok(n.to_string())
    } else {
        Err(Error::invalid_value("DOUBLE"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn test_null_and_missing() {
        assert_eq!(to_sql_literal(&Value::Null).unwrap(), "NULL");
        assert_eq!(to_sql_literal(&Value::Missing).unwrap(), "''");
        assert_eq!(to_param(&Value::Missing).unwrap(), Value::Text(String::new()));
        assert_eq!(to_param(&Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_numbers_are_unquoted() {
        assert_eq!(to_sql_literal(&Value::Int(-7)).unwrap(), "-7");
        assert_eq!(to_sql_literal(&Value::UInt(u64::MAX)).unwrap(), "18446744073709551615");
        assert_eq!(to_sql_literal(&Value::Float(1.5)).unwrap(), "1.5");
        assert_eq!(to_sql_literal(&Value::Float(1e21)).unwrap(), "1000000000000000000000");
        assert_eq!(to_sql_literal(&Value::Float(1e-7)).unwrap(), "0.0000001");
    }

    #[test]
    fn test_non_finite_float_rejected() {
        assert!(to_sql_literal(&Value::Float(f64::NAN)).is_err());
        assert!(to_param(&Value::Float(f64::INFINITY)).is_err());
    }

    #[test]
    fn test_temporal_formatting() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 3)
            .unwrap();
        assert_eq!(to_sql_literal(&Value::DateTime(dt)).unwrap(), "'2024-03-09 07:05:03'");

        let d = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert_eq!(to_sql_literal(&Value::Date(d)).unwrap(), "'2024-12-31 00:00:00'");

        let tz = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(to_param(&Value::DateTimeTz(tz)).unwrap(), Value::Text("2024-01-02 03:04:05".into()));
    }

    #[test]
    fn test_preformatted_temporal_text_is_quoted_text() {
        let v = Value::from("2024-03-09 07:05:03");
        assert_eq!(to_sql_literal(&v).unwrap(), "'2024-03-09 07:05:03'");
        assert_eq!(to_param(&v).unwrap(), v);
    }

    #[test]
    fn test_booleans_render_as_tinyint() {
        assert_eq!(to_sql_literal(&Value::Bool(true)).unwrap(), "1");
        assert_eq!(to_param(&Value::Bool(false)).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_composites_rejected() {
        let err = to_sql_literal(&Value::List(vec![Value::Int(1)])).unwrap_err();
        assert!(matches!(err, Error::InvalidValueType { type_name: "LIST", .. }));

        let obj = Value::Json(serde_json::json!({"a": 1}));
        assert!(to_sql_literal(&obj).is_err());
        assert!(to_param(&obj).is_err());

        assert!(to_sql_literal(&Value::Bytes(vec![0xff, 0xfe])).is_err());
    }

    #[test]
    fn test_json_scalars_follow_native_rules() {
        let v = Value::Json(serde_json::json!("o'clock"));
        assert_eq!(to_sql_literal(&v).unwrap(), "'o''clock'");
        let v = Value::Json(serde_json::json!(3));
        assert_eq!(to_sql_literal(&v).unwrap(), "3");
    }
}
