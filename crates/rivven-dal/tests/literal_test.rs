//! Tests for rivven-dal value serialization

use chrono::{NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use rivven_dal::literal::{format_datetime, to_param, to_sql_literal};
use rivven_dal::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Read back a single-quoted MySQL string literal
fn unquote(literal: &str) -> Option<String> {
    let body = literal.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                // A lone quote would have ended the literal
                if chars.next()? != '\'' {
                    return None;
                }
                out.push('\'');
            }
            '\\' => out.push(chars.next()?),
            other => out.push(other),
        }
    }
    Some(out)
}

// ==================== Literal Tests ====================

#[test]
fn test_text_escaping() {
    assert_eq!(to_sql_literal(&Value::from("plain")).unwrap(), "'plain'");
    assert_eq!(to_sql_literal(&Value::from("O'Brien")).unwrap(), "'O''Brien'");
    assert_eq!(to_sql_literal(&Value::from(r"a\b")).unwrap(), r"'a\\b'");
    assert_eq!(to_sql_literal(&Value::from("")).unwrap(), "''");
}

#[test]
fn test_injection_stays_inside_literal() {
    let literal = to_sql_literal(&Value::from("x'; DROP TABLE users; --")).unwrap();
    assert_eq!(literal, "'x''; DROP TABLE users; --'");
    assert_eq!(unquote(&literal).as_deref(), Some("x'; DROP TABLE users; --"));
}

#[test]
fn test_missing_is_empty_string_not_null() {
    assert_eq!(to_sql_literal(&Value::Missing).unwrap(), "''");
    assert_eq!(to_sql_literal(&Value::Null).unwrap(), "NULL");
}

#[test]
fn test_booleans() {
    assert_eq!(to_sql_literal(&Value::Bool(true)).unwrap(), "1");
    assert_eq!(to_sql_literal(&Value::Bool(false)).unwrap(), "0");
    assert_eq!(to_param(&Value::Bool(true)).unwrap(), Value::Int(1));
}

#[test]
fn test_decimal_keeps_digits() {
    let d = Decimal::from_str("12345.6700").unwrap();
    assert_eq!(to_sql_literal(&Value::Decimal(d)).unwrap(), "12345.6700");
}

#[test]
fn test_temporal_literals() {
    let date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
    assert_eq!(
        to_sql_literal(&Value::Date(date)).unwrap(),
        "'2024-01-31 00:00:00'"
    );

    let dt = date.and_hms_opt(23, 59, 1).unwrap();
    assert_eq!(format_datetime(&dt), "2024-01-31 23:59:01");
    assert_eq!(
        to_param(&Value::DateTime(dt)).unwrap(),
        Value::Text("2024-01-31 23:59:01".into())
    );

    let utc = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
    assert_eq!(
        to_sql_literal(&Value::DateTimeTz(utc)).unwrap(),
        "'2024-06-01 08:00:00'"
    );
}

#[test]
fn test_non_scalars_rejected() {
    let list = Value::from(vec![1_i64, 2]);
    assert!(matches!(
        to_sql_literal(&list),
        Err(Error::InvalidValueType { type_name: "LIST", .. })
    ));
    assert!(to_param(&list).is_err());

    let object = Value::Json(serde_json::json!({ "a": 1 }));
    assert!(to_sql_literal(&object).is_err());

    let scalar = Value::Json(serde_json::json!("it's"));
    assert_eq!(to_sql_literal(&scalar).unwrap(), "'it''s'");
}

#[test]
fn test_non_finite_floats_rejected() {
    assert!(to_sql_literal(&Value::Float(f64::NAN)).is_err());
    assert!(to_param(&Value::Float(f64::INFINITY)).is_err());
}

// ==================== Properties ====================

proptest! {
    #[test]
    fn prop_text_literal_reads_back(s in "\\PC*") {
        let literal = to_sql_literal(&Value::Text(s.clone())).unwrap();
        prop_assert_eq!(unquote(&literal), Some(s));
    }

    #[test]
    fn prop_integer_literal_reads_back(n in any::<i64>()) {
        let literal = to_sql_literal(&Value::Int(n)).unwrap();
        prop_assert_eq!(literal.parse::<i64>().unwrap(), n);
    }

    #[test]
    fn prop_finite_float_has_no_exponent(f in proptest::num::f64::NORMAL) {
        let literal = to_sql_literal(&Value::Float(f)).unwrap();
        prop_assert!(!literal.contains('e'));
        prop_assert_eq!(literal.parse::<f64>().unwrap(), f);
    }
}
