//! Value types for rivven-dal
//!
//! - [`Value`]: tagged scalar covering everything a caller can write or a
//!   driver can return, including the `Missing` marker for absent fields
//! - [`Record`]: insertion-ordered column → value mapping
//! - [`Row`] / [`RowSet`]: read-only results of a statement execution

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Insertion-ordered column → value mapping.
///
/// Used for candidate records, predicate maps, assignment maps and rows
/// loaded into the staging baseline. Key order is significant: statement
/// builders emit columns in exactly this order.
pub type Record = IndexMap<String, Value>;

/// Build a [`Record`] from `column => value` pairs, keeping their order.
///
/// ```
/// use rivven_dal::{record, Value};
///
/// let r = record! { "id" => 1_i64, "name" => "alice", "deleted_at" => Value::Null };
/// assert_eq!(r.keys().collect::<Vec<_>>(), ["id", "name", "deleted_at"]);
/// ```
#[macro_export]
macro_rules! record {
    () => { $crate::types::Record::new() };
    ($($column:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::types::Record::new();
        $( record.insert(::std::string::String::from($column), $crate::types::Value::from($value)); )+
        record
    }};
}

/// SQL value type that can hold any scalar a statement can carry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Field absent from the caller's record (rendered as an empty string)
    Missing,
    /// Boolean value
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Unsigned integer
    UInt(u64),
    /// Floating point
    Float(f64),
    /// Arbitrary precision decimal (DECIMAL, NUMERIC)
    Decimal(Decimal),
    /// Text string (VARCHAR, TEXT, CHAR) or pre-formatted temporal text
    Text(String),
    /// Binary data (BLOB, VARBINARY)
    Bytes(Vec<u8>),
    /// Date without time (DATE)
    Date(NaiveDate),
    /// Time without date (TIME)
    Time(NaiveTime),
    /// Timestamp without timezone (DATETIME)
    DateTime(NaiveDateTime),
    /// Timestamp with timezone, normalized to UTC when rendered
    DateTimeTz(DateTime<Utc>),
    /// JSON document
    Json(serde_json::Value),
    /// List of values, only meaningful as an `IN (...)` predicate
    List(Vec<Value>),
}

impl Value {
    /// Check if value is NULL
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if value is the missing-field marker
    #[inline]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Whether the value is a plain scalar (not a list or a JSON container)
    pub fn is_scalar(&self) -> bool {
        match self {
            Self::List(_) => false,
            Self::Json(j) => !(j.is_array() || j.is_object()),
            _ => true,
        }
    }

    /// Get SQL type name, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Missing => "MISSING",
            Self::Bool(_) => "BOOLEAN",
            Self::Int(_) => "BIGINT",
            Self::UInt(_) => "BIGINT UNSIGNED",
            Self::Float(_) => "DOUBLE",
            Self::Decimal(_) => "DECIMAL",
            Self::Text(_) => "VARCHAR",
            Self::Bytes(_) => "BLOB",
            Self::Date(_) => "DATE",
            Self::Time(_) => "TIME",
            Self::DateTime(_) => "DATETIME",
            Self::DateTimeTz(_) => "TIMESTAMP",
            Self::Json(_) => "JSON",
            Self::List(_) => "LIST",
        }
    }

    /// Try to convert to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::UInt(n) => i64::try_from(*n).ok(),
            Self::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to convert to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::UInt(n) => Some(*n as f64),
            Self::Float(n) => Some(*n),
            Self::Decimal(d) => d.to_string().parse().ok(),
            Self::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Borrow the text content
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Missing => write!(f, "<missing>"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::UInt(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Date(d) => write!(f, "{d}"),
            Self::Time(t) => write!(f, "{t}"),
            Self::DateTime(dt) => write!(f, "{dt}"),
            Self::DateTimeTz(dt) => write!(f, "{dt}"),
            Self::Json(j) => write!(f, "{j}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::UInt(u64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Self::Time(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTimeTz(v)
    }
}

/// JSON scalars map onto native variants; objects stay JSON.
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInt(u)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Value::from).collect())
            }
            obj @ serde_json::Value::Object(_) => Self::Json(obj),
        }
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Self::Null,
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

/// Build a record from a JSON object, in the map's iteration order.
///
/// Returns `None` when `json` is not an object.
pub fn record_from_json(json: serde_json::Value) -> Option<Record> {
    match json {
        serde_json::Value::Object(map) => {
            Some(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
        }
        _ => None,
    }
}

/// Database row as ordered column values
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Column names
    columns: Vec<String>,
    /// Column values (same order as columns)
    values: Vec<Value>,
}

impl Row {
    /// Create a new row
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Get column count
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if row is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Get column names
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get all values
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get value by column index
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Get value by column name (case-insensitive)
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|idx| self.values.get(idx))
    }

    /// Convert row to an ordered record
    pub fn into_record(self) -> Record {
        self.columns.into_iter().zip(self.values).collect()
    }
}

impl From<Row> for Record {
    fn from(row: Row) -> Self {
        row.into_record()
    }
}

impl From<Record> for Row {
    fn from(record: Record) -> Self {
        let (columns, values) = record.into_iter().unzip();
        Self { columns, values }
    }
}

/// Result of executing one statement (or one multi-statement batch)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    rows: Vec<Row>,
    affected_rows: u64,
    last_insert_id: Option<u64>,
    results: Vec<RowSet>,
}

impl RowSet {
    /// Create a row set from returned rows
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    /// Create the outcome of a data-modifying statement
    pub fn affected(affected_rows: u64, last_insert_id: Option<u64>) -> Self {
        Self {
            rows: Vec::new(),
            affected_rows,
            last_insert_id,
            results: Vec::new(),
        }
    }

    /// Attach the modification counters to a row set
    pub fn with_counts(mut self, affected_rows: u64, last_insert_id: Option<u64>) -> Self {
        self.affected_rows = affected_rows;
        self.last_insert_id = last_insert_id;
        self
    }

    /// Combine per-statement results of a multi-statement batch.
    ///
    /// Rows are concatenated in statement order, affected counts are summed
    /// and the last reported insert id wins.
    pub fn batch(results: Vec<RowSet>) -> Self {
        let rows = results.iter().flat_map(|r| r.rows.iter().cloned()).collect();
        let affected_rows = results.iter().map(|r| r.affected_rows).sum();
        let last_insert_id = results.iter().rev().find_map(|r| r.last_insert_id);
        Self {
            rows,
            affected_rows,
            last_insert_id,
            results,
        }
    }

    /// Returned rows
    #[inline]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of returned rows
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows were returned
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows changed by an INSERT/UPDATE/DELETE
    #[inline]
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// Auto-increment id generated by an INSERT
    #[inline]
    pub fn last_insert_id(&self) -> Option<u64> {
        self.last_insert_id
    }

    /// Per-statement results of a batch (empty for single statements)
    #[inline]
    pub fn results(&self) -> &[RowSet] {
        &self.results
    }

    /// Convert rows to ordered records
    pub fn into_records(self) -> Vec<Record> {
        self.rows.into_iter().map(Row::into_record).collect()
    }
}

impl IntoIterator for RowSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_null_and_missing() {
        assert!(Value::Null.is_null());
        assert!(!Value::Missing.is_null());
        assert!(Value::Missing.is_missing());
        assert!(!Value::Int(0).is_null());
    }

    #[test]
    fn test_value_from_impl() {
        let v: Value = 42_i32.into();
        assert_eq!(v, Value::Int(42));

        let v: Value = "hello".into();
        assert!(matches!(v, Value::Text(s) if s == "hello"));

        let v: Value = None::<i64>.into();
        assert!(v.is_null());

        let v: Value = vec![1_i64, 2].into();
        assert_eq!(v, Value::List(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn test_value_from_json() {
        let v = Value::from(serde_json::json!(7));
        assert_eq!(v, Value::Int(7));
        let v = Value::from(serde_json::json!(1.5));
        assert_eq!(v, Value::Float(1.5));
        let v = Value::from(serde_json::json!({"a": 1}));
        assert!(!v.is_scalar());
        let v = Value::from(serde_json::json!(["x"]));
        assert_eq!(v, Value::List(vec![Value::Text("x".into())]));
    }

    #[test]
    fn test_record_macro_keeps_order() {
        let r = record! { "z" => 1_i64, "a" => "x", "m" => Value::Null };
        let keys: Vec<&str> = r.keys().map(String::as_str).collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn test_record_from_json_object() {
        let r = record_from_json(serde_json::json!({"id": 1, "key": "a"})).unwrap();
        assert_eq!(r.get("id"), Some(&Value::Int(1)));
        assert!(record_from_json(serde_json::json!([1, 2])).is_none());
    }

    #[test]
    fn test_row_operations() {
        let row = Row::new(
            vec!["id".into(), "name".into()],
            vec![Value::Int(1), Value::Text("Alice".into())],
        );

        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0), Some(&Value::Int(1)));
        assert_eq!(row.get_by_name("NAME"), Some(&Value::Text("Alice".into())));

        let record = row.into_record();
        assert_eq!(record.get_index(0).map(|(k, _)| k.as_str()), Some("id"));
    }

    #[test]
    fn test_row_set_batch_aggregates() {
        let first = RowSet::affected(2, Some(10));
        let second = RowSet::affected(3, None);
        let batch = RowSet::batch(vec![first, second]);

        assert_eq!(batch.affected_rows(), 5);
        assert_eq!(batch.last_insert_id(), Some(10));
        assert_eq!(batch.results().len(), 2);
        assert!(batch.is_empty());
    }
}
