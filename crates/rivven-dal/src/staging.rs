//! Insert/update staging
//!
//! A [`StagingArea`] classifies candidate records against a baseline of rows
//! already in the database:
//!
//! 1. [`load_baseline`](StagingArea::load_baseline) with the result of a
//!    `SELECT`
//! 2. [`submit`](StagingArea::submit) each candidate with the unique key to
//!    match on and the update key (usually the primary key) to copy over
//! 3. [`drain`](StagingArea::drain) the two partitions and turn them into
//!    statements, or [`apply`](StagedChanges::apply) them in one transaction
//!
//! Two candidates with the same unique-key value in one pass are an error,
//! never a silent merge. Key values compare by exact type: `Int(1)`,
//! `UInt(1)`, `Float(1.0)` and `Text("1")` are four different keys.
//!
//! # Example
//!
//! ```
//! use rivven_dal::staging::{Classification, StagingArea};
//! use rivven_dal::{record, Value};
//!
//! let mut staging = StagingArea::new();
//! staging.load_baseline(vec![record! { "id" => 1_i64, "key" => "a" }]).unwrap();
//!
//! let first = staging.submit(record! { "key" => "a", "v" => 2_i64 }, "key", "id").unwrap();
//! let second = staging.submit(record! { "key" => "b", "v" => 3_i64 }, "key", "id").unwrap();
//! assert_eq!(first, Classification::Update);
//! assert_eq!(second, Classification::Insert);
//!
//! let changes = staging.drain();
//! assert_eq!(changes.to_update[0].get("id"), Some(&Value::Int(1)));
//! assert_eq!(changes.to_insert[0].get("key"), Some(&Value::from("b")));
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::builder::{build_multi_insert, build_update, Statement};
use crate::error::{Error, Result};
use crate::manager::{ConnectionManager, SQL_LOG_TARGET};
use crate::types::{Record, Value};

/// Outcome of a single submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// No baseline row shares the unique key
    Insert,
    /// A baseline row matched; its update key was copied into the record
    Update,
}

/// Hashable view of a scalar key value.
///
/// Variants mirror [`Value`] one to one so that no two types ever compare
/// equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyValue {
    Null,
    Missing,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(u64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeTz(DateTime<Utc>),
    Json(String),
}

impl KeyValue {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(match value {
            Value::Null => Self::Null,
            Value::Missing => Self::Missing,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(n) => Self::Int(*n),
            Value::UInt(n) => Self::UInt(*n),
            // -0.0 and 0.0 are the same key
            Value::Float(n) if *n == 0.0 => Self::Float(0.0_f64.to_bits()),
            Value::Float(n) => Self::Float(n.to_bits()),
            Value::Decimal(d) => Self::Decimal(d.normalize()),
            Value::Text(s) => Self::Text(s.clone()),
            Value::Bytes(b) => Self::Bytes(b.clone()),
            Value::Date(d) => Self::Date(*d),
            Value::Time(t) => Self::Time(*t),
            Value::DateTime(dt) => Self::DateTime(*dt),
            Value::DateTimeTz(dt) => Self::DateTimeTz(*dt),
            Value::Json(json) if !(json.is_array() || json.is_object()) => {
                Self::Json(json.to_string())
            }
            Value::Json(_) | Value::List(_) => {
                return Err(Error::invalid_value(value.type_name()))
            }
        })
    }

    fn of(record: &Record, column: &str) -> Result<Self> {
        match record.get(column) {
            Some(value) => Self::from_value(value).map_err(|e| e.for_column(column)),
            None => Ok(Self::Missing),
        }
    }
}

/// Both partitions of a classification pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StagedChanges<'a> {
    /// Records with no matching baseline row, in submission order
    pub to_insert: &'a [Record],
    /// Records that matched a baseline row, in submission order
    pub to_update: &'a [Record],
}

/// Summary of [`StagedChanges::apply`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagingReport {
    /// Records written by the multi-row insert
    pub inserted: usize,
    /// Records written by per-record updates
    pub updated: usize,
    /// Rows reported changed by the database
    pub affected_rows: u64,
}

impl StagedChanges<'_> {
    /// Whether neither partition holds a record
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty()
    }

    /// One multi-row `INSERT` for every record to insert, if any
    pub fn insert_statement(&self, table: &str) -> Result<Option<Statement>> {
        if self.to_insert.is_empty() {
            return Ok(None);
        }
        build_multi_insert(table, self.to_insert).map(Some)
    }

    /// One `UPDATE ... WHERE update_key = ?` per record to update.
    ///
    /// Every column other than `update_key` is assigned.
    pub fn update_statements(&self, table: &str, update_key: &str) -> Result<Vec<Statement>> {
        self.to_update
            .iter()
            .map(|record| {
                let id = record.get(update_key).cloned().unwrap_or(Value::Missing);
                let mut predicates = Record::with_capacity(1);
                predicates.insert(update_key.to_string(), id);
                let assignments: Record = record
                    .iter()
                    .filter(|(column, _)| column.as_str() != update_key)
                    .map(|(column, value)| (column.clone(), value.clone()))
                    .collect();
                build_update(table, &predicates, &assignments)
            })
            .collect()
    }

    /// Write both partitions inside a single transaction.
    ///
    /// All statements are built before a connection is acquired, so a bad
    /// record fails without touching the database. Any statement failure
    /// rolls the whole pass back.
    pub async fn apply(
        &self,
        manager: &ConnectionManager,
        table: &str,
        update_key: &str,
        log: bool,
    ) -> Result<StagingReport> {
        let mut statements = Vec::with_capacity(self.to_update.len() + 1);
        if let Some(insert) = self.insert_statement(table)? {
            statements.push(insert);
        }
        statements.extend(self.update_statements(table, update_key)?);

        let mut report = StagingReport {
            inserted: self.to_insert.len(),
            updated: self.to_update.len(),
            affected_rows: 0,
        };
        if statements.is_empty() {
            return Ok(report);
        }

        report.affected_rows = manager
            .transaction(move |tx| {
                Box::pin(async move {
                    let mut affected = 0;
                    for statement in &statements {
                        if log {
                            info!(
                                target: SQL_LOG_TARGET,
                                sql = statement.sql(),
                                params = ?statement.params(),
                                "Executing staged statement"
                            );
                        }
                        affected += tx
                            .query(statement.sql(), statement.params())
                            .await?
                            .affected_rows();
                    }
                    Ok::<_, Error>(affected)
                })
            })
            .await?;

        info!(
            table,
            inserted = report.inserted,
            updated = report.updated,
            affected_rows = report.affected_rows,
            "Applied staged changes"
        );
        Ok(report)
    }
}

/// Insert/update classifier for one pass over a baseline
#[derive(Debug, Default)]
pub struct StagingArea {
    baseline: Vec<Record>,
    to_insert: Vec<Record>,
    to_update: Vec<Record>,
    /// Per key column: first baseline row holding each key value
    baseline_index: HashMap<String, HashMap<KeyValue, usize>>,
    /// Per key column: key values of every accepted record
    accepted_index: HashMap<String, HashSet<KeyValue>>,
}

impl StagingArea {
    /// Create an empty staging area
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the baseline.
    ///
    /// Accepts any row source, including a [`RowSet`](crate::types::RowSet).
    /// Fails with [`Error::StagingSealed`] once the current pass has accepted
    /// a record; call [`reset`](Self::reset) to start a new pass.
    pub fn load_baseline<I, R>(&mut self, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: Into<Record>,
    {
        let accepted = self.accepted();
        if accepted > 0 {
            return Err(Error::StagingSealed { accepted });
        }
        self.baseline = rows.into_iter().map(Into::into).collect();
        self.baseline_index.clear();
        debug!(rows = self.baseline.len(), "Loaded staging baseline");
        Ok(())
    }

    /// Classify one candidate record.
    ///
    /// Fails with [`Error::DuplicateKey`] if an accepted record already
    /// carries the same `unique_key` value; the baseline is not consulted in
    /// that case. A record without `unique_key` is keyed as missing.
    pub fn submit(
        &mut self,
        mut record: Record,
        unique_key: &str,
        update_key: &str,
    ) -> Result<Classification> {
        let key = KeyValue::of(&record, unique_key)?;

        if self.accepted_keys(unique_key).contains(&key) {
            let value = record.get(unique_key).unwrap_or(&Value::Missing);
            return Err(Error::DuplicateKey {
                key: unique_key.to_string(),
                value: value.to_string(),
            });
        }

        let matched = self.baseline_row(unique_key, &key);
        let classification = match matched {
            None => Classification::Insert,
            Some(idx) => {
                let id = self.baseline[idx]
                    .get(update_key)
                    .cloned()
                    .unwrap_or(Value::Missing);
                record.insert(update_key.to_string(), id);
                Classification::Update
            }
        };

        for (column, keys) in self.accepted_index.iter_mut() {
            if let Ok(k) = KeyValue::of(&record, column) {
                keys.insert(k);
            }
        }
        match classification {
            Classification::Insert => self.to_insert.push(record),
            Classification::Update => self.to_update.push(record),
        }
        Ok(classification)
    }

    /// Both partitions, in submission order.
    ///
    /// Does not reset anything; call [`reset`](Self::reset) for a new pass.
    pub fn drain(&self) -> StagedChanges<'_> {
        StagedChanges {
            to_insert: &self.to_insert,
            to_update: &self.to_update,
        }
    }

    /// Clear baseline, accepted keys and both partitions
    pub fn reset(&mut self) {
        self.baseline.clear();
        self.to_insert.clear();
        self.to_update.clear();
        self.baseline_index.clear();
        self.accepted_index.clear();
    }

    /// Number of baseline rows
    pub fn baseline_len(&self) -> usize {
        self.baseline.len()
    }

    /// Number of records accepted in this pass
    pub fn accepted(&self) -> usize {
        self.to_insert.len() + self.to_update.len()
    }

    fn accepted_keys(&mut self, column: &str) -> &HashSet<KeyValue> {
        let (to_insert, to_update) = (&self.to_insert, &self.to_update);
        self.accepted_index
            .entry(column.to_string())
            .or_insert_with(|| {
                to_insert
                    .iter()
                    .chain(to_update)
                    .filter_map(|r| KeyValue::of(r, column).ok())
                    .collect()
            })
    }

    fn baseline_row(&mut self, column: &str, key: &KeyValue) -> Option<usize> {
        let baseline = &self.baseline;
        self.baseline_index
            .entry(column.to_string())
            .or_insert_with(|| {
                let mut index = HashMap::with_capacity(baseline.len());
                for (i, row) in baseline.iter().enumerate() {
                    if let Ok(k) = KeyValue::of(row, column) {
                        index.entry(k).or_insert(i);
                    }
                }
                index
            })
            .get(key)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[test]
    fn test_key_values_compare_by_type() {
        let keys = [
            KeyValue::from_value(&Value::Int(1)).unwrap(),
            KeyValue::from_value(&Value::UInt(1)).unwrap(),
            KeyValue::from_value(&Value::Float(1.0)).unwrap(),
            KeyValue::from_value(&Value::from("1")).unwrap(),
        ];
        let distinct: HashSet<_> = keys.iter().collect();
        assert_eq!(distinct.len(), 4);
    }

    #[test]
    fn test_signed_zero_is_one_key() {
        assert_eq!(
            KeyValue::from_value(&Value::Float(0.0)).unwrap(),
            KeyValue::from_value(&Value::Float(-0.0)).unwrap()
        );
    }

    #[test]
    fn test_decimal_scale_ignored() {
        let a = KeyValue::from_value(&Value::Decimal(Decimal::new(10, 1))).unwrap();
        let b = KeyValue::from_value(&Value::Decimal(Decimal::new(1, 0))).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_composite_key_rejected() {
        let err = KeyValue::of(&record! { "k" => vec![1_i64] }, "k").unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidValueType { type_name: "LIST", column: Some(ref c) } if c == "k"
        ));
    }

    #[test]
    fn test_accepted_index_built_late_sees_earlier_records() {
        let mut staging = StagingArea::new();
        staging.submit(record! { "a" => 1_i64, "b" => "x" }, "a", "id").unwrap();

        let err = staging
            .submit(record! { "a" => 2_i64, "b" => "x" }, "b", "id")
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { ref key, .. } if key == "b"));
    }
}
