//! SQL statement builders for rivven-dal
//!
//! Every builder returns a [`Statement`]: placeholder SQL (`?`) plus the
//! parameters bound to it, in placeholder order. Table and column names are
//! validated and backtick-quoted; values never reach the SQL text unless
//! [`Statement::inline`] is asked to render them as literals.
//!
//! # Example
//!
//! ```
//! use rivven_dal::builder::{build_insert, build_select};
//! use rivven_dal::{record, Value};
//!
//! let stmt = build_insert("tb_user", &record! { "name" => "kim", "age" => 31_i64 }).unwrap();
//! assert_eq!(stmt.sql(), "INSERT INTO `tb_user` (`name`, `age`) VALUES (?, ?)");
//! assert_eq!(stmt.inline().unwrap(), "INSERT INTO `tb_user` (`name`, `age`) VALUES ('kim', 31)");
//!
//! let stmt = build_select("tb_user", &record! { "deleted_at" => Value::Null }).unwrap();
//! assert_eq!(stmt.sql(), "SELECT * FROM `tb_user` WHERE `deleted_at` IS NULL");
//! ```

use std::fmt;

use crate::error::{Error, Result};
use crate::literal::{to_param, to_sql_literal};
use crate::security::quote_identifier;
use crate::types::{Record, Value};

/// Placeholder SQL text with its bound parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
}

impl Statement {
    /// Create a statement from SQL text and parameters
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Create a statement without parameters
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }

    /// SQL text with `?` placeholders
    #[inline]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bound parameters, in placeholder order
    #[inline]
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Split into SQL text and parameters
    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }

    /// Render the statement with every placeholder replaced by its literal.
    ///
    /// Placeholders inside quoted strings or backtick-quoted identifiers are
    /// left alone. Fails when the placeholder count and the parameter count
    /// disagree.
    pub fn inline(&self) -> Result<String> {
        let mut out = String::with_capacity(self.sql.len() + self.params.len() * 8);
        let mut params = self.params.iter();
        let mut quote: Option<char> = None;

        for c in self.sql.chars() {
            match (quote, c) {
                (None, '?') => {
                    let value = params.next().ok_or_else(|| {
                        Error::statement_with_sql("more placeholders than parameters", &self.sql)
                    })?;
                    out.push_str(&to_sql_literal(value)?);
                    continue;
                }
                (None, '\'' | '`' | '"') => quote = Some(c),
                (Some(q), _) if q == c => quote = None,
                _ => {}
            }
            out.push(c);
        }

        if params.next().is_some() {
            return Err(Error::statement_with_sql(
                "more parameters than placeholders",
                &self.sql,
            ));
        }
        Ok(out)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Build a single-row `INSERT`.
///
/// Columns and values follow the record's insertion order.
pub fn build_insert(table: &str, record: &Record) -> Result<Statement> {
    if record.is_empty() {
        return Err(Error::empty_insert(table));
    }

    let mut sql = insert_head(table, record)?;
    let mut params = Vec::with_capacity(record.len());
    push_values_row(&mut sql, &mut params, record)?;
    Ok(Statement::new(sql, params))
}

/// Build a multi-row `INSERT`.
///
/// The column list comes from the first record. Every following record
/// contributes its values in its own insertion order; columns are not
/// re-derived per row, so records whose keys are ordered differently end up
/// misaligned. A record with a different number of values is rejected.
pub fn build_multi_insert(table: &str, records: &[Record]) -> Result<Statement> {
    let first = match records.first() {
        Some(first) if !first.is_empty() => first,
        _ => return Err(Error::empty_insert(table)),
    };

    let expected = first.len();
    if let Some((row, record)) = records
        .iter()
        .enumerate()
        .find(|(_, r)| r.len() != expected)
    {
        return Err(Error::ColumnCountMismatch {
            table: table.to_string(),
            row,
            expected,
            found: record.len(),
        });
    }

    let mut sql = insert_head(table, first)?;
    let mut params = Vec::with_capacity(expected * records.len());
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        push_values_row(&mut sql, &mut params, record)?;
    }
    Ok(Statement::new(sql, params))
}

/// Build an `UPDATE ... SET ... WHERE ...`.
///
/// Both the predicate and the assignment records must be non-empty: an
/// unfiltered update is never produced. Parameters are ordered assignments
/// first, predicates second.
pub fn build_update(table: &str, predicates: &Record, assignments: &Record) -> Result<Statement> {
    if predicates.is_empty() || assignments.is_empty() {
        return Err(Error::empty_update(table));
    }

    let mut sql = format!("UPDATE {} SET ", quote_identifier(table)?);
    let mut params = Vec::with_capacity(assignments.len() + predicates.len());
    for (i, (column, value)) in assignments.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&quote_identifier(column)?);
        sql.push_str(" = ?");
        params.push(to_param(value).map_err(|e| e.for_column(column))?);
    }

    push_where(&mut sql, &mut params, predicates)?;
    Ok(Statement::new(sql, params))
}

/// Build a `SELECT * FROM table [WHERE ...]`.
///
/// An empty predicate record selects every row.
pub fn build_select(table: &str, predicates: &Record) -> Result<Statement> {
    let mut sql = format!("SELECT * FROM {}", quote_identifier(table)?);
    let mut params = Vec::new();
    if !predicates.is_empty() {
        push_where(&mut sql, &mut params, predicates)?;
    }
    Ok(Statement::new(sql, params))
}

fn insert_head(table: &str, record: &Record) -> Result<String> {
    let columns = record
        .keys()
        .map(|c| quote_identifier(c))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ",
        quote_identifier(table)?,
        columns.join(", ")
    ))
}

fn push_values_row(sql: &mut String, params: &mut Vec<Value>, record: &Record) -> Result<()> {
    sql.push('(');
    for (i, (column, value)) in record.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push('?');
        params.push(to_param(value).map_err(|e| e.for_column(column))?);
    }
    sql.push(')');
    Ok(())
}

/// Append ` WHERE` with every predicate joined by `AND`.
///
/// `Null` renders `IS NULL`, a `List` renders `IN (...)` and an empty list
/// renders a predicate that matches nothing.
fn push_where(sql: &mut String, params: &mut Vec<Value>, predicates: &Record) -> Result<()> {
    sql.push_str(" WHERE ");
    for (i, (column, value)) in predicates.iter().enumerate() {
        if i > 0 {
            sql.push_str(" AND ");
        }
        let quoted = quote_identifier(column)?;
        match value {
            Value::Null => {
                sql.push_str(&quoted);
                sql.push_str(" IS NULL");
            }
            Value::List(items) if items.is_empty() => sql.push_str("1 = 0"),
            Value::List(items) => {
                sql.push_str(&quoted);
                sql.push_str(" IN (");
                for (j, item) in items.iter().enumerate() {
                    if j > 0 {
                        sql.push_str(", ");
                    }
                    sql.push('?');
                    params.push(to_param(item).map_err(|e| e.for_column(column))?);
                }
                sql.push(')');
            }
            other => {
                sql.push_str(&quoted);
                sql.push_str(" = ?");
                params.push(to_param(other).map_err(|e| e.for_column(column))?);
            }
        }
    }
    Ok(())
}
