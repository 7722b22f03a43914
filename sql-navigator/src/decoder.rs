//! Result decoding
//!
//! Providers surface driver rows as a [`RawResultSet`] of [`SqlValue`]s. [`decode`]
//! turns that into ordered, string-keyed rows: byte values become strings and
//! everything else passes through untouched. The same decoder backs table
//! browsing, raw queries and exports.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

/// A single decoded cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Exact numeric kept in its textual form to preserve precision
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeUtc(DateTime<Utc>),
    Json(serde_json::Value),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

/// A row keyed by column name, in result-set column order
pub type Row = IndexMap<String, SqlValue>;

/// Rows exactly as a provider read them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawResultSet {
    /// Column names in result order
    pub columns: Vec<String>,

    /// One value per column for every row
    pub rows: Vec<Vec<SqlValue>>,
}

impl RawResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Decode a raw result set into string-keyed rows
///
/// Row order mirrors the result set. When a column name repeats, the later
/// value wins.
pub fn decode(set: RawResultSet) -> Vec<Row> {
    let RawResultSet { columns, rows } = set;

    rows.into_iter()
        .map(|values| {
            columns
                .iter()
                .cloned()
                .zip(values.into_iter().map(coerce))
                .collect()
        })
        .collect()
}

/// Byte values become strings; every other value is returned unchanged
pub fn coerce(value: SqlValue) -> SqlValue {
    match value {
        SqlValue::Bytes(bytes) => SqlValue::Text(
            String::from_utf8(bytes)
                .unwrap_or_else(|error| String::from_utf8_lossy(error.as_bytes()).into_owned()),
        ),
        other => other,
    }
}
