//! SQL value enum for type-safe row handling.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// A single cell value moving between source and target.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl SqlValue {
    /// Whether the value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Render as a PostgreSQL SQL literal for inclusion in an INSERT.
    pub fn to_pg_literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            SqlValue::I32(n) => n.to_string(),
            SqlValue::I64(n) => n.to_string(),
            SqlValue::F64(n) => {
                if n.is_finite() {
                    n.to_string()
                } else {
                    // NaN/Infinity need quoting to reach float8
                    format!("'{}'::float8", n)
                }
            }
            SqlValue::String(s) => format!("'{}'", escape_sql_string(s)),
            SqlValue::Bytes(b) => format!("'\\x{}'::bytea", hex::encode(b)),
            SqlValue::DateTime(dt) => {
                format!("'{}'::timestamp", dt.format("%Y-%m-%d %H:%M:%S%.6f"))
            }
            SqlValue::Date(d) => format!("'{}'::date", d),
            SqlValue::Time(t) => format!("'{}'::time", t),
        }
    }
}

/// Escape a string for SQL literal use.
fn escape_sql_string(s: &str) -> String {
    s.replace('\'', "''")
}
