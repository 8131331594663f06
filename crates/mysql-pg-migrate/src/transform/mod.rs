//! Per-batch value coercion applied before loading into the target.
//!
//! Columns whose values are entirely null in a batch are left untouched;
//! every other column is normalized per its type category so the rendered
//! literals match the target column types.

use crate::schema::{RowBatch, Table};
use crate::typemap::{classify, TypeCategory};
use crate::value::SqlValue;
use chrono::{NaiveDate, NaiveDateTime};

/// Timestamps parsed with a year below 1000 are clamped up to this floor.
fn floor_timestamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1000, 1, 1)
        .expect("valid floor date")
        .and_hms_opt(0, 0, 0)
        .expect("valid floor time")
}

/// Coerce a batch in place using the table's column-type map.
pub fn coerce_batch(batch: &mut RowBatch, table: &Table) {
    for (idx, col_name) in batch.columns.clone().iter().enumerate() {
        let Some(col) = table.column(col_name) else {
            continue;
        };

        if batch.rows.iter().all(|row| row[idx].is_null()) {
            // Entirely-null column in this batch: no transformation needed
            continue;
        }

        match classify(&col.data_type) {
            TypeCategory::Boolean => apply(batch, idx, to_bool),
            TypeCategory::BigInt => apply(batch, idx, to_i64),
            TypeCategory::Int => coerce_int_column(batch, idx),
            TypeCategory::TinyInt | TypeCategory::SmallInt => apply(batch, idx, to_i32),
            TypeCategory::Float => apply(batch, idx, to_f64),
            TypeCategory::DateTime => apply(batch, idx, to_datetime),
            TypeCategory::String | TypeCategory::Enum => apply(batch, idx, to_string),
            // binary, json, date, time, year pass through unchanged
            _ => {}
        }
    }
}

/// Int columns widen to 64-bit only when the observed maximum exceeds the
/// 32-bit signed range; otherwise they narrow to 32-bit.
fn coerce_int_column(batch: &mut RowBatch, idx: usize) {
    let max = batch
        .rows
        .iter()
        .filter_map(|row| match &row[idx] {
            SqlValue::I64(v) => Some(*v),
            SqlValue::I32(v) => Some(*v as i64),
            _ => None,
        })
        .max();

    if max.is_some_and(|m| m > i32::MAX as i64) {
        apply(batch, idx, to_i64);
    } else {
        apply(batch, idx, to_i32);
    }
}

fn apply(batch: &mut RowBatch, idx: usize, f: fn(&SqlValue) -> SqlValue) {
    for row in &mut batch.rows {
        if !row[idx].is_null() {
            row[idx] = f(&row[idx]);
        }
    }
}

fn to_bool(value: &SqlValue) -> SqlValue {
    match value {
        SqlValue::Bool(b) => SqlValue::Bool(*b),
        SqlValue::I32(v) => SqlValue::Bool(*v != 0),
        SqlValue::I64(v) => SqlValue::Bool(*v != 0),
        SqlValue::F64(v) => SqlValue::Bool(*v != 0.0),
        SqlValue::String(s) => match s.trim().parse::<i64>() {
            Ok(v) => SqlValue::Bool(v != 0),
            Err(_) => SqlValue::Bool(!s.is_empty()),
        },
        _ => SqlValue::Null,
    }
}

fn to_i64(value: &SqlValue) -> SqlValue {
    match value {
        SqlValue::I64(v) => SqlValue::I64(*v),
        SqlValue::I32(v) => SqlValue::I64(*v as i64),
        SqlValue::Bool(b) => SqlValue::I64(*b as i64),
        SqlValue::F64(v) => SqlValue::I64(*v as i64),
        SqlValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map(SqlValue::I64)
            .unwrap_or(SqlValue::Null),
        _ => SqlValue::Null,
    }
}

fn to_i32(value: &SqlValue) -> SqlValue {
    match to_i64(value) {
        SqlValue::I64(v) => match i32::try_from(v) {
            Ok(v) => SqlValue::I32(v),
            Err(_) => SqlValue::I64(v),
        },
        other => other,
    }
}

fn to_f64(value: &SqlValue) -> SqlValue {
    match value {
        SqlValue::F64(v) => SqlValue::F64(*v),
        SqlValue::I32(v) => SqlValue::F64(*v as f64),
        SqlValue::I64(v) => SqlValue::F64(*v as f64),
        SqlValue::String(s) => s
            .trim()
            .parse::<f64>()
            .map(SqlValue::F64)
            .unwrap_or(SqlValue::Null),
        _ => SqlValue::Null,
    }
}

/// Parse and clamp a timestamp. Unparseable values coerce to null; parsed
/// timestamps with a year below 1000 clamp up to 1000-01-01 00:00:00.
fn to_datetime(value: &SqlValue) -> SqlValue {
    let parsed = match value {
        SqlValue::DateTime(dt) => Some(*dt),
        SqlValue::Date(d) => d.and_hms_opt(0, 0, 0),
        SqlValue::String(s) => parse_datetime(s.trim()),
        _ => None,
    };

    match parsed {
        // Anything before the floor necessarily has a year below 1000
        Some(dt) if dt < floor_timestamp() => SqlValue::DateTime(floor_timestamp()),
        Some(dt) => SqlValue::DateTime(dt),
        None => SqlValue::Null,
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn to_string(value: &SqlValue) -> SqlValue {
    match value {
        SqlValue::String(s) => SqlValue::String(s.clone()),
        SqlValue::I32(v) => SqlValue::String(v.to_string()),
        SqlValue::I64(v) => SqlValue::String(v.to_string()),
        SqlValue::F64(v) => SqlValue::String(v.to_string()),
        SqlValue::Bool(b) => SqlValue::String(b.to_string()),
        SqlValue::Bytes(b) => SqlValue::String(String::from_utf8_lossy(b).into_owned()),
        SqlValue::DateTime(dt) => SqlValue::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        SqlValue::Date(d) => SqlValue::String(d.to_string()),
        SqlValue::Time(t) => SqlValue::String(t.to_string()),
        SqlValue::Null => SqlValue::Null,
    }
}
