//! MySQL source implementation backed by `mysql_async`.

use super::{SourceFactory, SourceStore};
use crate::config::SourceConfig;
use crate::error::{MigrateError, Result};
use crate::schema::{Column, Index, RowBatch, Table};
use crate::typemap::{classify, TypeCategory};
use crate::value::SqlValue;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder, Row, Value};
use tracing::{debug, warn};

/// Opens MySQL connections from a fixed configuration.
pub struct MySqlFactory {
    opts: Opts,
}

impl MySqlFactory {
    pub fn new(config: &SourceConfig) -> Self {
        let builder = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .db_name(Some(config.database.clone()));
        Self {
            opts: Opts::from(builder),
        }
    }
}

#[async_trait]
impl SourceFactory for MySqlFactory {
    type Store = MySqlSource;

    async fn connect(&self) -> Result<MySqlSource> {
        let conn = Conn::new(self.opts.clone())
            .await
            .map_err(|e| MigrateError::Connection(format!("MySQL connection failed: {e}")))?;
        Ok(MySqlSource { conn })
    }
}

/// One MySQL connection.
pub struct MySqlSource {
    conn: Conn,
}

#[async_trait]
impl SourceStore for MySqlSource {
    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let rows: Vec<Row> = self.conn.query("SHOW TABLES").await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.get::<String, usize>(0))
            .collect())
    }

    async fn describe_table(&mut self, table: &str) -> Result<Table> {
        let rows: Vec<Row> = self
            .conn
            .query(format!("DESCRIBE {}", quote_ident(table)))
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.get(0).unwrap_or_default();
            let data_type: String = row.get(1).unwrap_or_default();
            let nullable: String = row.get(2).unwrap_or_default();
            let key: String = row.get(3).unwrap_or_default();
            let default_value: Option<String> = row.get::<Option<String>, usize>(4).flatten();
            let extra: String = row.get(5).unwrap_or_default();

            columns.push(Column {
                name,
                data_type,
                is_nullable: nullable.eq_ignore_ascii_case("YES"),
                is_primary_key: key == "PRI",
                default_value,
                is_auto_increment: extra.to_lowercase().contains("auto_increment"),
            });
        }

        let indexes = self.fetch_indexes(table).await?;
        debug!(
            table,
            columns = columns.len(),
            indexes = indexes.len(),
            "Introspected source table"
        );

        Ok(Table {
            name: table.to_string(),
            columns,
            indexes,
        })
    }

    async fn count_rows(&mut self, table: &str) -> Result<u64> {
        let count: Option<u64> = self
            .conn
            .query_first(format!("SELECT COUNT(*) FROM {}", quote_ident(table)))
            .await?;
        Ok(count.unwrap_or(0))
    }

    async fn fetch_page(&mut self, table: &Table, offset: u64, limit: u64) -> Result<RowBatch> {
        let sql = format!(
            "SELECT {} FROM {} LIMIT {} OFFSET {}",
            column_list(table),
            quote_ident(&table.name),
            limit,
            offset
        );
        let rows: Vec<Row> = self.conn.query(sql).await?;
        Ok(batch_from_rows(table, rows))
    }

    async fn fetch_by_ids(
        &mut self,
        table: &Table,
        id_column: &str,
        ids: &[i64],
    ) -> Result<RowBatch> {
        if ids.is_empty() {
            return Ok(RowBatch::empty(table.column_names()));
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM {} WHERE {} IN ({})",
            column_list(table),
            quote_ident(&table.name),
            quote_ident(id_column),
            placeholders
        );
        let params: Vec<Value> = ids.iter().map(|&id| Value::Int(id)).collect();
        let rows: Vec<Row> = self.conn.exec(sql, params).await?;
        Ok(batch_from_rows(table, rows))
    }

    async fn fetch_id_column(&mut self, table: &str, id_column: &str) -> Result<Vec<i64>> {
        let rows: Vec<Row> = self
            .conn
            .query(format!(
                "SELECT {} FROM {}",
                quote_ident(id_column),
                quote_ident(table)
            ))
            .await?;

        let mut ids = Vec::with_capacity(rows.len());
        let mut dropped = 0usize;
        for row in rows {
            match row.unwrap().into_iter().next().and_then(id_from_value) {
                Some(id) => ids.push(id),
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            warn!(
                table,
                id_column,
                dropped,
                "Non-integer id values skipped; delta sync will not see those rows"
            );
        }
        Ok(ids)
    }
}

impl MySqlSource {
    /// Read secondary indexes, grouping SHOW INDEX rows by key name and
    /// ordering columns by their sequence within the key.
    async fn fetch_indexes(&mut self, table: &str) -> Result<Vec<Index>> {
        let rows: Vec<Row> = self
            .conn
            .query(format!("SHOW INDEX FROM {}", quote_ident(table)))
            .await?;

        let mut indexes: Vec<Index> = Vec::new();
        let mut members: Vec<Vec<(i64, String)>> = Vec::new();

        for row in rows {
            let non_unique: i64 = row.get(1).unwrap_or(1);
            let key_name: String = row.get(2).unwrap_or_default();
            let seq: i64 = row.get(3).unwrap_or(0);
            let column: String = row.get(4).unwrap_or_default();

            if key_name == "PRIMARY" {
                continue;
            }

            match indexes.iter().position(|i| i.name == key_name) {
                Some(pos) => members[pos].push((seq, column)),
                None => {
                    indexes.push(Index {
                        name: key_name,
                        is_unique: non_unique == 0,
                        columns: Vec::new(),
                    });
                    members.push(vec![(seq, column)]);
                }
            }
        }

        for (index, mut cols) in indexes.iter_mut().zip(members) {
            cols.sort_by_key(|(seq, _)| *seq);
            index.columns = cols.into_iter().map(|(_, c)| c).collect();
        }

        Ok(indexes)
    }
}

fn column_list(table: &Table) -> String {
    table
        .columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn batch_from_rows(table: &Table, rows: Vec<Row>) -> RowBatch {
    let categories: Vec<TypeCategory> =
        table.columns.iter().map(|c| classify(&c.data_type)).collect();

    let converted = rows
        .into_iter()
        .map(|row| {
            row.unwrap()
                .into_iter()
                .zip(&categories)
                .map(|(value, category)| to_sql_value(value, *category))
                .collect()
        })
        .collect();

    RowBatch {
        columns: table.column_names(),
        rows: converted,
    }
}

/// Convert one wire value, using the declared column category to
/// disambiguate text-protocol byte payloads.
fn to_sql_value(value: Value, category: TypeCategory) -> SqlValue {
    match value {
        Value::NULL => SqlValue::Null,
        Value::Int(v) => match category {
            TypeCategory::Boolean => SqlValue::Bool(v != 0),
            _ => SqlValue::I64(v),
        },
        Value::UInt(v) => SqlValue::I64(v as i64),
        Value::Float(v) => SqlValue::F64(v as f64),
        Value::Double(v) => SqlValue::F64(v),
        Value::Date(y, mo, d, h, mi, s, us) => {
            let date = NaiveDate::from_ymd_opt(y as i32, mo as u32, d as u32);
            match category {
                TypeCategory::Date => date.map(SqlValue::Date).unwrap_or(SqlValue::Null),
                _ => date
                    .and_then(|dt| dt.and_hms_micro_opt(h as u32, mi as u32, s as u32, us))
                    .map(SqlValue::DateTime)
                    .unwrap_or(SqlValue::Null),
            }
        }
        Value::Time(negative, days, h, m, s, us) => {
            if negative || days > 0 {
                // TIME values outside a single day have no target equivalent
                return SqlValue::Null;
            }
            NaiveTime::from_hms_micro_opt(h as u32, m as u32, s as u32, us)
                .map(SqlValue::Time)
                .unwrap_or(SqlValue::Null)
        }
        Value::Bytes(bytes) => bytes_to_sql_value(bytes, category),
    }
}

fn bytes_to_sql_value(bytes: Vec<u8>, category: TypeCategory) -> SqlValue {
    if category == TypeCategory::Binary {
        return SqlValue::Bytes(bytes);
    }

    let text = String::from_utf8_lossy(&bytes).into_owned();
    match category {
        TypeCategory::Boolean => text
            .parse::<i64>()
            .map(|v| SqlValue::Bool(v != 0))
            .unwrap_or(SqlValue::Null),
        TypeCategory::TinyInt
        | TypeCategory::SmallInt
        | TypeCategory::Int
        | TypeCategory::BigInt
        | TypeCategory::Year => text
            .parse::<i64>()
            .map(SqlValue::I64)
            .unwrap_or(SqlValue::Null),
        TypeCategory::Float => text
            .parse::<f64>()
            .map(SqlValue::F64)
            .unwrap_or(SqlValue::Null),
        // Temporal text is carried as-is; batch coercion normalizes it
        _ => SqlValue::String(text),
    }
}

/// Extract an integer id from a wire value. Delta sync assumes integer id
/// columns; anything else yields `None`.
fn id_from_value(value: Value) -> Option<i64> {
    match value {
        Value::Int(v) => Some(v),
        Value::UInt(v) => i64::try_from(v).ok(),
        Value::Bytes(b) => String::from_utf8_lossy(&b).trim().parse().ok(),
        _ => None,
    }
}

/// Quote a MySQL identifier.
fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
