//! Target table-creation planning.
//!
//! Turns introspected source metadata into an ordered PostgreSQL creation
//! plan: one `CREATE TABLE IF NOT EXISTS` statement plus independent
//! `CREATE INDEX IF NOT EXISTS` statements for non-unique indexes. Unique
//! indexes fold into table-level UNIQUE constraints instead.

use crate::error::{MigrateError, Result};
use crate::schema::Table;
use crate::typemap::{classify, map_to_postgres};

/// PostgreSQL identifier length limit.
const PG_IDENT_MAX: usize = 63;

/// One independent index-creation statement.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStatement {
    /// Index name (already truncated to the identifier limit).
    pub name: String,

    /// The full CREATE INDEX IF NOT EXISTS statement.
    pub sql: String,
}

/// An ordered table-creation plan.
///
/// The table statement and each index statement are separate commit units:
/// an index failure leaves the table and the other indexes in place.
#[derive(Debug, Clone)]
pub struct TablePlan {
    /// Table name the plan creates.
    pub table: String,

    /// CREATE TABLE IF NOT EXISTS statement.
    pub create_table: String,

    /// CREATE INDEX IF NOT EXISTS statements for non-unique indexes.
    pub create_indexes: Vec<IndexStatement>,
}

/// Build a creation plan for a table.
pub fn build_table_plan(table: &Table) -> Result<TablePlan> {
    if table.columns.is_empty() {
        return Err(MigrateError::schema(&table.name, "table has no columns"));
    }

    let mut definitions: Vec<String> = Vec::with_capacity(table.columns.len() + 2);
    let mut primary_keys: Vec<&str> = Vec::new();

    for col in &table.columns {
        definitions.push(column_definition(col));
        if col.is_primary_key {
            primary_keys.push(&col.name);
        }
    }

    if !primary_keys.is_empty() {
        let quoted: Vec<String> = primary_keys.iter().map(|c| quote_ident(c)).collect();
        definitions.push(format!("PRIMARY KEY ({})", quoted.join(", ")));
    }

    let mut create_indexes = Vec::new();
    for index in &table.indexes {
        if index.name == "PRIMARY" {
            continue;
        }
        if index.is_unique {
            let cols: Vec<String> = index.columns.iter().map(|c| quote_ident(c)).collect();
            definitions.push(format!("UNIQUE ({})", cols.join(", ")));
        } else {
            create_indexes.push(index_statement(&table.name, &index.name, &index.columns));
        }
    }

    let create_table = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quote_ident(&table.name),
        definitions.join(",\n  ")
    );

    Ok(TablePlan {
        table: table.name.clone(),
        create_table,
        create_indexes,
    })
}

/// Render one column definition.
fn column_definition(col: &crate::schema::Column) -> String {
    // Auto-increment columns override the mapped type with a serial type;
    // the serial type implies NOT NULL, so no explicit clause is emitted.
    if col.is_auto_increment {
        let serial = if col.data_type.to_lowercase().contains("bigint") {
            "BIGSERIAL"
        } else {
            "SERIAL"
        };
        return format!("{} {}", quote_ident(&col.name), serial);
    }

    let pg_type = map_to_postgres(classify(&col.data_type), &col.data_type);
    let mut def = format!("{} {}", quote_ident(&col.name), pg_type);

    if !col.is_nullable {
        def.push_str(" NOT NULL");
    } else if let Some(default) = &col.default_value {
        if default != "NULL" {
            def.push_str(&format!(" DEFAULT {}", format_default(default, &pg_type)));
        }
    }

    def
}

/// Format a default value clause for the mapped target type.
fn format_default(default: &str, pg_type: &str) -> String {
    if default.to_uppercase().contains("CURRENT_TIMESTAMP") {
        return "CURRENT_TIMESTAMP".to_string();
    }

    let unquoted = matches!(
        pg_type,
        "SMALLINT" | "INTEGER" | "BIGINT" | "REAL" | "DOUBLE PRECISION" | "BOOLEAN"
    ) || pg_type.starts_with("NUMERIC");

    if unquoted {
        default.to_string()
    } else {
        format!("'{}'", default.replace('\'', "''"))
    }
}

/// Build one CREATE INDEX statement, with the name truncated to the
/// identifier limit to avoid identifier-too-long failures.
fn index_statement(table: &str, index_key: &str, columns: &[String]) -> IndexStatement {
    let mut name = format!("{}_{}_idx", table, index_key);
    name.truncate(PG_IDENT_MAX);

    let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let sql = format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        quote_ident(&name),
        quote_ident(table),
        cols.join(", ")
    );

    IndexStatement { name, sql }
}

/// Quote a PostgreSQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
