//! Schema and metadata types.

use crate::value::SqlValue;
use serde::{Deserialize, Serialize};

/// Table metadata as introspected from the source database.
///
/// Column order matches the order used when fetching row batches; rows are
/// positional tuples at the wire level, so this correspondence must hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Column definitions, in source ordinal order.
    pub columns: Vec<Column>,

    /// Secondary indexes (the primary key is tracked on the columns).
    pub indexes: Vec<Index>,
}

impl Table {
    /// Column names in ordinal order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Primary key column names, in column order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        self.columns.iter().any(|c| c.is_primary_key)
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Column metadata. Immutable once read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Raw source data type string (e.g. "int(11)", "varchar(255)").
    pub data_type: String,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Whether the column is part of the primary key.
    pub is_primary_key: bool,

    /// Default value as reported by the source, if any.
    pub default_value: Option<String>,

    /// Whether the column auto-increments.
    pub is_auto_increment: bool,
}

/// Secondary index metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,

    /// Whether the index is unique.
    pub is_unique: bool,

    /// Indexed column names, in key order.
    pub columns: Vec<String>,
}

/// A transient page of rows, positionally aligned to `columns`.
#[derive(Debug, Clone)]
pub struct RowBatch {
    /// Column names, in the same order as each row tuple.
    pub columns: Vec<String>,

    /// Row tuples.
    pub rows: Vec<Vec<SqlValue>>,
}

impl RowBatch {
    /// An empty batch over the given column list.
    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Number of rows in the batch.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the batch holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, pk: bool) -> Column {
        Column {
            name: name.to_string(),
            data_type: "int(11)".to_string(),
            is_nullable: false,
            is_primary_key: pk,
            default_value: None,
            is_auto_increment: false,
        }
    }

    #[test]
    fn test_primary_key_preserves_column_order() {
        let table = Table {
            name: "orders".to_string(),
            columns: vec![col("tenant_id", true), col("order_id", true), col("note", false)],
            indexes: vec![],
        };
        assert_eq!(table.primary_key(), vec!["tenant_id", "order_id"]);
        assert!(table.has_pk());
    }

    #[test]
    fn test_no_primary_key() {
        let table = Table {
            name: "log".to_string(),
            columns: vec![col("line", false)],
            indexes: vec![],
        };
        assert!(table.primary_key().is_empty());
        assert!(!table.has_pk());
    }
}
