//! Source database operations.

mod mysql;

pub use mysql::{MySqlFactory, MySqlSource};

use crate::error::Result;
use crate::schema::{RowBatch, Table};
use async_trait::async_trait;

/// Operations against one exclusively-owned source connection.
///
/// Methods take `&mut self`: a store wraps a single connection and access to
/// it is strictly sequential. Workers never share a store; each obtains its
/// own from a [`SourceFactory`].
#[async_trait]
pub trait SourceStore: Send {
    /// List table names, in the source's reported order.
    async fn list_tables(&mut self) -> Result<Vec<String>>;

    /// Read column and index metadata for a table.
    async fn describe_table(&mut self, table: &str) -> Result<Table>;

    /// Count rows in a table.
    async fn count_rows(&mut self, table: &str) -> Result<u64>;

    /// Fetch one page of rows at `offset`, in the table's column order.
    async fn fetch_page(&mut self, table: &Table, offset: u64, limit: u64) -> Result<RowBatch>;

    /// Fetch the rows whose id column matches the given list.
    async fn fetch_by_ids(&mut self, table: &Table, id_column: &str, ids: &[i64])
        -> Result<RowBatch>;

    /// Fetch all values of one id column.
    async fn fetch_id_column(&mut self, table: &str, id_column: &str) -> Result<Vec<i64>>;
}

/// Factory handed to each worker so it can open its own connection.
#[async_trait]
pub trait SourceFactory: Send + Sync + 'static {
    /// Concrete store type produced by this factory.
    type Store: SourceStore + 'static;

    /// Open a new, exclusively-owned source connection.
    async fn connect(&self) -> Result<Self::Store>;
}
