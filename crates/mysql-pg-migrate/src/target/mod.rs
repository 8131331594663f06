//! Target database operations.

mod postgres;

pub use postgres::{PgFactory, PgTarget};

use crate::error::Result;
use crate::plan::TablePlan;
use crate::schema::RowBatch;
use async_trait::async_trait;

/// Operations against one exclusively-owned target connection.
#[async_trait]
pub trait TargetStore: Send {
    /// Apply a creation plan. A table-statement failure is returned; an
    /// index-statement failure is logged and skipped, leaving the table and
    /// the remaining indexes in place.
    async fn create_table(&mut self, plan: &TablePlan) -> Result<()>;

    /// Insert a batch, skipping rows that conflict with existing keys.
    /// Returns the number of rows actually inserted. Empty batches are a
    /// no-op.
    async fn insert_batch(&mut self, table: &str, batch: &RowBatch) -> Result<u64>;

    /// Fetch all values of one id column.
    async fn fetch_id_column(&mut self, table: &str, id_column: &str) -> Result<Vec<i64>>;

    /// Advance the serial sequence behind the table's primary key past the
    /// current maximum, so subsequent inserts do not collide with migrated
    /// rows. No-op when the table has no primary key or no owned sequence.
    async fn realign_sequence(&mut self, table: &str) -> Result<()>;
}

/// Factory handed to each worker so it can open its own connection.
#[async_trait]
pub trait TargetFactory: Send + Sync + 'static {
    /// Concrete store type produced by this factory.
    type Store: TargetStore + 'static;

    /// Open a new, exclusively-owned target connection.
    async fn connect(&self) -> Result<Self::Store>;
}
