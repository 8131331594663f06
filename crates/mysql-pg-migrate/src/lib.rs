//! # mysql-pg-migrate
//!
//! MySQL to PostgreSQL migration library.
//!
//! This library migrates relational data from MySQL to PostgreSQL with
//! support for:
//!
//! - **Schema translation** from introspected MySQL metadata to idempotent
//!   PostgreSQL DDL
//! - **Batch transfers** with conflict-skipping inserts
//! - **Parallel transfers** with per-worker connections
//! - **Delta sync** to backfill rows missing from the target
//! - **Sequence realignment** for auto-increment primary keys
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mysql_pg_migrate::{Config, Migrator, MySqlFactory, PgFactory};
//!
//! #[tokio::main]
//! async fn main() -> mysql_pg_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let source = Arc::new(MySqlFactory::new(&config.source));
//!     let target = Arc::new(PgFactory::new(&config.target));
//!     let migrator = Migrator::new(source, target, config.migration.options());
//!     let report = migrator.run_full().await?;
//!     println!("Migrated {} rows", report.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod plan;
pub mod schema;
pub mod source;
pub mod target;
pub mod transform;
pub mod typemap;
pub mod value;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig};
pub use engine::{
    DeltaStats, DeltaSyncer, MigrationOptions, MigrationReport, Migrator, TableCreator, TableStats,
};
pub use error::{MigrateError, Result};
pub use plan::{build_table_plan, TablePlan};
pub use schema::{Column, Index, RowBatch, Table};
pub use source::{MySqlFactory, MySqlSource, SourceFactory, SourceStore};
pub use target::{PgFactory, PgTarget, TargetFactory, TargetStore};
pub use value::SqlValue;
