//! Migration engine - workflow coordination.
//!
//! Three entry points cover the lifecycle: [`TableCreator`] builds target
//! tables from source metadata, [`Migrator`] copies rows in batches
//! (sequentially or across workers) and realigns serial sequences, and
//! [`DeltaSyncer`] backfills rows missing from the target after a prior run.
//!
//! Each worker task opens its own source/target connection pair through the
//! injected factories and keeps it for its whole slice of the work; nothing
//! is shared across tasks but the factories themselves.

use crate::error::{MigrateError, Result};
use crate::plan::build_table_plan;
use crate::schema::Table;
use crate::source::{SourceFactory, SourceStore};
use crate::target::{TargetFactory, TargetStore};
use crate::transform::coerce_batch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// Per-run behavior knobs.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Rows per batch.
    pub batch_size: u64,

    /// Number of worker tasks for parallel runs.
    pub workers: usize,

    /// Whether to spread batches across workers.
    pub parallel: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            workers: 4,
            parallel: false,
        }
    }
}

/// Per-table outcome of a row migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableStats {
    /// Table name.
    pub table: String,

    /// Source row count at the start of the run.
    pub total_rows: u64,

    /// Rows actually inserted into the target.
    pub migrated_rows: u64,

    /// Batches dropped after a load failure.
    pub failed_batches: usize,

    /// Wall-clock duration in seconds.
    pub duration_seconds: f64,
}

/// Result of a full migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Total tables processed.
    pub tables_total: usize,

    /// Tables migrated without a table-level failure.
    pub tables_success: usize,

    /// Tables that failed outright.
    pub tables_failed: usize,

    /// Total rows inserted into the target.
    pub rows_transferred: u64,

    /// Names of tables that failed outright.
    pub failed_tables: Vec<String>,

    /// Per-table details.
    pub tables: Vec<TableStats>,
}

impl MigrationReport {
    /// Serialize the report as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Per-table outcome of a delta sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaStats {
    /// Table name.
    pub table: String,

    /// Ids present in the source but not the target when the sync started.
    pub missing_rows: usize,

    /// Rows actually inserted into the target.
    pub synced_rows: u64,
}

/// Creates target tables from source metadata.
///
/// Holds no row-copying capability; pair it with a [`Migrator`] when rows
/// should move too.
pub struct TableCreator<SF, TF> {
    source: Arc<SF>,
    target: Arc<TF>,
}

impl<SF: SourceFactory, TF: TargetFactory> TableCreator<SF, TF> {
    pub fn new(source: Arc<SF>, target: Arc<TF>) -> Self {
        Self { source, target }
    }

    /// Create every source table on the target. Tables whose metadata cannot
    /// be translated are logged and skipped; the created table names are
    /// returned in source order.
    pub async fn create_all(&self) -> Result<Vec<String>> {
        let mut src = self.source.connect().await?;
        let mut tgt = self.target.connect().await?;

        let names = src.list_tables().await?;
        info!(tables = names.len(), "Creating target tables");

        let mut created = Vec::with_capacity(names.len());
        for name in names {
            match create_one(&mut src, &mut tgt, &name).await {
                Ok(()) => created.push(name),
                Err(e) => {
                    error!(table = %name, error = %e, "Skipping table; creation failed");
                }
            }
        }
        Ok(created)
    }

    /// Create one table on the target.
    pub async fn create_table(&self, name: &str) -> Result<()> {
        let mut src = self.source.connect().await?;
        let mut tgt = self.target.connect().await?;
        create_one(&mut src, &mut tgt, name).await
    }
}

async fn create_one<S: SourceStore, T: TargetStore>(
    src: &mut S,
    tgt: &mut T,
    name: &str,
) -> Result<()> {
    let table = src.describe_table(name).await?;
    let plan = build_table_plan(&table)?;
    tgt.create_table(&plan).await
}

/// Copies rows from source to target in batches.
pub struct Migrator<SF, TF> {
    source: Arc<SF>,
    target: Arc<TF>,
    options: MigrationOptions,
}

impl<SF: SourceFactory, TF: TargetFactory> Migrator<SF, TF> {
    pub fn new(source: Arc<SF>, target: Arc<TF>, options: MigrationOptions) -> Self {
        Self {
            source,
            target,
            options,
        }
    }

    /// Migrate one table. The source row count is snapshotted once at the
    /// start; rows appended afterwards are left to a later delta sync.
    pub async fn migrate_table(&self, name: &str) -> Result<TableStats> {
        let start = Utc::now();

        let mut src = self.source.connect().await?;
        let table = src.describe_table(name).await?;
        let total = src.count_rows(name).await?;

        let (migrated, failed) = if self.options.parallel && total > self.options.batch_size {
            drop(src);
            self.migrate_parallel(&table, total).await?
        } else {
            let mut tgt = self.target.connect().await?;
            self.migrate_sequential(&mut src, &mut tgt, &table, total)
                .await?
        };

        let duration = seconds_since(start);
        info!(
            table = name,
            migrated,
            total,
            failed_batches = failed,
            "Table migration finished"
        );

        Ok(TableStats {
            table: name.to_string(),
            total_rows: total,
            migrated_rows: migrated,
            failed_batches: failed,
            duration_seconds: duration,
        })
    }

    async fn migrate_sequential<S: SourceStore, T: TargetStore>(
        &self,
        src: &mut S,
        tgt: &mut T,
        table: &Table,
        total: u64,
    ) -> Result<(u64, usize)> {
        let batch_size = self.options.batch_size;
        let mut migrated = 0u64;
        let mut failed = 0usize;
        let mut offset = 0u64;

        while offset < total {
            match copy_page(src, tgt, table, offset, batch_size).await {
                Ok(inserted) => migrated += inserted,
                Err(e) => {
                    warn!(
                        table = %table.name,
                        offset,
                        error = %e,
                        "Batch failed; continuing with the next offset"
                    );
                    failed += 1;
                }
            }
            offset += batch_size;
            info!(
                "Progress: {}/{} rows for {}",
                offset.min(total),
                total,
                table.name
            );
        }

        Ok((migrated, failed))
    }

    /// Spread offsets round-robin over worker tasks. Each task opens its own
    /// connection pair once and reuses it for every offset in its group.
    async fn migrate_parallel(&self, table: &Table, total: u64) -> Result<(u64, usize)> {
        let batch_size = self.options.batch_size;
        let groups = offset_groups(total, batch_size, self.options.workers);
        info!(
            table = %table.name,
            total,
            workers = groups.len(),
            "Migrating in parallel"
        );

        let mut handles = Vec::with_capacity(groups.len());
        for offsets in groups {
            let source = Arc::clone(&self.source);
            let target = Arc::clone(&self.target);
            let table = table.clone();

            handles.push(tokio::spawn(async move {
                let mut src = source.connect().await?;
                let mut tgt = target.connect().await?;

                let mut migrated = 0u64;
                let mut failed = 0usize;
                for offset in offsets {
                    match copy_page(&mut src, &mut tgt, &table, offset, batch_size).await {
                        Ok(inserted) => migrated += inserted,
                        Err(e) => {
                            warn!(
                                table = %table.name,
                                offset,
                                error = %e,
                                "Batch failed; continuing with the next offset"
                            );
                            failed += 1;
                        }
                    }
                }
                Ok::<_, MigrateError>((migrated, failed))
            }));
        }

        let mut migrated = 0u64;
        let mut failed = 0usize;
        for result in futures::future::join_all(handles).await {
            let (m, f) = result
                .map_err(|e| MigrateError::transfer(&table.name, format!("worker panicked: {e}")))??;
            migrated += m;
            failed += f;
        }

        Ok((migrated, failed))
    }

    /// Migrate every source table. A table-level failure is logged and the
    /// run moves on to the next table.
    pub async fn migrate_all(&self) -> Result<MigrationReport> {
        let started_at = Utc::now();

        let names = {
            let mut src = self.source.connect().await?;
            src.list_tables().await?
        };
        info!(tables = names.len(), "Starting row migration");

        let mut tables = Vec::with_capacity(names.len());
        let mut failed_tables = Vec::new();
        for name in &names {
            match self.migrate_table(name).await {
                Ok(stats) => tables.push(stats),
                Err(e) => {
                    error!(table = %name, error = %e, "Table migration failed");
                    failed_tables.push(name.clone());
                }
            }
        }

        let completed_at = Utc::now();
        Ok(MigrationReport {
            started_at,
            completed_at,
            duration_seconds: seconds_since(started_at),
            tables_total: names.len(),
            tables_success: tables.len(),
            tables_failed: failed_tables.len(),
            rows_transferred: tables.iter().map(|t| t.migrated_rows).sum(),
            failed_tables,
            tables,
        })
    }

    /// Realign the serial sequence of every migrated table, so inserts after
    /// the migration continue past the migrated rows. Tables without a
    /// primary key are a no-op; per-table failures are logged and skipped.
    pub async fn realign_sequences(&self) -> Result<()> {
        let mut src = self.source.connect().await?;
        let mut tgt = self.target.connect().await?;

        for name in src.list_tables().await? {
            if let Err(e) = tgt.realign_sequence(&name).await {
                warn!(table = %name, error = %e, "Sequence realignment failed");
            } else {
                info!(table = %name, "Sequence realigned");
            }
        }
        Ok(())
    }

    /// Full lifecycle: create tables, migrate rows, realign sequences.
    pub async fn run_full(&self) -> Result<MigrationReport> {
        let creator = TableCreator::new(Arc::clone(&self.source), Arc::clone(&self.target));
        creator.create_all().await?;
        let report = self.migrate_all().await?;
        self.realign_sequences().await?;
        Ok(report)
    }
}

/// Backfills rows present in the source but absent from the target.
pub struct DeltaSyncer<SF, TF> {
    source: Arc<SF>,
    target: Arc<TF>,
    options: MigrationOptions,
    id_column: String,
}

impl<SF: SourceFactory, TF: TargetFactory> DeltaSyncer<SF, TF> {
    pub fn new(
        source: Arc<SF>,
        target: Arc<TF>,
        options: MigrationOptions,
        id_column: impl Into<String>,
    ) -> Self {
        Self {
            source,
            target,
            options,
            id_column: id_column.into(),
        }
    }

    /// Sync one table by id-set difference. The missing-id snapshot is taken
    /// once; rows appended during the sync wait for the next run.
    pub async fn sync_table(&self, name: &str) -> Result<DeltaStats> {
        let mut src = self.source.connect().await?;
        let mut tgt = self.target.connect().await?;

        let table = src.describe_table(name).await?;
        let missing = {
            let source_ids = src.fetch_id_column(name, &self.id_column).await?;
            let target_ids: HashSet<i64> =
                tgt.fetch_id_column(name, &self.id_column).await?.into_iter().collect();

            let mut missing: Vec<i64> = source_ids
                .into_iter()
                .filter(|id| !target_ids.contains(id))
                .collect();
            missing.sort_unstable();
            missing.dedup();
            missing
        };

        if missing.is_empty() {
            info!(table = name, "Delta sync: nothing missing");
            return Ok(DeltaStats {
                table: name.to_string(),
                missing_rows: 0,
                synced_rows: 0,
            });
        }
        info!(table = name, missing = missing.len(), "Delta sync started");

        let chunks: Vec<Vec<i64>> = missing
            .chunks(self.options.batch_size as usize)
            .map(|c| c.to_vec())
            .collect();

        let synced = if self.options.parallel && chunks.len() > 1 {
            drop(src);
            drop(tgt);
            self.sync_parallel(&table, chunks).await?
        } else {
            let mut synced = 0u64;
            for chunk in chunks {
                match sync_chunk(&mut src, &mut tgt, &table, &self.id_column, &chunk).await {
                    Ok(inserted) => synced += inserted,
                    Err(e) => {
                        warn!(table = name, error = %e, "Delta chunk failed; continuing");
                    }
                }
            }
            synced
        };

        Ok(DeltaStats {
            table: name.to_string(),
            missing_rows: missing.len(),
            synced_rows: synced,
        })
    }

    /// One task per chunk, capped by a semaphore; each task opens its own
    /// connection pair.
    async fn sync_parallel(&self, table: &Table, chunks: Vec<Vec<i64>>) -> Result<u64> {
        let permits = Arc::new(Semaphore::new(self.options.workers.max(1)));

        let mut handles = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let source = Arc::clone(&self.source);
            let target = Arc::clone(&self.target);
            let permits = Arc::clone(&permits);
            let table = table.clone();
            let id_column = self.id_column.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| MigrateError::transfer(&table.name, e.to_string()))?;

                let mut src = source.connect().await?;
                let mut tgt = target.connect().await?;
                match sync_chunk(&mut src, &mut tgt, &table, &id_column, &chunk).await {
                    Ok(inserted) => Ok::<_, MigrateError>(inserted),
                    Err(e) => {
                        warn!(table = %table.name, error = %e, "Delta chunk failed; continuing");
                        Ok(0)
                    }
                }
            }));
        }

        let mut synced = 0u64;
        for result in futures::future::join_all(handles).await {
            synced += result
                .map_err(|e| MigrateError::transfer(&table.name, format!("worker panicked: {e}")))??;
        }
        Ok(synced)
    }

    /// Sync every source table, logging and skipping per-table failures.
    pub async fn sync_all(&self) -> Result<Vec<DeltaStats>> {
        let names = {
            let mut src = self.source.connect().await?;
            src.list_tables().await?
        };

        let mut stats = Vec::with_capacity(names.len());
        for name in names {
            match self.sync_table(&name).await {
                Ok(s) => stats.push(s),
                Err(e) => {
                    error!(table = %name, error = %e, "Delta sync failed for table");
                }
            }
        }
        Ok(stats)
    }
}

/// Fetch, coerce, and load one page. Returns the inserted row count.
async fn copy_page<S: SourceStore, T: TargetStore>(
    src: &mut S,
    tgt: &mut T,
    table: &Table,
    offset: u64,
    limit: u64,
) -> Result<u64> {
    let mut batch = src.fetch_page(table, offset, limit).await?;
    if batch.is_empty() {
        return Ok(0);
    }
    coerce_batch(&mut batch, table);
    tgt.insert_batch(&table.name, &batch).await
}

async fn sync_chunk<S: SourceStore, T: TargetStore>(
    src: &mut S,
    tgt: &mut T,
    table: &Table,
    id_column: &str,
    ids: &[i64],
) -> Result<u64> {
    let mut batch = src.fetch_by_ids(table, id_column, ids).await?;
    if batch.is_empty() {
        return Ok(0);
    }
    coerce_batch(&mut batch, table);
    tgt.insert_batch(&table.name, &batch).await
}

/// Round-robin offset assignment: offset i goes to group i mod workers.
/// Never yields more groups than there are offsets.
fn offset_groups(total: u64, batch_size: u64, workers: usize) -> Vec<Vec<u64>> {
    let offsets: Vec<u64> = (0..total).step_by(batch_size.max(1) as usize).collect();
    let workers = workers.max(1).min(offsets.len().max(1));

    let mut groups: Vec<Vec<u64>> = vec![Vec::new(); workers];
    for (i, offset) in offsets.into_iter().enumerate() {
        groups[i % workers].push(offset);
    }
    groups.retain(|g| !g.is_empty());
    groups
}

fn seconds_since(start: DateTime<Utc>) -> f64 {
    (Utc::now() - start).num_milliseconds() as f64 / 1000.0
}
