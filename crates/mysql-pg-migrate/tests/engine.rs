//! Engine tests against in-memory source and target stores.

use async_trait::async_trait;
use mysql_pg_migrate::{
    Column, DeltaSyncer, MigrateError, MigrationOptions, Migrator, Result, RowBatch, SourceFactory,
    SourceStore, SqlValue, Table, TableCreator, TablePlan, TargetFactory, TargetStore,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// In-memory source
// ---------------------------------------------------------------------------

struct SourceState {
    fixtures: Vec<(Table, Vec<Vec<SqlValue>>)>,
    fetched_offsets: Mutex<Vec<u64>>,
}

struct MemSourceFactory {
    state: Arc<SourceState>,
    connects: AtomicUsize,
}

impl MemSourceFactory {
    fn new(fixtures: Vec<(Table, Vec<Vec<SqlValue>>)>) -> Self {
        Self {
            state: Arc::new(SourceState {
                fixtures,
                fetched_offsets: Mutex::new(Vec::new()),
            }),
            connects: AtomicUsize::new(0),
        }
    }

    fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn fetched_offsets(&self) -> Vec<u64> {
        self.state.fetched_offsets.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceFactory for MemSourceFactory {
    type Store = MemSource;

    async fn connect(&self) -> Result<MemSource> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MemSource {
            state: Arc::clone(&self.state),
        })
    }
}

struct MemSource {
    state: Arc<SourceState>,
}

impl MemSource {
    fn fixture(&self, table: &str) -> Result<&(Table, Vec<Vec<SqlValue>>)> {
        self.state
            .fixtures
            .iter()
            .find(|(t, _)| t.name == table)
            .ok_or_else(|| MigrateError::transfer(table, "no such table"))
    }
}

#[async_trait]
impl SourceStore for MemSource {
    async fn list_tables(&mut self) -> Result<Vec<String>> {
        Ok(self
            .state
            .fixtures
            .iter()
            .map(|(t, _)| t.name.clone())
            .collect())
    }

    async fn describe_table(&mut self, table: &str) -> Result<Table> {
        Ok(self.fixture(table)?.0.clone())
    }

    async fn count_rows(&mut self, table: &str) -> Result<u64> {
        Ok(self.fixture(table)?.1.len() as u64)
    }

    async fn fetch_page(&mut self, table: &Table, offset: u64, limit: u64) -> Result<RowBatch> {
        self.state.fetched_offsets.lock().unwrap().push(offset);
        let (_, rows) = self.fixture(&table.name)?;
        let start = (offset as usize).min(rows.len());
        let end = (start + limit as usize).min(rows.len());
        Ok(RowBatch {
            columns: table.column_names(),
            rows: rows[start..end].to_vec(),
        })
    }

    async fn fetch_by_ids(
        &mut self,
        table: &Table,
        id_column: &str,
        ids: &[i64],
    ) -> Result<RowBatch> {
        let idx = table
            .columns
            .iter()
            .position(|c| c.name == id_column)
            .ok_or_else(|| MigrateError::transfer(&table.name, "no id column"))?;
        let (_, rows) = self.fixture(&table.name)?;
        let picked = rows
            .iter()
            .filter(|row| match &row[idx] {
                SqlValue::I64(v) => ids.contains(v),
                SqlValue::I32(v) => ids.contains(&(*v as i64)),
                _ => false,
            })
            .cloned()
            .collect();
        Ok(RowBatch {
            columns: table.column_names(),
            rows: picked,
        })
    }

    async fn fetch_id_column(&mut self, table: &str, _id_column: &str) -> Result<Vec<i64>> {
        let (_, rows) = self.fixture(table)?;
        Ok(rows.iter().filter_map(|row| as_i64(&row[0])).collect())
    }
}

// ---------------------------------------------------------------------------
// In-memory target
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TargetState {
    created: Mutex<Vec<String>>,
    rows: Mutex<HashMap<String, HashMap<i64, Vec<SqlValue>>>>,
    sequences: Mutex<HashMap<String, i64>>,
    fail_next_inserts: AtomicUsize,
}

struct MemTargetFactory {
    state: Arc<TargetState>,
    connects: AtomicUsize,
}

impl MemTargetFactory {
    fn new() -> Self {
        Self {
            state: Arc::new(TargetState::default()),
            connects: AtomicUsize::new(0),
        }
    }

    fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn row_count(&self, table: &str) -> usize {
        self.state
            .rows
            .lock()
            .unwrap()
            .get(table)
            .map(|m| m.len())
            .unwrap_or(0)
    }

    fn ids(&self, table: &str) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .state
            .rows
            .lock()
            .unwrap()
            .get(table)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    fn preload(&self, table: &str, ids: &[i64]) {
        let mut rows = self.state.rows.lock().unwrap();
        let entry = rows.entry(table.to_string()).or_default();
        for &id in ids {
            entry.insert(id, vec![SqlValue::I64(id)]);
        }
    }

    fn created_tables(&self) -> Vec<String> {
        self.state.created.lock().unwrap().clone()
    }

    fn sequence_next(&self, table: &str) -> Option<i64> {
        self.state.sequences.lock().unwrap().get(table).copied()
    }

    fn fail_inserts(&self, n: usize) {
        self.state.fail_next_inserts.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl TargetFactory for MemTargetFactory {
    type Store = MemTarget;

    async fn connect(&self) -> Result<MemTarget> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MemTarget {
            state: Arc::clone(&self.state),
        })
    }
}

struct MemTarget {
    state: Arc<TargetState>,
}

#[async_trait]
impl TargetStore for MemTarget {
    async fn create_table(&mut self, plan: &TablePlan) -> Result<()> {
        self.state.created.lock().unwrap().push(plan.table.clone());
        Ok(())
    }

    async fn insert_batch(&mut self, table: &str, batch: &RowBatch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let pending = self.state.fail_next_inserts.load(Ordering::SeqCst);
        if pending > 0 {
            self.state
                .fail_next_inserts
                .store(pending - 1, Ordering::SeqCst);
            return Err(MigrateError::transfer(table, "simulated load failure"));
        }

        let mut rows = self.state.rows.lock().unwrap();
        let entry = rows.entry(table.to_string()).or_default();
        let mut inserted = 0u64;
        for row in &batch.rows {
            let Some(key) = as_i64(&row[0]) else { continue };
            // Conflicting keys are skipped, not overwritten
            if !entry.contains_key(&key) {
                entry.insert(key, row.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn fetch_id_column(&mut self, table: &str, _id_column: &str) -> Result<Vec<i64>> {
        Ok(self
            .state
            .rows
            .lock()
            .unwrap()
            .get(table)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn realign_sequence(&mut self, table: &str) -> Result<()> {
        let max = self
            .state
            .rows
            .lock()
            .unwrap()
            .get(table)
            .and_then(|m| m.keys().max().copied())
            .unwrap_or(1);
        self.state
            .sequences
            .lock()
            .unwrap()
            .insert(table.to_string(), max + 1);
        Ok(())
    }
}

fn as_i64(value: &SqlValue) -> Option<i64> {
    match value {
        SqlValue::I64(v) => Some(*v),
        SqlValue::I32(v) => Some(*v as i64),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn users_table() -> Table {
    Table {
        name: "users".to_string(),
        columns: vec![
            Column {
                name: "id".to_string(),
                data_type: "bigint(20)".to_string(),
                is_nullable: false,
                is_primary_key: true,
                default_value: None,
                is_auto_increment: true,
            },
            Column {
                name: "name".to_string(),
                data_type: "varchar(50)".to_string(),
                is_nullable: true,
                is_primary_key: false,
                default_value: None,
                is_auto_increment: false,
            },
        ],
        indexes: vec![],
    }
}

fn users_rows(n: usize) -> Vec<Vec<SqlValue>> {
    (1..=n)
        .map(|i| {
            vec![
                SqlValue::I64(i as i64),
                SqlValue::String(format!("user{i}")),
            ]
        })
        .collect()
}

fn setup(n: usize) -> (Arc<MemSourceFactory>, Arc<MemTargetFactory>) {
    let source = Arc::new(MemSourceFactory::new(vec![(users_table(), users_rows(n))]));
    let target = Arc::new(MemTargetFactory::new());
    (source, target)
}

fn options(batch_size: u64, workers: usize, parallel: bool) -> MigrationOptions {
    MigrationOptions {
        batch_size,
        workers,
        parallel,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn migrates_every_row_sequentially() {
    let (source, target) = setup(5);
    let migrator = Migrator::new(Arc::clone(&source), Arc::clone(&target), options(2, 1, false));

    let stats = migrator.migrate_table("users").await.unwrap();
    assert_eq!(stats.total_rows, 5);
    assert_eq!(stats.migrated_rows, 5);
    assert_eq!(stats.failed_batches, 0);
    assert_eq!(target.row_count("users"), 5);
}

#[tokio::test]
async fn rerun_is_idempotent() {
    let (source, target) = setup(5);
    let migrator = Migrator::new(Arc::clone(&source), Arc::clone(&target), options(2, 1, false));

    migrator.migrate_table("users").await.unwrap();
    let second = migrator.migrate_table("users").await.unwrap();

    assert_eq!(second.migrated_rows, 0);
    assert_eq!(target.row_count("users"), 5);
}

#[tokio::test]
async fn empty_table_completes_without_batches() {
    let (source, target) = setup(0);
    let migrator = Migrator::new(Arc::clone(&source), Arc::clone(&target), options(10, 1, false));

    let stats = migrator.migrate_table("users").await.unwrap();
    assert_eq!(stats.total_rows, 0);
    assert_eq!(stats.migrated_rows, 0);
    assert!(source.fetched_offsets().is_empty());
    assert_eq!(target.row_count("users"), 0);
}

#[tokio::test]
async fn sequential_offsets_ascend_without_overlap() {
    let (source, target) = setup(25);
    let migrator = Migrator::new(Arc::clone(&source), Arc::clone(&target), options(10, 1, false));

    migrator.migrate_table("users").await.unwrap();

    // As-fetched order: sequential runs page in strictly increasing offsets
    assert_eq!(source.fetched_offsets(), vec![0, 10, 20]);
    assert_eq!(target.row_count("users"), 25);
}

#[tokio::test]
async fn parallel_run_opens_one_connection_pair_per_worker() {
    let (source, target) = setup(30);
    // 3 batches but 8 configured workers: only 3 pairs should be opened
    let migrator = Migrator::new(Arc::clone(&source), Arc::clone(&target), options(10, 8, true));

    let stats = migrator.migrate_table("users").await.unwrap();
    assert_eq!(stats.migrated_rows, 30);
    assert_eq!(target.connect_count(), 3);
    // One extra source connection for metadata, then one per worker
    assert_eq!(source.connect_count(), 4);
    assert_eq!(target.row_count("users"), 30);
}

#[tokio::test]
async fn parallel_and_sequential_agree() {
    let (source_a, target_a) = setup(47);
    let (source_b, target_b) = setup(47);

    Migrator::new(Arc::clone(&source_a), Arc::clone(&target_a), options(10, 1, false))
        .migrate_table("users")
        .await
        .unwrap();
    Migrator::new(Arc::clone(&source_b), Arc::clone(&target_b), options(10, 4, true))
        .migrate_table("users")
        .await
        .unwrap();

    assert_eq!(target_a.ids("users"), target_b.ids("users"));
}

#[tokio::test]
async fn failed_batch_is_skipped_and_counted() {
    let (source, target) = setup(4);
    target.fail_inserts(1);
    let migrator = Migrator::new(Arc::clone(&source), Arc::clone(&target), options(2, 1, false));

    let stats = migrator.migrate_table("users").await.unwrap();
    assert_eq!(stats.failed_batches, 1);
    assert_eq!(stats.migrated_rows, 2);
    assert_eq!(target.row_count("users"), 2);
}

#[tokio::test]
async fn migrate_all_reports_per_table_stats() {
    let (source, target) = setup(7);
    let migrator = Migrator::new(Arc::clone(&source), Arc::clone(&target), options(3, 1, false));

    let report = migrator.migrate_all().await.unwrap();
    assert_eq!(report.tables_total, 1);
    assert_eq!(report.tables_success, 1);
    assert_eq!(report.tables_failed, 0);
    assert_eq!(report.rows_transferred, 7);
    assert!(report.failed_tables.is_empty());
    assert!(report.to_json().unwrap().contains("\"users\""));
}

#[tokio::test]
async fn creator_builds_every_table() {
    let (source, target) = setup(3);
    let creator = TableCreator::new(Arc::clone(&source), Arc::clone(&target));

    let created = creator.create_all().await.unwrap();
    assert_eq!(created, vec!["users".to_string()]);
    assert_eq!(target.created_tables(), vec!["users".to_string()]);
}

#[tokio::test]
async fn delta_sync_backfills_missing_rows() {
    let (source, target) = setup(10);
    target.preload("users", &[1, 2, 3, 4, 5, 6]);

    let syncer = DeltaSyncer::new(
        Arc::clone(&source),
        Arc::clone(&target),
        options(2, 1, false),
        "id",
    );
    let stats = syncer.sync_table("users").await.unwrap();

    assert_eq!(stats.missing_rows, 4);
    assert_eq!(stats.synced_rows, 4);
    assert_eq!(target.ids("users"), (1..=10).collect::<Vec<i64>>());
}

#[tokio::test]
async fn delta_sync_parallel_backfills_missing_rows() {
    let (source, target) = setup(20);
    target.preload("users", &[1, 2, 3, 4, 5]);

    let syncer = DeltaSyncer::new(
        Arc::clone(&source),
        Arc::clone(&target),
        options(4, 3, true),
        "id",
    );
    let stats = syncer.sync_table("users").await.unwrap();

    assert_eq!(stats.missing_rows, 15);
    assert_eq!(stats.synced_rows, 15);
    assert_eq!(target.ids("users"), (1..=20).collect::<Vec<i64>>());
}

#[tokio::test]
async fn delta_sync_with_nothing_missing_is_a_no_op() {
    let (source, target) = setup(5);
    target.preload("users", &[1, 2, 3, 4, 5]);

    let syncer = DeltaSyncer::new(
        Arc::clone(&source),
        Arc::clone(&target),
        options(2, 1, false),
        "id",
    );
    let stats = syncer.sync_table("users").await.unwrap();

    assert_eq!(stats.missing_rows, 0);
    assert_eq!(stats.synced_rows, 0);
}

#[tokio::test]
async fn sequence_advances_past_migrated_rows() {
    let (source, target) = setup(500);
    let migrator = Migrator::new(Arc::clone(&source), Arc::clone(&target), options(100, 1, false));

    migrator.migrate_table("users").await.unwrap();
    migrator.realign_sequences().await.unwrap();

    assert_eq!(target.sequence_next("users"), Some(501));
}

#[tokio::test]
async fn run_full_covers_the_whole_lifecycle() {
    let (source, target) = setup(12);
    let migrator = Migrator::new(Arc::clone(&source), Arc::clone(&target), options(5, 1, false));

    let report = migrator.run_full().await.unwrap();
    assert_eq!(report.rows_transferred, 12);
    assert_eq!(target.created_tables(), vec!["users".to_string()]);
    assert_eq!(target.sequence_next("users"), Some(13));
}
