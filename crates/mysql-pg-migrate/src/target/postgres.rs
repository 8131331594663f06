//! PostgreSQL target implementation backed by `tokio-postgres`.

use super::{TargetFactory, TargetStore};
use crate::config::TargetConfig;
use crate::error::{MigrateError, Result};
use crate::plan::{quote_ident, TablePlan};
use crate::schema::RowBatch;
use async_trait::async_trait;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

/// Opens PostgreSQL connections from a fixed configuration.
pub struct PgFactory {
    config: tokio_postgres::Config,
}

impl PgFactory {
    pub fn new(config: &TargetConfig) -> Self {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.host)
            .port(config.port)
            .dbname(&config.database)
            .user(&config.user)
            .password(&config.password);
        Self { config: pg }
    }
}

#[async_trait]
impl TargetFactory for PgFactory {
    type Store = PgTarget;

    async fn connect(&self) -> Result<PgTarget> {
        let (client, connection) = self
            .config
            .connect(NoTls)
            .await
            .map_err(|e| MigrateError::Connection(format!("PostgreSQL connection failed: {e}")))?;

        // The connection object drives the socket; it must be polled for
        // the client to make progress.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        Ok(PgTarget { client })
    }
}

/// One PostgreSQL client.
pub struct PgTarget {
    client: Client,
}

#[async_trait]
impl TargetStore for PgTarget {
    async fn create_table(&mut self, plan: &TablePlan) -> Result<()> {
        self.client.execute(plan.create_table.as_str(), &[]).await?;
        debug!(table = %plan.table, "Created target table");

        for index in &plan.create_indexes {
            if let Err(e) = self.client.execute(index.sql.as_str(), &[]).await {
                warn!(
                    index = %index.name,
                    table = %plan.table,
                    error = %e,
                    "Index creation failed; continuing without it"
                );
            }
        }

        Ok(())
    }

    async fn insert_batch(&mut self, table: &str, batch: &RowBatch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let sql = insert_statement(table, batch);
        let inserted = self.client.execute(sql.as_str(), &[]).await?;
        Ok(inserted)
    }

    async fn fetch_id_column(&mut self, table: &str, id_column: &str) -> Result<Vec<i64>> {
        let sql = format!(
            "SELECT ({})::bigint FROM {}",
            quote_ident(id_column),
            quote_ident(table)
        );
        let rows = self.client.query(sql.as_str(), &[]).await?;

        let mut ids = Vec::with_capacity(rows.len());
        let mut dropped = 0usize;
        for row in rows {
            match row.try_get::<_, i64>(0) {
                Ok(id) => ids.push(id),
                Err(_) => dropped += 1,
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

    async fn realign_sequence(&mut self, table: &str) -> Result<()> {
        let pk_rows = self
            .client
            .query(
                "SELECT a.attname \
                 FROM pg_index i \
                 JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
                 WHERE i.indrelid = $1::regclass AND i.indisprimary",
                &[&quote_ident(table)],
            )
            .await?;
        let Some(pk_column) = pk_rows.first().map(|r| r.get::<_, String>(0)) else {
            debug!(table, "No primary key; nothing to realign");
            return Ok(());
        };

        let row = self
            .client
            .query_one(
                "SELECT pg_get_serial_sequence($1, $2)",
                &[&quote_ident(table), &pk_column],
            )
            .await?;
        let sequence: Option<String> = row.get(0);

        let Some(sequence) = sequence else {
            debug!(table, pk_column, "No owned sequence; nothing to realign");
            return Ok(());
        };

        let sql = format!(
            "SELECT setval('{}', COALESCE((SELECT MAX({}) FROM {}), 1), true)",
            sequence.replace('\'', "''"),
            quote_ident(&pk_column),
            quote_ident(table)
        );
        self.client.execute(sql.as_str(), &[]).await?;
        debug!(table, sequence = %sequence, "Realigned sequence");
        Ok(())
    }
}

/// Render a multi-row insert that skips conflicting rows.
fn insert_statement(table: &str, batch: &RowBatch) -> String {
    let columns = batch
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let values = batch
        .rows
        .iter()
        .map(|row| {
            let rendered: Vec<String> = row.iter().map(|v| v.to_pg_literal()).collect();
            format!("({})", rendered.join(", "))
        })
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        "INSERT INTO {} ({}) VALUES\n{}\nON CONFLICT DO NOTHING",
        quote_ident(table),
        columns,
        values
    )
}
