//! Configuration loading and validation.
//!
//! The configuration is constructed once at process start (from a YAML file
//! or directly by the caller) and passed into every component that needs it.

mod validation;

pub use validation::validate;

use crate::engine::MigrationOptions;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MySQL).
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

impl Config {
    /// Load and validate configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        validate(&config)?;
        Ok(config)
    }
}

/// Source database (MySQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per batch (default: 10000).
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Number of parallel workers (default: 4).
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Whether to migrate batches in parallel (default: false).
    #[serde(default)]
    pub parallel: bool,

    /// Identifier column used for delta sync (default: "id").
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            workers: default_workers(),
            parallel: false,
            id_column: default_id_column(),
        }
    }
}

impl MigrationConfig {
    /// Per-run options derived from this configuration.
    pub fn options(&self) -> MigrationOptions {
        MigrationOptions {
            batch_size: self.batch_size,
            workers: self.workers,
            parallel: self.parallel,
        }
    }
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_pg_port() -> u16 {
    5432
}

fn default_batch_size() -> u64 {
    10_000
}

fn default_workers() -> usize {
    4
}

fn default_id_column() -> String {
    "id".to_string()
}
