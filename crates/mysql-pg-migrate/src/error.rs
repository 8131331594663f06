//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
///
/// Only [`MigrateError::Connection`] is fatal to an enclosing run. Every
/// other failure is handled at the smallest applicable granularity: a table
/// is skipped, an index is skipped, or a batch is dropped from the success
/// count, and processing continues.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cannot establish a source or target connection. Fatal.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Source database query error
    #[error("Source database error: {0}")]
    Source(#[from] mysql_async::Error),

    /// Target database query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// A table's metadata cannot be turned into a valid creation plan
    #[error("Schema translation failed for table {table}: {message}")]
    SchemaTranslation { table: String, message: String },

    /// One index statement failed; the table and other indexes are unaffected
    #[error("Index creation failed for {index}: {message}")]
    IndexCreation { index: String, message: String },

    /// One page or id-chunk failed to load
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// Sequence realignment failed for one table
    #[error("Sequence realignment failed for table {table}: {message}")]
    SequenceRealign { table: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a SchemaTranslation error.
    pub fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::SchemaTranslation {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Transfer error.
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a SequenceRealign error.
    pub fn realign(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::SequenceRealign {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
