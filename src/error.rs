//! Error taxonomy for the build core.
//!
//! Extraction and validation fail on the first violation and never return
//! partial results. Reconciliation failures roll the whole batch back.
//! Integrity failures carry the specific column, constraint or mismatch
//! sample that tripped the check.

use thiserror::Error;

/// The script literal is missing or malformed.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("assignment for '{0}' not found in source")]
    IdentifierNotFound(String),

    #[error("unterminated string literal while scanning '{0}'")]
    UnterminatedString(String),

    #[error("unbalanced braces while scanning '{0}'")]
    UnbalancedObject(String),

    #[error("failed to parse '{identifier}' as a data document: {source}")]
    Parse {
        identifier: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A record fails structural expectations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("row has insufficient cells: {found} (expected at least {expected})")]
    InsufficientCells { found: usize, expected: usize },

    #[error("field '{0}' is required but was empty")]
    EmptyField(&'static str),

    #[error("invalid level cell: '{0}'")]
    InvalidLevel(String),

    #[error("all charts are absent: {title} / {artist}")]
    NoCharts { title: String, artist: String },

    #[error("malformed entry '{key}': {reason}")]
    MalformedEntry { key: String, reason: String },

    #[error("source id '{0}' appears more than once in the batch")]
    DuplicateSourceId(String),
}

/// A constraint violation or storage failure while applying a batch.
#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] ValidationError),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

/// A post-build structural or stability check failed.
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error("column not found: {table}.{column}")]
    MissingColumn { table: String, column: String },

    #[error("{table}.{column} must be NOT NULL")]
    NullableColumn { table: String, column: String },

    #[error("{table} is missing a UNIQUE constraint on ({columns})")]
    MissingUniqueConstraint { table: String, columns: String },

    #[error("{table} is missing index '{index}'")]
    MissingIndex { table: String, index: String },

    #[error("{table}.{column} contains {count} NULL values")]
    NullValues {
        table: String,
        column: String,
        count: i64,
    },

    #[error("schema version mismatch: expected {expected}, found {}", found.as_deref().unwrap_or("<none>"))]
    SchemaVersionMismatch {
        expected: String,
        found: Option<String>,
    },

    #[error("chart id changed for {count} chart(s): {sample}")]
    ChartIdMismatch { count: usize, sample: String },

    #[error("{count} chart(s) from the baseline are missing in the new build: {sample}")]
    MissingInNew { count: usize, sample: String },

    #[error("manifest {field} mismatch: expected {expected}, actual {actual}")]
    ManifestMismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest is not valid JSON: {0}")]
    ManifestFormat(#[from] serde_json::Error),
}
