use std::path::PathBuf;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;

// ============================================================================
// Error Type
// ============================================================================

/// Every fatal condition of a pipeline run.
///
/// Empty derived tables are *not* errors; they are reported through
/// [`crate::pipeline::RunReport::empty_tables`].
#[derive(Debug, Error)]
pub enum EtlError {
    #[error("raw source `{source_name}` not found at {path}")]
    SourceMissing { source_name: String, path: PathBuf },

    #[error("schema mismatch in `{table}`, column `{column}`: {reason}")]
    SchemaMismatch {
        table: String,
        column: String,
        reason: String,
    },

    #[error("malformed row {line} in `{table}`: {reason}")]
    MalformedRow {
        table: String,
        line: u64,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read delimited source: {0}")]
    Csv(#[from] csv::Error),
}

impl EtlError {
    pub(crate) fn mismatch(
        table: impl Into<String>,
        column: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        EtlError::SchemaMismatch {
            table: table.into(),
            column: column.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
