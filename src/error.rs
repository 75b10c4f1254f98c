use std::path::PathBuf;
use thiserror::Error;

/// Failures that can cross the pipeline boundary.
///
/// Missing or unparseable *values* never show up here; they are coerced to
/// `None` at load time. The one genuine fault is a required source file
/// being absent, which makes the fact table impossible to build at all.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("required source table `{table}` not found at {}", .path.display())]
    MissingSource { table: &'static str, path: PathBuf },

    #[error("cache artifact mismatch: {0}")]
    Cache(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
