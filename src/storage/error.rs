use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the storage backends and everything layered on top of them
/// (version resolution, table encoding, the processed-marker index).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create storage root {0:?}")]
    RootCreation(PathBuf, #[source] std::io::Error),

    #[error("storage root {0:?} exists but is not a directory")]
    RootNotADirectory(PathBuf),

    #[error("i/o error for {0:?}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("object store operation failed for '{name}'")]
    Object {
        name: String,
        #[source]
        source: object_store::Error,
    },

    #[error("no file named '{0}' exists at this location")]
    NotFound(String),

    // A version number, once written, is never reused. Raised by the backend's
    // reject-existing-name write, not by a separate pre-check.
    #[error("a file named '{0}' already exists")]
    NamingConflict(String),

    #[error("failed to encode parquet for '{0}'")]
    ParquetEncode(String, #[source] PolarsError),

    #[error("failed to decode parquet from '{0}'")]
    ParquetDecode(String, #[source] PolarsError),

    #[error("failed to read column '{column}' of table '{name}'")]
    Column {
        name: String,
        column: String,
        #[source]
        source: PolarsError,
    },

    #[error("failed to decode processed-marker index '{0}'")]
    MarkerDecode(String, #[source] serde_json::Error),

    #[error("failed to encode processed-marker index '{0}'")]
    MarkerEncode(String, #[source] serde_json::Error),

    #[error("background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
