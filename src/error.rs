//! The failure surface of a collection run.

use crate::source::error::FetchError;
use crate::storage::error::StoreError;
use crate::validate::ValidationError;
use polars::prelude::PolarsError;
use thiserror::Error;

/// Anything that can fail while collecting one station or publishing the
/// station directory. Per-station failures are carried in the run summary
/// rather than aborting the run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to build the observation table")]
    Table(#[source] PolarsError),

    #[error("failed to encode the station directory")]
    DirectoryEncode(#[source] serde_json::Error),
}
