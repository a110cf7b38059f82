//! Incremental collection of weather observations into versioned files.
//!
//! `frost_ingest` pulls daily observations from the MET Norway Frost API,
//! station by station, and writes each batch as an immutable parquet file named
//! `{family}_v{N}.parquet` at a storage location. Files are never rewritten:
//! new data always lands in a new version, and the next run resumes from the
//! newest timestamp found in the latest version. A location is either an
//! object-store prefix or a local directory, chosen when it is constructed.
//!
//! # Example
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use frost_ingest::{
//!     FrostClient, IngestConfig, Ingestor, ObservationSchema, StorageLocation,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ingestor = Ingestor::builder()
//!         .location(StorageLocation::local_file("./datasets").await?)
//!         .source(FrostClient::builder().build()?)
//!         .validator(ObservationSchema)
//!         .config(
//!             IngestConfig::builder()
//!                 .stations(vec!["SN18700".to_string()])
//!                 .collect_from_date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())
//!                 .build(),
//!         )
//!         .build();
//!
//!     let summary = ingestor.run().await;
//!     println!("{} stations collected", summary.collected_count());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod ingest;
pub mod observations;
pub mod source;
pub mod storage;
pub mod validate;
pub mod window;

pub use config::IngestConfig;
pub use error::IngestError;
pub use ingest::{Ingestor, RunSummary, SkipReason, StationOutcome, StationStatus};
pub use observations::{
    frame_to_observations, observations_to_frame, Observation, WeatherStation,
};
pub use source::error::FetchError;
pub use source::frost::{FrostClient, DAILY_ELEMENTS};
pub use source::ObservationSource;
pub use storage::error::StoreError;
pub use storage::location::{DatasetFile, StorageLocation};
pub use storage::tracker::ProcessedFileTracker;
pub use storage::versions::{existing_versions, highest_version, next_version, parse_version};
pub use validate::{ObservationSchema, TableValidator, ValidationError};
pub use window::{checkpoint, collection_window, CollectionWindow, WindowStart};
