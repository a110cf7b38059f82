//! The collection run: fetch, validate, and version each station's new data.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::observations::{observations_to_frame, Observation, WeatherStation};
use crate::source::error::FetchError;
use crate::source::ObservationSource;
use crate::storage::location::{DatasetFile, StorageLocation};
use crate::storage::versions::{highest_version, next_version};
use crate::validate::TableValidator;
use crate::window::{collection_window, CollectionWindow};
use bon::bon;
use bytes::Bytes;
use log::{error, info, warn};
use tokio::time::sleep;

/// Why a station produced no new version despite a healthy run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Stored data already reaches the end of the configured range.
    EmptyWindow,
    /// The source had nothing inside the window.
    NoNewRecords,
}

/// What happened to one station during a run.
#[derive(Debug)]
pub enum StationStatus {
    Collected { version: u32, records: usize },
    Skipped(SkipReason),
    Failed(IngestError),
}

#[derive(Debug)]
pub struct StationOutcome {
    pub station: String,
    pub status: StationStatus,
}

/// Per-station outcomes of one run. A run never aborts on a station failure;
/// the failure lands here instead.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<StationOutcome>,
}

impl RunSummary {
    pub fn collected_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, StationStatus::Collected { .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, StationStatus::Skipped(_)))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, StationStatus::Failed(_)))
            .count()
    }
}

/// Drives incremental collection for a set of stations against one storage
/// location.
///
/// Stations are collected sequentially. Each station has its own dataset
/// family, so a run writes at most one new version per station and version
/// numbering never crosses stations.
pub struct Ingestor<S, V> {
    location: StorageLocation,
    source: S,
    validator: V,
    config: IngestConfig,
}

#[bon]
impl<S: ObservationSource, V: TableValidator> Ingestor<S, V> {
    #[builder]
    pub fn new(location: StorageLocation, source: S, validator: V, config: IngestConfig) -> Self {
        Self {
            location,
            source,
            validator,
            config,
        }
    }
}

impl<S: ObservationSource, V: TableValidator> Ingestor<S, V> {
    /// Runs one collection pass over every configured station.
    pub async fn run(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for station in &self.config.stations {
            let status = match self.collect_station(station).await {
                Ok(status) => status,
                Err(e) => {
                    error!("station {station} failed: {e}");
                    StationStatus::Failed(e)
                }
            };
            match &status {
                StationStatus::Collected { version, records } => {
                    info!("station {station}: wrote version {version} with {records} records")
                }
                StationStatus::Skipped(reason) => {
                    info!("station {station}: nothing to collect ({reason:?})")
                }
                StationStatus::Failed(_) => {}
            }
            summary.outcomes.push(StationOutcome {
                station: station.clone(),
                status,
            });
        }
        info!(
            "run finished: {} collected, {} skipped, {} failed",
            summary.collected_count(),
            summary.skipped_count(),
            summary.failed_count()
        );
        summary
    }

    async fn collect_station(&self, station: &str) -> Result<StationStatus, IngestError> {
        let family = self.config.family_for(station);
        let extension = &self.config.file_extension;

        let Some(window) = collection_window(
            &self.location,
            &family,
            extension,
            self.config.collect_from_date,
            self.config.collect_to_date,
        )
        .await?
        else {
            return Ok(StationStatus::Skipped(SkipReason::EmptyWindow));
        };

        let records = self.fetch_with_retry(station, &window).await?;
        if records.is_empty() {
            return Ok(StationStatus::Skipped(SkipReason::NoNewRecords));
        }

        let frame = observations_to_frame(&records).map_err(IngestError::Table)?;
        self.validator.validate(&frame)?;

        let version = next_version(&self.location, &family, extension).await?;
        let file = DatasetFile::new(family, version, extension.clone());
        self.location.write_table(&file, frame).await?;
        Ok(StationStatus::Collected {
            version,
            records: records.len(),
        })
    }

    /// One retry, and only for transient failures.
    async fn fetch_with_retry(
        &self,
        station: &str,
        window: &CollectionWindow,
    ) -> Result<Vec<Observation>, FetchError> {
        match self.source.fetch(station, window).await {
            Ok(records) => Ok(records),
            Err(e) if e.is_transient() => {
                warn!("station {station}: retrying after transient failure: {e}");
                sleep(self.config.retry_backoff()).await;
                self.source.fetch(station, window).await
            }
            Err(e) => Err(e),
        }
    }

    /// Publishes the station directory as a versioned JSON file, writing a new
    /// version only when its content differs from the latest stored one.
    /// Returns the version written, or `None` when the directory is unchanged.
    pub async fn refresh_station_directory(
        &self,
        stations: &[WeatherStation],
    ) -> Result<Option<u32>, IngestError> {
        let family = &self.config.station_directory_family;
        let encoded =
            Bytes::from(serde_json::to_vec_pretty(stations).map_err(IngestError::DirectoryEncode)?);

        if let Some(version) = highest_version(&self.location, family, "json").await? {
            let current = self
                .location
                .read_bytes(&DatasetFile::new(family.clone(), version, "json"))
                .await?;
            if current == encoded {
                info!("station directory unchanged at version {version}");
                return Ok(None);
            }
        }

        let version = next_version(&self.location, family, "json").await?;
        self.location
            .write_new(&DatasetFile::new(family.clone(), version, "json"), encoded)
            .await?;
        info!("station directory updated to version {version}");
        Ok(Some(version))
    }
}
