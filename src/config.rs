//! Run configuration for a collection pipeline.

use bon::bon;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

fn default_family_prefix() -> String {
    "observations".to_string()
}

fn default_file_extension() -> String {
    "parquet".to_string()
}

fn default_station_directory_family() -> String {
    "weather_stations".to_string()
}

fn default_retry_backoff_secs() -> u64 {
    2
}

/// What to collect and where the collection starts.
///
/// Deserializable from a config file, or built in code:
///
/// ```
/// use chrono::NaiveDate;
/// use frost_ingest::IngestConfig;
///
/// let config = IngestConfig::builder()
///     .stations(vec!["SN18700".to_string()])
///     .collect_from_date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap())
///     .build();
/// assert_eq!(config.family_for("SN18700"), "observations_SN18700");
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Stations to collect, by Frost source id.
    pub stations: Vec<String>,
    /// First day of interest for stations with no stored data yet.
    pub collect_from_date: NaiveDate,
    /// Exclusive last day; today when unset.
    #[serde(default)]
    pub collect_to_date: Option<NaiveDate>,
    #[serde(default = "default_family_prefix")]
    pub family_prefix: String,
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
    #[serde(default = "default_station_directory_family")]
    pub station_directory_family: String,
    /// Pause before the single retry of a transient fetch failure.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
}

#[bon]
impl IngestConfig {
    #[builder]
    pub fn new(
        stations: Vec<String>,
        collect_from_date: NaiveDate,
        collect_to_date: Option<NaiveDate>,
        family_prefix: Option<String>,
        file_extension: Option<String>,
        station_directory_family: Option<String>,
        retry_backoff_secs: Option<u64>,
    ) -> Self {
        Self {
            stations,
            collect_from_date,
            collect_to_date,
            family_prefix: family_prefix.unwrap_or_else(default_family_prefix),
            file_extension: file_extension.unwrap_or_else(default_file_extension),
            station_directory_family: station_directory_family
                .unwrap_or_else(default_station_directory_family),
            retry_backoff_secs: retry_backoff_secs.unwrap_or_else(default_retry_backoff_secs),
        }
    }
}

impl IngestConfig {
    /// The dataset family holding one station's observations. Families are
    /// per-station so version numbering for one station is unaffected by the
    /// others.
    pub fn family_for(&self, station: &str) -> String {
        format!("{}_{station}", self.family_prefix)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}
