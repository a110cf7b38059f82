//! Incremental collection windows derived from what is already stored.
//!
//! The checkpoint for a family is the maximum observation timestamp in its
//! latest version file. It is re-derived from storage on every call rather than
//! cached, so the stored files stay the single source of truth and deleting the
//! latest version naturally rewinds collection.

use crate::observations::{datetime_from_units, OBSERVATION_TIME};
use crate::storage::error::StoreError;
use crate::storage::location::{DatasetFile, StorageLocation};
use crate::storage::versions::highest_version;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use log::info;
use polars::prelude::*;

/// Lower bound of a collection window, distinguishing a resume point (data up
/// to and including the instant exists) from a configured first start
/// (nothing collected yet, start inclusively here).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStart {
    /// Resume strictly after this instant.
    After(DateTime<Utc>),
    /// First collection, from this instant inclusive.
    From(DateTime<Utc>),
}

impl WindowStart {
    pub fn instant(&self) -> DateTime<Utc> {
        match self {
            Self::After(t) | Self::From(t) => *t,
        }
    }
}

/// A half-open span of time still to be collected for one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionWindow {
    pub start: WindowStart,
    /// Exclusive upper bound.
    pub end: DateTime<Utc>,
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Reads the checkpoint of a family: the maximum observation timestamp in its
/// latest version file, or `None` when the family has no files yet or its
/// latest file has no rows.
pub async fn checkpoint(
    location: &StorageLocation,
    family: &str,
    extension: &str,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    let Some(version) = highest_version(location, family, extension).await? else {
        return Ok(None);
    };
    let file = DatasetFile::new(family, version, extension);
    let frame = location.read_table(&file).await?;
    let column = frame
        .column(OBSERVATION_TIME)
        .and_then(|c| c.datetime())
        .map_err(|e| StoreError::Column {
            name: file.file_name(),
            column: OBSERVATION_TIME.to_string(),
            source: e,
        })?;
    Ok(column
        .max()
        .and_then(|raw| datetime_from_units(raw, column.time_unit())))
}

/// Computes the window a collection run should cover for one family.
///
/// The window starts after the family's checkpoint when one exists, otherwise
/// from `configured_start`. It ends at `configured_end` (exclusive) when set,
/// otherwise at today's UTC midnight. Returns `None` when the stored data
/// already reaches the end, in which case there is nothing to collect.
pub async fn collection_window(
    location: &StorageLocation,
    family: &str,
    extension: &str,
    configured_start: NaiveDate,
    configured_end: Option<NaiveDate>,
) -> Result<Option<CollectionWindow>, StoreError> {
    let end = match configured_end {
        Some(date) => midnight(date),
        None => midnight(Utc::now().date_naive()),
    };
    let start = match checkpoint(location, family, extension).await? {
        Some(instant) => {
            info!("family '{family}' has data through {instant}");
            WindowStart::After(instant)
        }
        None => WindowStart::From(midnight(configured_start)),
    };
    if start.instant() >= end {
        return Ok(None);
    }
    Ok(Some(CollectionWindow { start, end }))
}
