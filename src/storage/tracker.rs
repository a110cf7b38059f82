//! Tracks which version files of a family have been handed to downstream
//! processing.
//!
//! Markers live in a single JSON index next to the version files, named
//! `{family}_processed.json`, mapping version number to the instant it was
//! marked. The index is bookkeeping, not data, so it is the one file at a
//! location that gets replaced in place.

use crate::storage::error::StoreError;
use crate::storage::location::StorageLocation;
use crate::storage::versions::existing_versions;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::BTreeMap;

/// Per-family bookkeeping of downstream-processed versions.
///
/// Marking is idempotent and markers are independent of the files themselves:
/// marking a version never modifies it, and a version stays marked even if the
/// file is later removed.
#[derive(Debug, Clone)]
pub struct ProcessedFileTracker {
    location: StorageLocation,
    family: String,
    extension: String,
}

impl ProcessedFileTracker {
    pub fn new(
        location: StorageLocation,
        family: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            location,
            family: family.into(),
            extension: extension.into(),
        }
    }

    fn index_name(&self) -> String {
        format!("{}_processed.json", self.family)
    }

    async fn load(&self) -> Result<BTreeMap<u32, DateTime<Utc>>, StoreError> {
        match self.location.read_optional(&self.index_name()).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::MarkerDecode(self.index_name(), e)),
            None => Ok(BTreeMap::new()),
        }
    }

    async fn store(&self, index: &BTreeMap<u32, DateTime<Utc>>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(index)
            .map_err(|e| StoreError::MarkerEncode(self.index_name(), e))?;
        self.location
            .write_replace(&self.index_name(), Bytes::from(bytes))
            .await
    }

    /// Lists the versions present in storage that have no marker yet, in
    /// ascending order.
    pub async fn unprocessed(&self) -> Result<Vec<u32>, StoreError> {
        let index = self.load().await?;
        let versions = existing_versions(&self.location, &self.family, &self.extension).await?;
        Ok(versions
            .into_iter()
            .filter(|version| !index.contains_key(version))
            .collect())
    }

    /// Marks a version as processed. Repeated calls keep the original marker
    /// timestamp.
    pub async fn mark_processed(&self, version: u32) -> Result<(), StoreError> {
        let mut index = self.load().await?;
        if index.contains_key(&version) {
            debug!("version {} of '{}' already marked", version, self.family);
            return Ok(());
        }
        index.insert(version, Utc::now());
        self.store(&index).await
    }

    /// Returns when a version was marked, or `None` if it never was.
    pub async fn processed_at(&self, version: u32) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.load().await?.get(&version).copied())
    }
}
