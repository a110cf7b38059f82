//! Version numbering over the `{family}_v{N}.{ext}` file-name contract.
//!
//! Version numbers are allocated by listing what is present at a location, not
//! from any separate counter, so the stored files themselves are the source of
//! truth. Allocation is pure: asking for the next version never writes.

use crate::storage::error::StoreError;
use crate::storage::location::StorageLocation;
use log::warn;

/// Extracts the version number from a file name, given the family and
/// extension it should belong to.
///
/// Names that do not start with `{family}_v` belong to other families or to
/// bookkeeping files and are skipped without comment. Names that do carry the
/// family's version prefix but fail to parse (wrong extension, non-numeric,
/// leading zeros, version zero) are logged and skipped, never guessed at.
pub fn parse_version(name: &str, family: &str, extension: &str) -> Option<u32> {
    let rest = name
        .strip_prefix(family)
        .and_then(|rest| rest.strip_prefix("_v"))?;
    let Some(digits) = rest.strip_suffix(extension).and_then(|d| d.strip_suffix('.')) else {
        warn!("skipping '{name}': expected extension '.{extension}'");
        return None;
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        warn!("skipping '{name}': version is not a decimal integer");
        return None;
    }
    if digits.starts_with('0') {
        warn!("skipping '{name}': version has a leading zero");
        return None;
    }
    match digits.parse::<u32>() {
        Ok(version) => Some(version),
        Err(_) => {
            warn!("skipping '{name}': version out of range");
            None
        }
    }
}

/// Lists the version numbers present for a family, in ascending order.
pub async fn existing_versions(
    location: &StorageLocation,
    family: &str,
    extension: &str,
) -> Result<Vec<u32>, StoreError> {
    let prefix = format!("{family}_v");
    let mut versions: Vec<u32> = location
        .list(&prefix)
        .await?
        .iter()
        .filter_map(|name| parse_version(name, family, extension))
        .collect();
    versions.sort_unstable();
    versions.dedup();
    Ok(versions)
}

/// Returns the highest version present for a family, or `None` when the family
/// has no files yet.
pub async fn highest_version(
    location: &StorageLocation,
    family: &str,
    extension: &str,
) -> Result<Option<u32>, StoreError> {
    Ok(existing_versions(location, family, extension)
        .await?
        .last()
        .copied())
}

/// Returns the version number a new file for this family should take:
/// one past the highest existing version, or 1 when none exist. Gaps in the
/// stored sequence are preserved, not filled.
pub async fn next_version(
    location: &StorageLocation,
    family: &str,
    extension: &str,
) -> Result<u32, StoreError> {
    Ok(match highest_version(location, family, extension).await? {
        Some(highest) => highest + 1,
        None => 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::location::DatasetFile;
    use bytes::Bytes;
    use object_store::memory::InMemory;
    use std::sync::Arc;

    fn location() -> StorageLocation {
        StorageLocation::object_store(Arc::new(InMemory::new()), "raw")
    }

    #[test]
    fn parses_well_formed_names() {
        assert_eq!(
            parse_version("observations_v1.parquet", "observations", "parquet"),
            Some(1)
        );
        assert_eq!(
            parse_version("observations_v412.parquet", "observations", "parquet"),
            Some(412)
        );
    }

    #[test]
    fn skips_names_from_other_families() {
        assert_eq!(
            parse_version("weather_stations_v2.json", "observations", "parquet"),
            None
        );
        assert_eq!(
            parse_version("observations_processed.json", "observations", "parquet"),
            None
        );
        // A family that extends this one is not a match either.
        assert_eq!(
            parse_version(
                "observations_snow_v1.parquet",
                "observations",
                "parquet"
            ),
            None
        );
    }

    #[test]
    fn rejects_malformed_version_suffixes() {
        for name in [
            "observations_v.parquet",
            "observations_v01.parquet",
            "observations_v0.parquet",
            "observations_v1a.parquet",
            "observations_v-1.parquet",
            "observations_v1.csv",
            "observations_v1",
            "observations_v99999999999.parquet",
        ] {
            assert_eq!(parse_version(name, "observations", "parquet"), None, "{name}");
        }
    }

    #[tokio::test]
    async fn first_version_is_one() -> Result<(), StoreError> {
        let location = location();
        assert_eq!(highest_version(&location, "observations", "parquet").await?, None);
        assert_eq!(next_version(&location, "observations", "parquet").await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn versions_grow_past_the_highest_and_keep_gaps() -> Result<(), StoreError> {
        let location = location();
        for version in [1, 3, 7] {
            location
                .write_new(
                    &DatasetFile::new("observations", version, "parquet"),
                    Bytes::new(),
                )
                .await?;
        }
        assert_eq!(
            existing_versions(&location, "observations", "parquet").await?,
            vec![1, 3, 7]
        );
        assert_eq!(next_version(&location, "observations", "parquet").await?, 8);
        Ok(())
    }

    #[tokio::test]
    async fn allocation_is_pure() -> Result<(), StoreError> {
        let location = location();
        location
            .write_new(&DatasetFile::new("observations", 2, "parquet"), Bytes::new())
            .await?;
        for _ in 0..3 {
            assert_eq!(next_version(&location, "observations", "parquet").await?, 3);
        }
        Ok(())
    }

    #[tokio::test]
    async fn ignores_foreign_and_malformed_names_when_listing() -> Result<(), StoreError> {
        let location = location();
        for name in [
            "observations_v1.parquet",
            "observations_v2.parquet",
            "observations_vNaN.parquet",
            "observations_processed.json",
            "weather_stations_v9.json",
        ] {
            location.write_replace(name, Bytes::new()).await?;
        }
        assert_eq!(
            existing_versions(&location, "observations", "parquet").await?,
            vec![1, 2]
        );
        Ok(())
    }
}
