//! Backend-agnostic storage of versioned dataset files.
//!
//! A [`StorageLocation`] addresses one directory-like container and hides whether
//! it lives in an object store (flat key namespace) or on a local filesystem.
//! The backend is chosen once, at construction, and never inferred per call from
//! the shape of a path value. All writes of dataset files are atomic from the
//! caller's perspective: either the full file becomes visible under its final
//! name, or nothing does.

use crate::storage::error::StoreError;
use bytes::Bytes;
use futures_util::TryStreamExt;
use log::debug;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutMode, PutOptions};
use polars::prelude::*;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::{fs, task};

/// Identifies one immutable, versioned file within a dataset family.
///
/// The rendered file name follows the fixed contract `{family}_v{N}.{ext}`,
/// where `N` is a decimal integer without leading zeros, starting at 1. Prior
/// and future runs interoperate through this name format, so it must not drift.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetFile {
    pub family: String,
    pub version: u32,
    pub extension: String,
}

impl DatasetFile {
    pub fn new(family: impl Into<String>, version: u32, extension: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            version,
            extension: extension.into(),
        }
    }

    /// Renders the file name, e.g. `observations_v7.parquet`.
    pub fn file_name(&self) -> String {
        format!("{}_v{}.{}", self.family, self.version, self.extension)
    }
}

/// An addressable container for dataset files, polymorphic over the two
/// supported backends.
///
/// Cloning is cheap; the object-store variant shares the underlying client.
///
/// # Examples
///
/// ```no_run
/// use frost_ingest::StorageLocation;
/// use object_store::memory::InMemory;
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), frost_ingest::StoreError> {
/// let in_memory = StorageLocation::object_store(Arc::new(InMemory::new()), "datasets/raw");
/// let on_disk = StorageLocation::local_file("/var/lib/frost/raw").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub enum StorageLocation {
    /// Flat key namespace; `root` is a key prefix. Writes are single-shot puts
    /// in create-only mode, which the store rejects atomically when the exact
    /// key already exists.
    ObjectStore {
        store: Arc<dyn ObjectStore>,
        root: ObjectPath,
    },
    /// Hierarchical filesystem directory. Writes go to a temporary file in the
    /// same directory followed by an atomic no-clobber rename into place.
    LocalFile { root: PathBuf },
}

impl StorageLocation {
    /// Creates a location backed by an object store under the given key prefix.
    pub fn object_store(store: Arc<dyn ObjectStore>, root: impl Into<ObjectPath>) -> Self {
        Self::ObjectStore {
            store,
            root: root.into(),
        }
    }

    /// Creates a location backed by a local directory, creating the directory
    /// if it does not exist.
    pub async fn local_file(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        match fs::metadata(&root).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Err(StoreError::RootNotADirectory(root)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                fs::create_dir_all(&root)
                    .await
                    .map_err(|e| StoreError::RootCreation(root.clone(), e))?;
            }
            Err(e) => return Err(StoreError::RootCreation(root, e)),
        }
        Ok(Self::LocalFile { root })
    }

    /// Lists the names of files directly under this location whose names start
    /// with `prefix`. Files in nested directories (or keys with further `/`
    /// segments) are excluded, and the order is unspecified.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        match self {
            Self::ObjectStore { store, root } => {
                let mut names = Vec::new();
                let mut stream = store.list(Some(root));
                while let Some(meta) = stream.try_next().await.map_err(|e| StoreError::Object {
                    name: root.to_string(),
                    source: e,
                })? {
                    let Some(mut parts) = meta.location.prefix_match(root) else {
                        continue;
                    };
                    let Some(first) = parts.next() else { continue };
                    // A remaining part after the first means a nested key.
                    if parts.next().is_some() {
                        continue;
                    }
                    let name = first.as_ref().to_string();
                    if name.starts_with(prefix) {
                        names.push(name);
                    }
                }
                Ok(names)
            }
            Self::LocalFile { root } => {
                let mut names = Vec::new();
                let mut entries = fs::read_dir(root)
                    .await
                    .map_err(|e| StoreError::Io(root.clone(), e))?;
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| StoreError::Io(root.clone(), e))?
                {
                    let file_type = entry
                        .file_type()
                        .await
                        .map_err(|e| StoreError::Io(entry.path(), e))?;
                    if !file_type.is_file() {
                        continue;
                    }
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if name.starts_with(prefix) {
                        names.push(name);
                    }
                }
                Ok(names)
            }
        }
    }

    /// Returns whether the given dataset file exists at this location.
    pub async fn exists(&self, file: &DatasetFile) -> Result<bool, StoreError> {
        let name = file.file_name();
        match self {
            Self::ObjectStore { store, root } => match store.head(&root.child(name.as_str())).await
            {
                Ok(_) => Ok(true),
                Err(object_store::Error::NotFound { .. }) => Ok(false),
                Err(e) => Err(StoreError::Object { name, source: e }),
            },
            Self::LocalFile { root } => match fs::metadata(root.join(&name)).await {
                Ok(metadata) => Ok(metadata.is_file()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(StoreError::Io(root.join(&name), e)),
            },
        }
    }

    /// Reads the raw bytes of a dataset file.
    pub async fn read_bytes(&self, file: &DatasetFile) -> Result<Bytes, StoreError> {
        self.read_named(&file.file_name()).await
    }

    /// Writes a new dataset file atomically. Fails with
    /// [`StoreError::NamingConflict`] if the exact name is already taken; an
    /// existing version is never overwritten.
    pub async fn write_new(&self, file: &DatasetFile, content: Bytes) -> Result<(), StoreError> {
        let name = file.file_name();
        match self {
            Self::ObjectStore { store, root } => {
                let options = PutOptions::from(PutMode::Create);
                match store
                    .put_opts(&root.child(name.as_str()), content, options)
                    .await
                {
                    Ok(_) => {
                        debug!("wrote object '{}' under '{}'", name, root);
                        Ok(())
                    }
                    Err(object_store::Error::AlreadyExists { .. }) => {
                        Err(StoreError::NamingConflict(name))
                    }
                    Err(e) => Err(StoreError::Object { name, source: e }),
                }
            }
            Self::LocalFile { root } => {
                let root = root.clone();
                task::spawn_blocking(move || {
                    let target = root.join(&name);
                    let mut temp = NamedTempFile::new_in(&root)
                        .map_err(|e| StoreError::Io(root.clone(), e))?;
                    temp.write_all(&content)
                        .and_then(|_| temp.flush())
                        .and_then(|_| temp.as_file().sync_all())
                        .map_err(|e| StoreError::Io(target.clone(), e))?;
                    match temp.persist_noclobber(&target) {
                        Ok(_) => {
                            debug!("wrote file {:?}", target);
                            Ok(())
                        }
                        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                            Err(StoreError::NamingConflict(name))
                        }
                        Err(e) => Err(StoreError::Io(target, e.error)),
                    }
                })
                .await?
            }
        }
    }

    /// Reads an arbitrarily named file at this location.
    pub(crate) async fn read_named(&self, name: &str) -> Result<Bytes, StoreError> {
        match self {
            Self::ObjectStore { store, root } => {
                let result = match store.get(&root.child(name)).await {
                    Ok(result) => result,
                    Err(object_store::Error::NotFound { .. }) => {
                        return Err(StoreError::NotFound(name.to_string()))
                    }
                    Err(e) => {
                        return Err(StoreError::Object {
                            name: name.to_string(),
                            source: e,
                        })
                    }
                };
                result.bytes().await.map_err(|e| StoreError::Object {
                    name: name.to_string(),
                    source: e,
                })
            }
            Self::LocalFile { root } => {
                let path = root.join(name);
                match fs::read(&path).await {
                    Ok(bytes) => Ok(Bytes::from(bytes)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        Err(StoreError::NotFound(name.to_string()))
                    }
                    Err(e) => Err(StoreError::Io(path, e)),
                }
            }
        }
    }

    /// Reads a named file, mapping a missing file to `None`.
    pub(crate) async fn read_optional(&self, name: &str) -> Result<Option<Bytes>, StoreError> {
        match self.read_named(name).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Atomically replaces (or creates) a named file. Reserved for mutable
    /// bookkeeping such as the processed-marker index; dataset files go through
    /// [`Self::write_new`] and are never replaced.
    pub(crate) async fn write_replace(&self, name: &str, content: Bytes) -> Result<(), StoreError> {
        match self {
            Self::ObjectStore { store, root } => {
                store
                    .put(&root.child(name), content)
                    .await
                    .map_err(|e| StoreError::Object {
                        name: name.to_string(),
                        source: e,
                    })?;
                Ok(())
            }
            Self::LocalFile { root } => {
                let root = root.clone();
                let name = name.to_string();
                task::spawn_blocking(move || {
                    let target = root.join(&name);
                    let mut temp = NamedTempFile::new_in(&root)
                        .map_err(|e| StoreError::Io(root.clone(), e))?;
                    temp.write_all(&content)
                        .and_then(|_| temp.flush())
                        .and_then(|_| temp.as_file().sync_all())
                        .map_err(|e| StoreError::Io(target.clone(), e))?;
                    temp.persist(&target)
                        .map_err(|e| StoreError::Io(target, e.error))?;
                    Ok(())
                })
                .await?
            }
        }
    }

    /// Reads a dataset file and decodes it as a parquet table.
    pub async fn read_table(&self, file: &DatasetFile) -> Result<DataFrame, StoreError> {
        let name = file.file_name();
        let bytes = self.read_bytes(file).await?;
        task::spawn_blocking(move || {
            ParquetReader::new(Cursor::new(bytes))
                .finish()
                .map_err(|e| StoreError::ParquetDecode(name, e))
        })
        .await?
    }

    /// Encodes a table as parquet and writes it as a new dataset file, with the
    /// same atomicity and no-clobber guarantees as [`Self::write_new`].
    pub async fn write_table(&self, file: &DatasetFile, frame: DataFrame) -> Result<(), StoreError> {
        let name = file.file_name();
        let bytes = task::spawn_blocking(move || {
            let mut frame = frame;
            let mut buffer = Vec::new();
            ParquetWriter::new(&mut buffer)
                .with_compression(ParquetCompression::Snappy)
                .finish(&mut frame)
                .map_err(|e| StoreError::ParquetEncode(name, e))?;
            Ok::<_, StoreError>(Bytes::from(buffer))
        })
        .await??;
        self.write_new(file, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use tempfile::tempdir;

    fn memory_location() -> StorageLocation {
        StorageLocation::object_store(Arc::new(InMemory::new()), "datasets/raw")
    }

    #[tokio::test]
    async fn round_trips_bytes_on_both_backends() -> Result<(), StoreError> {
        let dir = tempdir().unwrap();
        let locations = [
            memory_location(),
            StorageLocation::local_file(dir.path().join("raw")).await?,
        ];
        let file = DatasetFile::new("observations", 1, "parquet");

        for location in &locations {
            assert!(!location.exists(&file).await?);
            location
                .write_new(&file, Bytes::from_static(b"payload"))
                .await?;
            assert!(location.exists(&file).await?);
            assert_eq!(location.read_bytes(&file).await?.as_ref(), b"payload");
        }
        Ok(())
    }

    #[tokio::test]
    async fn observation_tables_survive_parquet_through_storage() -> Result<(), StoreError> {
        use crate::observations::{frame_to_observations, observations_to_frame, Observation};
        use chrono::{NaiveDate, NaiveTime};

        let day = |d: u32| {
            NaiveDate::from_ymd_opt(2024, 3, d)
                .unwrap()
                .and_time(NaiveTime::MIN)
                .and_utc()
        };
        let records = vec![
            Observation {
                source_id: "SN18700".to_string(),
                element_id: "mean(air_temperature P1D)".to_string(),
                observation_time: day(1),
                value: -2.4,
                unit: "degC".to_string(),
            },
            Observation {
                source_id: "SN50540".to_string(),
                element_id: "sum(precipitation_amount P1D)".to_string(),
                observation_time: day(2),
                value: 11.0,
                unit: "mm".to_string(),
            },
        ];
        let frame = observations_to_frame(&records)
            .map_err(|e| StoreError::ParquetEncode("observations_v1.parquet".to_string(), e))?;

        let dir = tempdir().unwrap();
        let locations = [
            memory_location(),
            StorageLocation::local_file(dir.path()).await?,
        ];
        let file = DatasetFile::new("observations", 1, "parquet");

        for location in &locations {
            location.write_table(&file, frame.clone()).await?;
            let read = location.read_table(&file).await?;
            assert_eq!(frame_to_observations(&read).unwrap(), records);
        }
        Ok(())
    }

    #[tokio::test]
    async fn rejects_writes_to_an_existing_name() -> Result<(), StoreError> {
        let dir = tempdir().unwrap();
        let locations = [
            memory_location(),
            StorageLocation::local_file(dir.path()).await?,
        ];
        let file = DatasetFile::new("observations", 3, "parquet");

        for location in &locations {
            location
                .write_new(&file, Bytes::from_static(b"first"))
                .await?;
            let err = location
                .write_new(&file, Bytes::from_static(b"second"))
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::NamingConflict(ref name) if name == "observations_v3.parquet"));
            // The original content is untouched.
            assert_eq!(location.read_bytes(&file).await?.as_ref(), b"first");
        }
        Ok(())
    }

    #[tokio::test]
    async fn list_excludes_nested_keys() -> Result<(), StoreError> {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let location = StorageLocation::object_store(store.clone(), "raw");
        store
            .put(&ObjectPath::from("raw/observations_v1.parquet"), Bytes::new())
            .await
            .unwrap();
        store
            .put(
                &ObjectPath::from("raw/archive/observations_v9.parquet"),
                Bytes::new(),
            )
            .await
            .unwrap();

        let names = location.list("observations").await?;
        assert_eq!(names, vec!["observations_v1.parquet".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn list_excludes_subdirectories_on_local_backend() -> Result<(), StoreError> {
        let dir = tempdir().unwrap();
        let location = StorageLocation::local_file(dir.path()).await?;
        location
            .write_new(
                &DatasetFile::new("observations", 1, "parquet"),
                Bytes::new(),
            )
            .await?;
        std::fs::create_dir(dir.path().join("observations_nested")).unwrap();
        std::fs::write(
            dir.path().join("observations_nested").join("x.parquet"),
            b"",
        )
        .unwrap();

        let names = location.list("observations").await?;
        assert_eq!(names, vec!["observations_v1.parquet".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn list_filters_by_prefix() -> Result<(), StoreError> {
        let location = memory_location();
        location
            .write_new(
                &DatasetFile::new("observations", 1, "parquet"),
                Bytes::new(),
            )
            .await?;
        location
            .write_new(
                &DatasetFile::new("weather_stations", 1, "json"),
                Bytes::new(),
            )
            .await?;

        let names = location.list("weather_stations").await?;
        assert_eq!(names, vec!["weather_stations_v1.json".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn write_replace_overwrites_and_read_optional_handles_missing(
    ) -> Result<(), StoreError> {
        let dir = tempdir().unwrap();
        let locations = [
            memory_location(),
            StorageLocation::local_file(dir.path()).await?,
        ];

        for location in &locations {
            assert!(location.read_optional("index.json").await?.is_none());
            location
                .write_replace("index.json", Bytes::from_static(b"{}"))
                .await?;
            location
                .write_replace("index.json", Bytes::from_static(b"{\"1\":true}"))
                .await?;
            assert_eq!(
                location.read_optional("index.json").await?.unwrap().as_ref(),
                b"{\"1\":true}"
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn local_root_is_created_when_missing() -> Result<(), StoreError> {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let location = StorageLocation::local_file(&nested).await?;
        assert!(nested.is_dir());
        assert!(location.list("observations").await?.is_empty());
        Ok(())
    }
}
