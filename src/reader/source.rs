//! Access to staged files.
//!
//! [`StagedFileSource`] is the seam to whatever storage the staging location
//! lives on. [`LocalStagedFiles`] serves a staging root that is mounted on the
//! local filesystem, which is also what the tests use.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use flate2::read::MultiGzDecoder;
use tokio::io::AsyncBufRead;
use tracing::debug;

use crate::error::{ConnectorError, Result};
use crate::export::staging::StagingLocation;

/// Reader over the decompressed text of one staged file.
pub type PartitionInput = Box<dyn AsyncBufRead + Unpin + Send>;

/// One staged file, read as an independent partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedPartition {
    pub index: usize,
    pub uri: String,
    pub size: u64,
}

impl StagedPartition {
    pub fn is_compressed(&self) -> bool {
        self.uri.ends_with(".gz")
    }
}

/// Lists and opens the files an unload wrote into a staging location.
#[async_trait]
pub trait StagedFileSource: Send + Sync {
    /// All staged files below `location`, in a stable order.
    async fn list_partitions(&self, location: &StagingLocation) -> Result<Vec<StagedPartition>>;

    /// Opens one partition for reading; compressed objects are decompressed.
    async fn open(&self, partition: &StagedPartition) -> Result<PartitionInput>;
}

/// Staged files on a local (or locally mounted) filesystem.
///
/// URIs below `root_uri` map onto paths below `root_dir`, so
/// `s3://bucket/tmp/<key>/data_0_0_0.csv.gz` with root `s3://bucket/tmp` is
/// read from `<root_dir>/<key>/data_0_0_0.csv.gz`.
#[derive(Debug, Clone)]
pub struct LocalStagedFiles {
    root_uri: String,
    root_dir: PathBuf,
}

impl LocalStagedFiles {
    pub fn new(root_uri: impl Into<String>, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_uri: root_uri.into().trim_end_matches('/').to_string(),
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Maps a staging URI onto a local path.
    ///
    /// # Errors
    /// `ConnectorError::Staging` if the URI is not below the root URI or tries
    /// to escape the root directory.
    pub fn resolve(&self, uri: &str) -> Result<PathBuf> {
        let relative = uri
            .strip_prefix(&self.root_uri)
            .ok_or_else(|| {
                ConnectorError::staging(format!(
                    "URI {uri} is not below staging root {}",
                    self.root_uri
                ))
            })?
            .trim_matches('/');

        let mut path = self.root_dir.clone();
        for segment in relative.split('/').filter(|s| !s.is_empty()) {
            if segment == ".." || segment == "." {
                return Err(ConnectorError::staging(format!(
                    "URI {uri} contains a relative path segment"
                )));
            }
            path.push(segment);
        }
        Ok(path)
    }
}

#[async_trait]
impl StagedFileSource for LocalStagedFiles {
    async fn list_partitions(&self, location: &StagingLocation) -> Result<Vec<StagedPartition>> {
        let dir = self.resolve(&location.uri)?;
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| {
            ConnectorError::staging(format!("cannot list {}: {e}", location.uri))
        })?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            files.push((name, metadata.len()));
        }
        files.sort();

        let base = location.uri.trim_end_matches('/');
        let partitions: Vec<StagedPartition> = files
            .into_iter()
            .enumerate()
            .map(|(index, (name, size))| StagedPartition {
                index,
                uri: format!("{base}/{name}"),
                size,
            })
            .collect();

        debug!(
            location = %location.uri,
            partitions = partitions.len(),
            "Listed staged files"
        );
        Ok(partitions)
    }

    async fn open(&self, partition: &StagedPartition) -> Result<PartitionInput> {
        let path = self.resolve(&partition.uri)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            ConnectorError::staging(format!("cannot read {}: {e}", partition.uri))
        })?;

        let data = if partition.is_compressed() {
            let mut decompressed = Vec::new();
            MultiGzDecoder::new(bytes.as_slice())
                .read_to_end(&mut decompressed)
                .map_err(|e| {
                    ConnectorError::staging(format!(
                        "cannot decompress {}: {e}",
                        partition.uri
                    ))
                })?;
            decompressed
        } else {
            bytes
        };

        Ok(Box::new(Cursor::new(data)))
    }
}
