//! Disk-backed file sink

use crate::storage::{validate_segment, FileSink, StorageError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Writes uploads as files directly under `root`
#[derive(Debug, Clone)]
pub struct DiskFileSink {
    root: PathBuf,
}

impl DiskFileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The upload directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl FileSink for DiskFileSink {
    async fn write(&self, name: &str, content: &[u8]) -> Result<(), StorageError> {
        validate_segment(name)?;

        // The directory may be removed while running, so create it on every write.
        tokio::fs::create_dir_all(&self.root).await?;

        let path = self.root.join(name);
        debug!(path = %path.display(), bytes = content.len(), "Writing upload");
        tokio::fs::write(&path, content).await?;

        info!(file = name, bytes = content.len(), "Upload saved");
        Ok(())
    }
}
