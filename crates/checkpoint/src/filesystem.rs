//! Filesystem-based checkpoint storage implementation.

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;

use crate::store::{CheckpointStore, StoredCheckpoint};
use crate::Checkpoint;

/// Filesystem implementation of CheckpointStore.
///
/// Stores one JSON file per source in a directory. Source ids are used
/// verbatim in file names and must be filesystem-safe.
pub struct FilesystemStore {
    dir: PathBuf,
}

impl FilesystemStore {
    /// Create a new FilesystemStore with the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the directory path.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn path_for(&self, source_id: &str) -> PathBuf {
        self.dir.join(format!("checkpoint_{source_id}.json"))
    }
}

#[async_trait]
impl CheckpointStore for FilesystemStore {
    async fn get(&self, source_id: &str) -> Result<Option<Checkpoint>> {
        let path = self.path_for(source_id);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        let stored: StoredCheckpoint = serde_json::from_str(&content)?;
        if stored.source_id != source_id {
            anyhow::bail!(
                "Checkpoint source mismatch in {}: expected '{}', found '{}'",
                path.display(),
                source_id,
                stored.source_id
            );
        }
        Ok(Some(stored.into_checkpoint()))
    }

    async fn set(&self, source_id: &str, checkpoint: &Checkpoint) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let stored = StoredCheckpoint::new(source_id, checkpoint);
        let path = self.path_for(source_id);
        std::fs::write(&path, serde_json::to_string_pretty(&stored)?)?;
        tracing::debug!("Stored checkpoint for '{source_id}' to {}", path.display());
        Ok(())
    }
}
