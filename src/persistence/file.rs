//! JSON File Checkpoints
//!
//! Snapshots are saved to `{root}/{foundry_key}_{workflow_key}.json` after
//! each step completion. Writes go to a temporary file first and are renamed
//! into place, so a crash mid-write never leaves a truncated checkpoint.
//! Snapshots holding NaN or infinite floats are refused, since JSON would
//! store them as `null` and the file could not be loaded back.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::info;
use tokio::fs;

use crate::error::{ForgeError, Result};

use super::{PersistenceKey, PersistenceProvider, Snapshot};

/// Stores one pretty-printed JSON snapshot per key pair under a directory.
#[derive(Debug, Clone)]
pub struct JsonFileProvider {
    root: PathBuf,
}

impl JsonFileProvider {
    /// Creates a provider rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the snapshot file path for a key pair.
    pub fn snapshot_path(&self, foundry_key: &PersistenceKey, workflow_key: &PersistenceKey) -> PathBuf {
        self.root
            .join(format!("{}_{}.json", foundry_key, workflow_key))
    }
}

#[async_trait]
impl PersistenceProvider for JsonFileProvider {
    async fn save(
        &self,
        foundry_key: &PersistenceKey,
        workflow_key: &PersistenceKey,
        snapshot: &Snapshot,
    ) -> Result<()> {
        if let Some(key) = snapshot.non_finite_property() {
            return Err(ForgeError::persistence(
                None,
                format!("property '{}' holds a non-finite float and cannot be checkpointed", key),
            ));
        }

        fs::create_dir_all(&self.root).await?;

        let path = self.snapshot_path(foundry_key, workflow_key);
        let staging = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(snapshot)?;

        fs::write(&staging, json).await?;
        fs::rename(&staging, &path).await?;

        info!("Saved workflow state to {}", path.display());
        Ok(())
    }

    async fn load(
        &self,
        foundry_key: &PersistenceKey,
        workflow_key: &PersistenceKey,
    ) -> Result<Option<Snapshot>> {
        let path = self.snapshot_path(foundry_key, workflow_key);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: Snapshot = serde_json::from_str(&content).map_err(|e| {
            ForgeError::persistence(None, format!("corrupt checkpoint {}: {}", path.display(), e))
        })?;

        info!("Loaded workflow state from {}", path.display());
        Ok(Some(snapshot))
    }

    async fn delete(&self, foundry_key: &PersistenceKey, workflow_key: &PersistenceKey) -> Result<()> {
        let path = self.snapshot_path(foundry_key, workflow_key);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted state file: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
