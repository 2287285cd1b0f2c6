//! Checkpoint Persistence
//!
//! Provides checkpoint storage for workflow runs, enabling resume after
//! interruption. A [`Snapshot`] is written after every successful step and
//! after every failed attempt, and read once at the start of a recovery run.
//!
//! - [`memory`]: In-process provider backed by a concurrent map
//! - [`file`]: One JSON file per (foundry, workflow) key pair

pub mod file;
pub mod memory;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::error::{ForgeError, Result};
use crate::execution::StepTracker;
use crate::foundry::{DataValue, Foundry};

pub use file::JsonFileProvider;
pub use memory::InMemoryProvider;

/// Number of digest bytes kept in a key.
const KEY_BYTES: usize = 16;

/// Stable fixed-width identifier derived from a caller-supplied name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PersistenceKey(String);

impl PersistenceKey {
    /// Hashes `name` into a 32-character hex key.
    pub fn derive(name: &str) -> Self {
        let digest = Sha256::digest(name.as_bytes());
        Self(hex::encode(&digest[..KEY_BYTES]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersistenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted progress of one workflow run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub foundry_key: PersistenceKey,
    pub workflow_key: PersistenceKey,

    /// Completed step names, in completion order
    pub completed_steps: Vec<String>,

    /// Property bag contents at the time of the checkpoint
    pub properties: BTreeMap<String, DataValue>,

    /// Last time the snapshot was written
    pub saved_at: DateTime<Utc>,
}

impl Snapshot {
    /// Creates an empty snapshot for a key pair.
    pub fn new(foundry_key: PersistenceKey, workflow_key: PersistenceKey) -> Self {
        Self {
            foundry_key,
            workflow_key,
            completed_steps: Vec::new(),
            properties: BTreeMap::new(),
            saved_at: Utc::now(),
        }
    }

    /// Captures the foundry's current properties alongside `completed_steps`.
    pub fn capture(
        foundry_key: PersistenceKey,
        workflow_key: PersistenceKey,
        completed_steps: Vec<String>,
        foundry: &Foundry,
    ) -> Self {
        Self {
            completed_steps,
            properties: foundry.snapshot(),
            ..Self::new(foundry_key, workflow_key)
        }
    }

    /// Returns true if `name` was recorded as completed.
    pub fn is_completed(&self, name: &str) -> bool {
        self.completed_steps.iter().any(|step| step == name)
    }

    /// First property key whose value holds a NaN or infinite float.
    pub fn non_finite_property(&self) -> Option<&str> {
        self.properties
            .iter()
            .find(|(_, value)| !value.is_finite())
            .map(|(key, _)| key.as_str())
    }

    /// Returns true if this snapshot carries progress worth resuming.
    pub fn is_resume(&self) -> bool {
        !self.completed_steps.is_empty()
    }
}

/// Checkpoint store keyed by a (foundry, workflow) key pair.
///
/// Only the sequential top-level path of a run touches the provider.
#[async_trait]
pub trait PersistenceProvider: Send + Sync {
    /// Stores `snapshot`, replacing any previous one for the pair.
    async fn save(
        &self,
        foundry_key: &PersistenceKey,
        workflow_key: &PersistenceKey,
        snapshot: &Snapshot,
    ) -> Result<()>;

    /// Loads the snapshot for the pair, if one exists.
    async fn load(
        &self,
        foundry_key: &PersistenceKey,
        workflow_key: &PersistenceKey,
    ) -> Result<Option<Snapshot>>;

    /// Removes the snapshot for the pair. Missing snapshots are not an error.
    async fn delete(&self, foundry_key: &PersistenceKey, workflow_key: &PersistenceKey) -> Result<()>;
}

/// [`StepTracker`] that skips recorded steps and writes a snapshot after
/// every successful one. A failed attempt writes the bag too, with the
/// completed list unchanged, so its writes survive a restart.
pub struct CheckpointTracker<'a> {
    provider: &'a dyn PersistenceProvider,
    foundry_key: PersistenceKey,
    workflow_key: PersistenceKey,
    completed: Mutex<Vec<String>>,
    cancel: CancellationToken,
}

impl<'a> CheckpointTracker<'a> {
    /// Creates a tracker resuming from `snapshot`, if any.
    pub fn new(
        provider: &'a dyn PersistenceProvider,
        foundry_key: PersistenceKey,
        workflow_key: PersistenceKey,
        snapshot: Option<&Snapshot>,
        cancel: &CancellationToken,
    ) -> Self {
        let completed = snapshot
            .map(|s| s.completed_steps.clone())
            .unwrap_or_default();

        Self {
            provider,
            foundry_key,
            workflow_key,
            completed: Mutex::new(completed),
            cancel: cancel.clone(),
        }
    }

    /// Completed step names recorded so far, in order.
    pub fn completed_steps(&self) -> Vec<String> {
        self.completed
            .lock()
            .map(|steps| steps.clone())
            .unwrap_or_default()
    }

    fn recorded(&self, name: &str) -> Result<Vec<String>> {
        self.completed
            .lock()
            .map(|steps| steps.clone())
            .map_err(|_| ForgeError::persistence(Some(name), "checkpoint state poisoned"))
    }

    /// Saves the bag with `completed_steps`, unless `cancel` fires first.
    async fn checkpoint(
        &self,
        name: &str,
        completed_steps: Vec<String>,
        foundry: &Foundry,
    ) -> Result<()> {
        let snapshot = Snapshot::capture(
            self.foundry_key.clone(),
            self.workflow_key.clone(),
            completed_steps,
            foundry,
        );

        let saved = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ForgeError::canceled(name)),
            saved = self.provider.save(&self.foundry_key, &self.workflow_key, &snapshot) => saved,
        };

        saved.map_err(|e| match e {
            ForgeError::PersistenceFailure { message, .. } => ForgeError::persistence(Some(name), message),
            other => ForgeError::persistence(Some(name), other.to_string()),
        })
    }
}

#[async_trait]
impl StepTracker for CheckpointTracker<'_> {
    fn is_completed(&self, name: &str) -> bool {
        self.completed
            .lock()
            .map(|steps| steps.iter().any(|step| step == name))
            .unwrap_or(false)
    }

    async fn step_completed(&self, name: &str, foundry: &Foundry) -> Result<()> {
        let mut completed = self.recorded(name)?;
        completed.push(name.to_string());
        let done = completed.len();

        self.checkpoint(name, completed, foundry).await?;

        self.completed
            .lock()
            .map_err(|_| ForgeError::persistence(Some(name), "checkpoint state poisoned"))?
            .push(name.to_string());

        debug!(
            "Checkpointed '{}' for {}/{} ({} step(s) done)",
            name, self.foundry_key, self.workflow_key, done
        );
        Ok(())
    }

    async fn step_failed(&self, name: &str, foundry: &Foundry) -> Result<()> {
        let completed = self.recorded(name)?;
        self.checkpoint(name, completed, foundry).await?;

        debug!(
            "Checkpointed failed attempt of '{}' for {}/{}",
            name, self.foundry_key, self.workflow_key
        );
        Ok(())
    }

    fn compensates(&self) -> bool {
        false
    }
}

/// Loads a snapshot unless `cancel` fires first.
pub async fn load_snapshot(
    provider: &dyn PersistenceProvider,
    foundry_key: &PersistenceKey,
    workflow_key: &PersistenceKey,
    cancel: &CancellationToken,
) -> Result<Option<Snapshot>> {
    let snapshot = tokio::select! {
        _ = cancel.cancelled() => return Err(ForgeError::canceled("load checkpoint")),
        loaded = provider.load(foundry_key, workflow_key) => loaded?,
    };

    if let Some(snapshot) = &snapshot {
        info!(
            "Loaded checkpoint for {}/{} saved at {}",
            foundry_key, workflow_key, snapshot.saved_at
        );
        info!("Previously completed: {:?}", snapshot.completed_steps);
    }
    Ok(snapshot)
}
