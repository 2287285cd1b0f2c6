//! In-memory checkpoint provider.

use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;

use crate::error::Result;

use super::{PersistenceKey, PersistenceProvider, Snapshot};

/// Keeps snapshots in a concurrent map for the lifetime of the process.
///
/// Useful for tests and for runs that only need to survive a retry, not a
/// restart.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    snapshots: DashMap<(PersistenceKey, PersistenceKey), Snapshot>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[async_trait]
impl PersistenceProvider for InMemoryProvider {
    async fn save(
        &self,
        foundry_key: &PersistenceKey,
        workflow_key: &PersistenceKey,
        snapshot: &Snapshot,
    ) -> Result<()> {
        self.snapshots
            .insert((foundry_key.clone(), workflow_key.clone()), snapshot.clone());
        debug!("Stored checkpoint {}/{} in memory", foundry_key, workflow_key);
        Ok(())
    }

    async fn load(
        &self,
        foundry_key: &PersistenceKey,
        workflow_key: &PersistenceKey,
    ) -> Result<Option<Snapshot>> {
        Ok(self
            .snapshots
            .get(&(foundry_key.clone(), workflow_key.clone()))
            .map(|entry| entry.value().clone()))
    }

    async fn delete(&self, foundry_key: &PersistenceKey, workflow_key: &PersistenceKey) -> Result<()> {
        self.snapshots
            .remove(&(foundry_key.clone(), workflow_key.clone()));
        Ok(())
    }
}
