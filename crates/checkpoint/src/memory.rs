//! In-memory checkpoint storage implementation.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::store::CheckpointStore;
use crate::Checkpoint;

/// In-process implementation of CheckpointStore.
///
/// Used by tests and by ephemeral runs that do not need positions to survive
/// a process restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a checkpoint, e.g. to simulate a warm start.
    pub fn seed(&self, source_id: impl Into<String>, checkpoint: Checkpoint) {
        self.inner
            .lock()
            .expect("checkpoint map lock poisoned")
            .insert(source_id.into(), checkpoint);
    }

    /// Synchronous read, for assertions in non-async contexts.
    pub fn peek(&self, source_id: &str) -> Option<Checkpoint> {
        self.inner
            .lock()
            .expect("checkpoint map lock poisoned")
            .get(source_id)
            .cloned()
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn get(&self, source_id: &str) -> Result<Option<Checkpoint>> {
        let map = self.inner.lock().expect("checkpoint map lock poisoned");
        Ok(map.get(source_id).cloned())
    }

    async fn set(&self, source_id: &str, checkpoint: &Checkpoint) -> Result<()> {
        let mut map = self.inner.lock().expect("checkpoint map lock poisoned");
        map.insert(source_id.to_string(), checkpoint.clone());
        Ok(())
    }
}
