//! Checkpoint storage trait and types
//!
//! This module defines the CheckpointStore trait for backend-agnostic
//! checkpoint storage operations, plus the stored envelope type.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Checkpoint;

/// Checkpoint data as stored in a backend.
///
/// Carries the owning source id alongside the position so a backend record
/// can be validated against the key it was looked up under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCheckpoint {
    /// Source identity this checkpoint belongs to
    pub source_id: String,
    /// Opaque connector-defined position
    pub payload: String,
    /// When the position was produced
    pub updated_at: DateTime<Utc>,
}

impl StoredCheckpoint {
    pub fn new(source_id: impl Into<String>, checkpoint: &Checkpoint) -> Self {
        Self {
            source_id: source_id.into(),
            payload: checkpoint.payload.clone(),
            updated_at: checkpoint.updated_at,
        }
    }

    pub fn into_checkpoint(self) -> Checkpoint {
        Checkpoint {
            payload: self.payload,
            updated_at: self.updated_at,
        }
    }
}

/// Trait for checkpoint storage operations.
///
/// Exactly one record exists per source. The runner that owns a source is the
/// only writer of its record while running; stores only need to be safe for
/// concurrent use under *distinct* keys.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read the checkpoint for a source.
    ///
    /// Returns None if no checkpoint has ever been persisted for it.
    async fn get(&self, source_id: &str) -> Result<Option<Checkpoint>>;

    /// Persist the checkpoint for a source, replacing any previous record.
    async fn set(&self, source_id: &str, checkpoint: &Checkpoint) -> Result<()>;
}
