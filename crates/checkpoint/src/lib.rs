//! Checkpoint management for search-sync
//!
//! Provides storage-agnostic handling of per-source resume positions.
//!
//! # Architecture
//!
//! This crate provides a generic checkpoint system that:
//! - Defines the [`Checkpoint`] position record carried by every change event
//! - Defines the [`CheckpointStore`] trait keyed by source identity
//! - Supports multiple storage backends
//!
//! ## Storage Backends
//!
//! - `FilesystemStore` - Stores checkpoints as JSON files, one per source
//! - `MemoryStore` - In-process store for tests and ephemeral runs
//!
//! The engine treats the checkpoint payload as opaque. Each connector decides
//! what the payload means (a line offset, a sequence id, a resume token) and
//! is the only party that ever interprets it.

mod filesystem;
mod memory;
pub mod store;


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Re-export store trait and types
pub use store::{CheckpointStore, StoredCheckpoint};

// Re-export storage implementations
pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;

/// A resume position in a source's change stream.
///
/// The payload is an opaque string owned by the connector that produced it.
/// A checkpoint persisted for a source means: every event at or before this
/// position has been applied to every index routed from that source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Connector-defined position (e.g. a line offset or resume token)
    pub payload: String,
    /// When this position was produced
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            updated_at: Utc::now(),
        }
    }

    /// Convert to CLI-friendly string format.
    ///
    /// Used for command-line arguments and logging output. The returned
    /// string is parseable by [`Checkpoint::from_cli_string`].
    pub fn to_cli_string(&self) -> String {
        self.payload.clone()
    }

    /// Parse from CLI string format.
    pub fn from_cli_string(s: &str) -> anyhow::Result<Self> {
        if s.trim().is_empty() {
            anyhow::bail!("Empty checkpoint string");
        }
        Ok(Self::new(s.trim()))
    }
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.payload)
    }
}
