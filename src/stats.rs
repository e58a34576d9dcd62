//! Durable emission of sync statistics.
//!
//! Each runner counts applied events per (mapping, kind) and periodically
//! drains the counters into a [`StatsStore`]. Counter reset happens under
//! the runner's lock; the durable write happens after release, so a crash
//! between the two can lose at most one interval of counts.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sync_core::{EventKind, MappingId};

/// One drained counter: how many events of one kind a mapping applied over
/// one stats interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatEntry {
    pub mapping_id: MappingId,
    pub kind: EventKind,
    pub count: u64,
    pub recorded_at: DateTime<Utc>,
}

impl StatEntry {
    pub fn new(mapping_id: MappingId, kind: EventKind, count: u64) -> Self {
        Self {
            mapping_id,
            kind,
            count,
            recorded_at: Utc::now(),
        }
    }
}

/// Durable backend for drained stat counters.
#[async_trait]
pub trait StatsStore: Send + Sync {
    /// Persist a set of drained counters. Entries from one drain share a
    /// timestamp but are otherwise independent records.
    async fn record(&self, entries: &[StatEntry]) -> Result<()>;
}

/// Appends stat entries to a JSON Lines file, one record per line.
pub struct JsonlStatsStore {
    path: PathBuf,
}

impl JsonlStatsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl StatsStore for JsonlStatsStore {
    async fn record(&self, entries: &[StatEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut lines = String::new();
        for entry in entries {
            lines.push_str(&serde_json::to_string(entry)?);
            lines.push('\n');
        }

        use std::io::Write as _;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open stats log {}", self.path.display()))?;
        file.write_all(lines.as_bytes())?;
        Ok(())
    }
}

/// Keeps recorded entries in memory; the test backend.
#[derive(Default)]
pub struct MemoryStatsStore {
    entries: Mutex<Vec<StatEntry>>,
}

impl MemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<StatEntry> {
        self.entries.lock().expect("stats lock poisoned").clone()
    }
}

#[async_trait]
impl StatsStore for MemoryStatsStore {
    async fn record(&self, entries: &[StatEntry]) -> Result<()> {
        self.entries
            .lock()
            .expect("stats lock poisoned")
            .extend_from_slice(entries);
        Ok(())
    }
}

/// Emits entries to the log only. The fallback when no stats path is
/// configured.
#[derive(Default)]
pub struct LogStatsStore;

#[async_trait]
impl StatsStore for LogStatsStore {
    async fn record(&self, entries: &[StatEntry]) -> Result<()> {
        for entry in entries {
            tracing::info!(
                mapping = %entry.mapping_id,
                kind = %entry.kind,
                count = entry.count,
                "sync stats",
            );
        }
        Ok(())
    }
}
