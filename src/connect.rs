//! Connector resolution.
//!
//! Maps a configured source or destination onto a live [`ChangeSource`] or
//! [`IndexSink`] instance. Resolution happens once, when a source's pipeline
//! is built; the selected connector then handles every event for that
//! pipeline's lifetime.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use sync_core::{Destination, Source, SyncError};

use crate::jsonl::{FileIndexSink, JsonlChangeSource};
use crate::sink::IndexSink;
use crate::source::ChangeSource;

/// Factory for change sources and index sinks.
///
/// The engine never constructs connectors directly; tests substitute an
/// implementation returning scripted fakes, the CLI uses
/// [`BuiltinConnectors`].
#[async_trait]
pub trait Connectors: Send + Sync {
    /// Build the change source for a configured source.
    async fn change_source(&self, source: &Source) -> Result<Arc<dyn ChangeSource>>;

    /// Build the index sink for a configured destination.
    async fn index_sink(&self, destination: &Destination) -> Result<Arc<dyn IndexSink>>;
}

/// The connector kinds compiled into the binary.
///
/// Currently: `jsonl` sources (seed tables plus an appended change feed) and
/// `file` destinations (one JSON document map per index).
#[derive(Default)]
pub struct BuiltinConnectors;

impl BuiltinConnectors {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connectors for BuiltinConnectors {
    async fn change_source(&self, source: &Source) -> Result<Arc<dyn ChangeSource>> {
        match source.kind.as_str() {
            "jsonl" => {
                let connector = JsonlChangeSource::from_connection(&source.connection)?;
                Ok(Arc::new(connector))
            }
            other => Err(SyncError::configuration(format!(
                "unknown source kind '{}' for source '{}'",
                other, source.id
            ))
            .into()),
        }
    }

    async fn index_sink(&self, destination: &Destination) -> Result<Arc<dyn IndexSink>> {
        let kind = destination
            .connection
            .get("kind")
            .and_then(|v| v.as_str())
            .unwrap_or("file");
        match kind {
            "file" => {
                let sink = FileIndexSink::from_connection(&destination.connection)?;
                Ok(Arc::new(sink))
            }
            other => Err(SyncError::configuration(format!(
                "unknown destination kind '{}' for destination '{}'",
                other, destination.id
            ))
            .into()),
        }
    }
}
