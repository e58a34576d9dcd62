//! Connector registry backed by pre-built fakes.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use sync_core::{Destination, DestinationId, Source, SourceId, SyncError};

use crate::connect::Connectors;
use crate::sink::IndexSink;
use crate::source::ChangeSource;

/// Resolves sources and destinations to instances registered up front.
///
/// Repeated resolution of the same id returns the same instance, so a
/// restarted pipeline keeps talking to the same scripted fake.
#[derive(Default)]
pub struct StaticConnectors {
    sources: HashMap<SourceId, Arc<dyn ChangeSource>>,
    sinks: HashMap<DestinationId, Arc<dyn IndexSink>>,
}

impl StaticConnectors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(
        mut self,
        id: impl Into<SourceId>,
        source: Arc<dyn ChangeSource>,
    ) -> Self {
        self.sources.insert(id.into(), source);
        self
    }

    pub fn with_sink(mut self, id: impl Into<DestinationId>, sink: Arc<dyn IndexSink>) -> Self {
        self.sinks.insert(id.into(), sink);
        self
    }
}

#[async_trait]
impl Connectors for StaticConnectors {
    async fn change_source(&self, source: &Source) -> Result<Arc<dyn ChangeSource>> {
        self.sources.get(&source.id).cloned().ok_or_else(|| {
            anyhow::Error::new(SyncError::configuration(format!(
                "no registered change source for '{}'",
                source.id
            )))
        })
    }

    async fn index_sink(&self, destination: &Destination) -> Result<Arc<dyn IndexSink>> {
        self.sinks.get(&destination.id).cloned().ok_or_else(|| {
            anyhow::Error::new(SyncError::configuration(format!(
                "no registered index sink for '{}'",
                destination.id
            )))
        })
    }
}
