//! Change events produced by change capture.

use checkpoint::Checkpoint;
use serde::{Deserialize, Serialize};

use crate::types::Mapping;

/// A JSON document: one row/record payload, or one indexed document.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// The kind of data change an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Create,
    Update,
    Delete,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One data change captured from a source table.
///
/// `position` is the resume point valid immediately after applying this
/// event: a stream restarted from it replays nothing at or before this
/// event and everything after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Source table the change happened in
    pub table: String,
    /// Create, update or delete
    pub kind: EventKind,
    /// The changed row; for deletes, at least the primary key field
    pub payload: Document,
    /// Resume point after this event
    pub position: Checkpoint,
}

impl ChangeEvent {
    pub fn new(
        table: impl Into<String>,
        kind: EventKind,
        payload: Document,
        position: Checkpoint,
    ) -> Self {
        Self {
            table: table.into(),
            kind,
            payload,
            position,
        }
    }
}

/// An item emitted by a change stream.
///
/// Streams interleave data changes with control events that carry only a
/// position (e.g. a heartbeat while the source is quiet). Control events let
/// the checkpoint advance without any data to apply.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    Change(ChangeEvent),
    Heartbeat(Checkpoint),
}

impl SourceEvent {
    /// The resume point valid after processing this event.
    pub fn position(&self) -> &Checkpoint {
        match self {
            SourceEvent::Change(event) => &event.position,
            SourceEvent::Heartbeat(position) => position,
        }
    }
}

/// A group of events flushed together for one mapping.
#[derive(Debug, Clone)]
pub struct MappingBatch {
    pub mapping: Mapping,
    pub events: Vec<ChangeEvent>,
}

impl MappingBatch {
    pub fn new(mapping: Mapping, events: Vec<ChangeEvent>) -> Self {
        Self { mapping, events }
    }
}
