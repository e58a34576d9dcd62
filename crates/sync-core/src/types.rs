//! Configured sync topology: sources, destinations and the mappings
//! binding them together.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::event::Document;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(
    /// Identity of an upstream data source.
    SourceId
);
id_type!(
    /// Identity of a search index destination.
    DestinationId
);
id_type!(
    /// Identity of a table-to-index mapping.
    MappingId
);

/// An upstream data store instrumented for change capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    /// Human-readable name used in logs
    pub label: String,
    /// Connector kind, e.g. "jsonl". Resolved once when the source's
    /// pipeline is built, never per event.
    pub kind: String,
    /// Connector-specific connection parameters
    #[serde(default)]
    pub connection: Document,
}

/// A search index target plus its batching policy.
///
/// With neither `batch_size` nor `batch_interval` set, events routed to this
/// destination are written one by one as they arrive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub id: DestinationId,
    pub label: String,
    /// Sink-specific connection parameters
    #[serde(default)]
    pub connection: Document,
    /// Flush a mapping's pending events once this many have accumulated
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// Flush a mapping's pending events at this fixed period
    #[serde(default, with = "crate::duration::option")]
    pub batch_interval: Option<Duration>,
}

impl Destination {
    /// Whether events for this destination are buffered at all.
    pub fn batches(&self) -> bool {
        self.batch_size.is_some() || self.batch_interval.is_some()
    }
}

fn default_primary_key() -> String {
    "id".to_string()
}

fn default_true() -> bool {
    true
}

/// The binding of one source table to one destination index.
///
/// Unique per (destination, source, table); enforced when configuration is
/// validated, before any pipeline starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mapping {
    pub id: MappingId,
    pub label: String,
    pub source_id: SourceId,
    pub destination_id: DestinationId,
    /// Source table to capture changes from
    pub table: String,
    /// Destination index to write documents into
    pub index: String,
    /// Field identifying a document; upserts and deletes key on it
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// Copy all existing rows before live tailing starts on first run
    #[serde(default = "default_true")]
    pub full_sync: bool,
    /// Optional projection; the primary key is always retained
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    /// Disabled mappings leave the routing table on the next restart
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Mapping {
    /// Project a payload down to the configured field list.
    ///
    /// Without a field list the payload passes through unchanged. The
    /// primary key field is always retained.
    pub fn project(&self, payload: &Document) -> Document {
        let Some(fields) = &self.fields else {
            return payload.clone();
        };

        let mut doc = Document::new();
        if let Some(pk) = payload.get(&self.primary_key) {
            doc.insert(self.primary_key.clone(), pk.clone());
        }
        for field in fields {
            if field == &self.primary_key {
                continue;
            }
            if let Some(value) = payload.get(field) {
                doc.insert(field.clone(), value.clone());
            }
        }
        doc
    }

    /// Extract the primary key of a payload as a string, if present and
    /// representable (strings and numbers are; null/objects/arrays are not).
    pub fn primary_key_value(&self, payload: &Document) -> Option<String> {
        match payload.get(&self.primary_key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
