//! In-memory fake index sink.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use sync_core::{ChangeEvent, Document, EventKind, Mapping, MappingBatch, SyncError};

use crate::sink::IndexSink;

/// One recorded sink invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    FullData { index: String, rows: usize },
    One { index: String, key: String },
    Batch { index: String, events: usize },
    DeleteAll { index: String },
}

#[derive(Default)]
struct SinkState {
    indexes: HashMap<String, BTreeMap<String, Document>>,
    calls: Vec<SinkCall>,
}

/// An index sink keyed on each mapping's primary key, with a call log and
/// injectable write failures.
#[derive(Default)]
pub struct FakeIndexSink {
    state: Mutex<SinkState>,
    fail_writes: AtomicBool,
}

impl FakeIndexSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create an index so a cold start skips its backfill.
    pub fn create_index(&self, index: impl Into<String>) {
        let mut state = self.state.lock().expect("sink lock poisoned");
        state.indexes.entry(index.into()).or_default();
    }

    /// When set, every write operation fails with a write error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Documents currently in an index (empty if the index is absent).
    pub fn documents(&self, index: &str) -> BTreeMap<String, Document> {
        let state = self.state.lock().expect("sink lock poisoned");
        state.indexes.get(index).cloned().unwrap_or_default()
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<SinkCall> {
        self.state.lock().expect("sink lock poisoned").calls.clone()
    }

    /// Calls that touched one index, in order.
    pub fn calls_for(&self, index: &str) -> Vec<SinkCall> {
        self.calls()
            .into_iter()
            .filter(|call| match call {
                SinkCall::FullData { index: i, .. }
                | SinkCall::One { index: i, .. }
                | SinkCall::Batch { index: i, .. }
                | SinkCall::DeleteAll { index: i } => i == index,
            })
            .collect()
    }

    fn check_failure(&self, index: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(SyncError::write(index, "injected write failure").into())
        } else {
            Ok(())
        }
    }

    fn key_of(mapping: &Mapping, event: &ChangeEvent) -> Result<String> {
        mapping.primary_key_value(&event.payload).ok_or_else(|| {
            anyhow::Error::new(SyncError::write(
                mapping.index.clone(),
                format!(
                    "event payload has no usable primary key field '{}'",
                    mapping.primary_key
                ),
            ))
        })
    }

    fn apply_event(
        documents: &mut BTreeMap<String, Document>,
        mapping: &Mapping,
        event: &ChangeEvent,
    ) -> Result<()> {
        let key = Self::key_of(mapping, event)?;
        match event.kind {
            EventKind::Create | EventKind::Update => {
                documents.insert(key, mapping.project(&event.payload));
            }
            EventKind::Delete => {
                documents.remove(&key);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl IndexSink for FakeIndexSink {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        let state = self.state.lock().expect("sink lock poisoned");
        Ok(state.indexes.contains_key(index))
    }

    async fn apply_full_data(&self, mapping: &Mapping, rows: &[Document]) -> Result<usize> {
        let mut state = self.state.lock().expect("sink lock poisoned");
        state.calls.push(SinkCall::FullData {
            index: mapping.index.clone(),
            rows: rows.len(),
        });
        self.check_failure(&mapping.index)?;
        let documents = state.indexes.entry(mapping.index.clone()).or_default();
        for row in rows {
            let key = mapping.primary_key_value(row).ok_or_else(|| {
                anyhow::Error::new(SyncError::write(
                    mapping.index.clone(),
                    format!(
                        "row has no usable primary key field '{}'",
                        mapping.primary_key
                    ),
                ))
            })?;
            documents.insert(key, mapping.project(row));
        }
        Ok(rows.len())
    }

    async fn apply_one(&self, mapping: &Mapping, event: &ChangeEvent) -> Result<()> {
        let key = Self::key_of(mapping, event)?;
        let mut state = self.state.lock().expect("sink lock poisoned");
        state.calls.push(SinkCall::One {
            index: mapping.index.clone(),
            key,
        });
        self.check_failure(&mapping.index)?;
        let documents = state.indexes.entry(mapping.index.clone()).or_default();
        Self::apply_event(documents, mapping, event)
    }

    async fn apply_batch(&self, batches: &[MappingBatch]) -> Result<()> {
        for batch in batches {
            let mut state = self.state.lock().expect("sink lock poisoned");
            state.calls.push(SinkCall::Batch {
                index: batch.mapping.index.clone(),
                events: batch.events.len(),
            });
            self.check_failure(&batch.mapping.index)?;
            let documents = state.indexes.entry(batch.mapping.index.clone()).or_default();
            for event in &batch.events {
                Self::apply_event(documents, &batch.mapping, event)?;
            }
        }
        Ok(())
    }

    async fn count(&self, index: &str) -> Result<u64> {
        let state = self.state.lock().expect("sink lock poisoned");
        Ok(state
            .indexes
            .get(index)
            .map(|documents| documents.len())
            .unwrap_or(0) as u64)
    }

    async fn delete_all_documents(&self, index: &str) -> Result<()> {
        let mut state = self.state.lock().expect("sink lock poisoned");
        state.calls.push(SinkCall::DeleteAll {
            index: index.to_string(),
        });
        state.indexes.insert(index.to_string(), BTreeMap::new());
        Ok(())
    }
}
