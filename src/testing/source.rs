//! Scripted in-memory change source.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use checkpoint::Checkpoint;
use sync_core::{ChangeEvent, Document, EventKind, SourceEvent};
use tokio::sync::Notify;

use crate::source::{ChangeSource, ChangeStream, FullScanPages};

#[derive(Default)]
struct Script {
    events: Vec<SourceEvent>,
    closed: bool,
}

#[derive(Default)]
struct ScriptInner {
    state: Mutex<Script>,
    wakeup: Notify,
}

/// A change source fed by the test itself.
///
/// Events pushed onto the script get consecutive positions "1", "2", ...
/// A stream opened with a resume position skips every event at or before
/// it, so restarts replay exactly what a real connector would replay.
#[derive(Default)]
pub struct ScriptedChangeSource {
    tables: Mutex<HashMap<String, Vec<Document>>>,
    script: Arc<ScriptInner>,
}

impl ScriptedChangeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed full-scan rows for a table.
    pub fn insert_rows(&self, table: impl Into<String>, rows: Vec<Document>) {
        self.tables
            .lock()
            .expect("tables lock poisoned")
            .insert(table.into(), rows);
    }

    /// Append a change event to the script. Returns its position.
    pub fn push_change(
        &self,
        table: impl Into<String>,
        kind: EventKind,
        payload: Document,
    ) -> Checkpoint {
        let mut state = self.script.state.lock().expect("script lock poisoned");
        let position = Checkpoint::new((state.events.len() + 1).to_string());
        state.events.push(SourceEvent::Change(ChangeEvent::new(
            table,
            kind,
            payload,
            position.clone(),
        )));
        drop(state);
        self.script.wakeup.notify_waiters();
        position
    }

    /// Append a heartbeat carrying only a position.
    pub fn push_heartbeat(&self) -> Checkpoint {
        let mut state = self.script.state.lock().expect("script lock poisoned");
        let position = Checkpoint::new((state.events.len() + 1).to_string());
        state
            .events
            .push(SourceEvent::Heartbeat(position.clone()));
        drop(state);
        self.script.wakeup.notify_waiters();
        position
    }

    /// End the script: open streams return None once they have drained.
    pub fn close(&self) {
        self.script
            .state
            .lock()
            .expect("script lock poisoned")
            .closed = true;
        self.script.wakeup.notify_waiters();
    }
}

#[async_trait]
impl ChangeSource for ScriptedChangeSource {
    fn source_type(&self) -> &'static str {
        "scripted"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn current_position(&self) -> Result<Checkpoint> {
        let state = self.script.state.lock().expect("script lock poisoned");
        Ok(Checkpoint::new(state.events.len().to_string()))
    }

    async fn row_count(&self, table: &str) -> Result<u64> {
        let tables = self.tables.lock().expect("tables lock poisoned");
        Ok(tables.get(table).map(|rows| rows.len()).unwrap_or(0) as u64)
    }

    async fn full_scan(&self, table: &str, page_size: usize) -> Result<Box<dyn FullScanPages>> {
        let rows = {
            let tables = self.tables.lock().expect("tables lock poisoned");
            tables.get(table).cloned().unwrap_or_default()
        };
        Ok(Box::new(ScriptedPages {
            rows: rows.into_iter(),
            page_size: page_size.max(1),
        }))
    }

    async fn changes(
        &self,
        resume: Option<Checkpoint>,
        _tables: &[String],
    ) -> Result<Box<dyn ChangeStream>> {
        let next_index = match &resume {
            Some(checkpoint) => checkpoint.payload.parse::<usize>()?,
            None => 0,
        };
        Ok(Box::new(ScriptedStream {
            script: self.script.clone(),
            next_index,
        }))
    }
}

struct ScriptedPages {
    rows: std::vec::IntoIter<Document>,
    page_size: usize,
}

#[async_trait]
impl FullScanPages for ScriptedPages {
    async fn next_page(&mut self) -> Result<Option<Vec<Document>>> {
        let page: Vec<Document> = self.rows.by_ref().take(self.page_size).collect();
        if page.is_empty() {
            Ok(None)
        } else {
            Ok(Some(page))
        }
    }
}

struct ScriptedStream {
    script: Arc<ScriptInner>,
    next_index: usize,
}

#[async_trait]
impl ChangeStream for ScriptedStream {
    async fn next(&mut self) -> Option<Result<SourceEvent>> {
        loop {
            let pending = self.script.wakeup.notified();
            {
                let state = self.script.state.lock().expect("script lock poisoned");
                if self.next_index < state.events.len() {
                    let event = state.events[self.next_index].clone();
                    self.next_index += 1;
                    return Some(Ok(event));
                }
                if state.closed {
                    return None;
                }
            }
            pending.await;
        }
    }
}
