//! Built-in JSONL connector pair.
//!
//! [`JsonlChangeSource`] captures changes from a directory of JSON Lines
//! files: seed rows under `tables/<table>.jsonl` and a change feed in
//! `changes.jsonl`, one event per line. The feed line offset is the
//! checkpoint payload, so resuming is skipping lines.
//!
//! [`FileIndexSink`] materializes each index as one JSON file mapping
//! primary keys to documents. Upserts and deletes key on the mapping's
//! primary key field, which makes replays converge.
//!
//! Both ends re-read their files per operation and are sized for demos,
//! tests and modest feeds rather than high-volume capture.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use checkpoint::Checkpoint;
use serde::Deserialize;
use sync_core::{ChangeEvent, Document, EventKind, Mapping, MappingBatch, SourceEvent, SyncError};

use crate::sink::IndexSink;
use crate::source::{ChangeSource, ChangeStream, FullScanPages};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// One line of the change feed file.
#[derive(Debug, Deserialize)]
struct FeedRecord {
    table: String,
    kind: EventKind,
    payload: Document,
}

/// Change capture over a directory of JSONL files.
pub struct JsonlChangeSource {
    dir: PathBuf,
    /// Keep polling the feed for appended lines; with `follow` off the
    /// stream ends at EOF and the pipeline completes.
    follow: bool,
}

impl JsonlChangeSource {
    pub fn new(dir: impl Into<PathBuf>, follow: bool) -> Self {
        Self {
            dir: dir.into(),
            follow,
        }
    }

    /// Build from connection parameters: `dir` (required), `follow`
    /// (optional, default true).
    pub fn from_connection(connection: &Document) -> Result<Self> {
        let dir = connection
            .get("dir")
            .and_then(|value| value.as_str())
            .ok_or_else(|| {
                anyhow::Error::new(SyncError::configuration(
                    "jsonl source requires a 'dir' connection parameter",
                ))
            })?;
        let follow = connection
            .get("follow")
            .and_then(|value| value.as_bool())
            .unwrap_or(true);
        Ok(Self::new(dir, follow))
    }

    fn feed_path(&self) -> PathBuf {
        self.dir.join("changes.jsonl")
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join("tables").join(format!("{table}.jsonl"))
    }

    fn read_table_rows(&self, table: &str) -> Result<Vec<Document>> {
        let path = self.table_path(table);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading table file {}", path.display()))?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str::<Document>(line)
                    .with_context(|| format!("malformed row in {}", path.display()))
            })
            .collect()
    }
}

fn read_feed_lines(path: &PathBuf) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading change feed {}", path.display()))?;
    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(String::from)
        .collect())
}

#[async_trait]
impl ChangeSource for JsonlChangeSource {
    fn source_type(&self) -> &'static str {
        "jsonl"
    }

    async fn ping(&self) -> Result<()> {
        if self.dir.is_dir() {
            Ok(())
        } else {
            Err(SyncError::connectivity(
                self.dir.display().to_string(),
                "directory does not exist",
            )
            .into())
        }
    }

    async fn current_position(&self) -> Result<Checkpoint> {
        let lines = read_feed_lines(&self.feed_path())?;
        Ok(Checkpoint::new(lines.len().to_string()))
    }

    async fn row_count(&self, table: &str) -> Result<u64> {
        Ok(self.read_table_rows(table)?.len() as u64)
    }

    async fn full_scan(&self, table: &str, page_size: usize) -> Result<Box<dyn FullScanPages>> {
        let rows = self.read_table_rows(table)?;
        Ok(Box::new(JsonlPages {
            rows: rows.into_iter(),
            page_size: page_size.max(1),
        }))
    }

    async fn changes(
        &self,
        resume: Option<Checkpoint>,
        _tables: &[String],
    ) -> Result<Box<dyn ChangeStream>> {
        // The feed carries every table; routing drops what nobody maps so
        // positions advance uniformly.
        let offset = match &resume {
            Some(checkpoint) => checkpoint
                .payload
                .parse::<usize>()
                .with_context(|| format!("invalid jsonl checkpoint '{}'", checkpoint.payload))?,
            None => 0,
        };
        Ok(Box::new(JsonlChangeStream {
            path: self.feed_path(),
            offset,
            follow: self.follow,
        }))
    }
}

struct JsonlPages {
    rows: std::vec::IntoIter<Document>,
    page_size: usize,
}

#[async_trait]
impl FullScanPages for JsonlPages {
    async fn next_page(&mut self) -> Result<Option<Vec<Document>>> {
        let page: Vec<Document> = self.rows.by_ref().take(self.page_size).collect();
        if page.is_empty() {
            Ok(None)
        } else {
            Ok(Some(page))
        }
    }
}

struct JsonlChangeStream {
    path: PathBuf,
    offset: usize,
    follow: bool,
}

#[async_trait]
impl ChangeStream for JsonlChangeStream {
    async fn next(&mut self) -> Option<Result<SourceEvent>> {
        loop {
            let lines = match read_feed_lines(&self.path) {
                Ok(lines) => lines,
                Err(error) => return Some(Err(error)),
            };

            if self.offset < lines.len() {
                let line = &lines[self.offset];
                self.offset += 1;
                let position = Checkpoint::new(self.offset.to_string());

                let record: FeedRecord = match serde_json::from_str(line) {
                    Ok(record) => record,
                    Err(error) => {
                        return Some(Err(anyhow::Error::new(error).context(format!(
                            "malformed change record at line {} of {}",
                            self.offset,
                            self.path.display()
                        ))))
                    }
                };
                return Some(Ok(SourceEvent::Change(ChangeEvent::new(
                    record.table,
                    record.kind,
                    record.payload,
                    position,
                ))));
            }

            if !self.follow {
                return None;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Index sink materializing each index as one JSON document map on disk.
pub struct FileIndexSink {
    dir: PathBuf,
}

impl FileIndexSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Build from connection parameters: `dir` (required).
    pub fn from_connection(connection: &Document) -> Result<Self> {
        let dir = connection
            .get("dir")
            .and_then(|value| value.as_str())
            .ok_or_else(|| {
                anyhow::Error::new(SyncError::configuration(
                    "file destination requires a 'dir' connection parameter",
                ))
            })?;
        Ok(Self::new(dir))
    }

    fn index_path(&self, index: &str) -> PathBuf {
        self.dir.join(format!("{index}.json"))
    }

    fn load(&self, index: &str) -> Result<Option<BTreeMap<String, Document>>> {
        let path = self.index_path(index);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading index file {}", path.display()))?;
        let documents = serde_json::from_str(&content)
            .with_context(|| format!("malformed index file {}", path.display()))?;
        Ok(Some(documents))
    }

    fn save(&self, index: &str, documents: &BTreeMap<String, Document>) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.index_path(index);
        std::fs::write(&path, serde_json::to_string_pretty(documents)?)
            .with_context(|| format!("writing index file {}", path.display()))?;
        Ok(())
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
impl IndexSink for FileIndexSink {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.index_path(index).exists())
    }

    async fn apply_full_data(&self, mapping: &Mapping, rows: &[Document]) -> Result<usize> {
        let mut documents = self.load(&mapping.index)?.unwrap_or_default();
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
        self.save(&mapping.index, &documents)?;
        Ok(rows.len())
    }

    async fn apply_one(&self, mapping: &Mapping, event: &ChangeEvent) -> Result<()> {
        let mut documents = self.load(&mapping.index)?.unwrap_or_default();
        Self::apply_event(&mut documents, mapping, event)?;
        self.save(&mapping.index, &documents)
    }

    async fn apply_batch(&self, batches: &[MappingBatch]) -> Result<()> {
        for batch in batches {
            let mut documents = self.load(&batch.mapping.index)?.unwrap_or_default();
            for event in &batch.events {
                Self::apply_event(&mut documents, &batch.mapping, event)?;
            }
            self.save(&batch.mapping.index, &documents)?;
        }
        Ok(())
    }

    async fn count(&self, index: &str) -> Result<u64> {
        match self.load(index)? {
            Some(documents) => Ok(documents.len() as u64),
            None => anyhow::bail!("index '{index}' does not exist"),
        }
    }

    async fn delete_all_documents(&self, index: &str) -> Result<()> {
        self.save(index, &BTreeMap::new())
    }
}
