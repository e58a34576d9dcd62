//! Change capture abstraction.
//!
//! A [`ChangeSource`] is the engine's view of one upstream data store. The
//! concrete capture mechanism (log tailing, audit tables, file offsets) is
//! the connector's business; the engine only consumes the stream and the
//! full-scan pages, and round-trips positions through the checkpoint store
//! without interpreting them.

use anyhow::Result;
use async_trait::async_trait;
use checkpoint::Checkpoint;
use sync_core::{Document, SourceEvent};

/// One upstream data store instrumented for change capture.
///
/// Constructed once when a source's pipeline is built, from the source's
/// connector kind and connection parameters; never re-resolved per event.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Connector kind identifier, e.g. "jsonl".
    fn source_type(&self) -> &'static str;

    /// Check connectivity without consuming anything.
    async fn ping(&self) -> Result<()>;

    /// The position a brand-new consumer would start tailing from right now.
    async fn current_position(&self) -> Result<Checkpoint>;

    /// Number of rows currently in a table, for drift detection.
    async fn row_count(&self, table: &str) -> Result<u64>;

    /// Stream all existing rows of a table in pages of `page_size`.
    ///
    /// The page sequence is finite and lazy; it reflects the table as of the
    /// call, not a consistent snapshot.
    async fn full_scan(&self, table: &str, page_size: usize) -> Result<Box<dyn FullScanPages>>;

    /// Open the live change stream, resuming after `resume` if given or from
    /// the beginning of retained history otherwise.
    ///
    /// `tables` is the allowlist of tables the caller cares about. A
    /// connector may emit events outside it; routing drops them while their
    /// positions still advance the checkpoint.
    async fn changes(
        &self,
        resume: Option<Checkpoint>,
        tables: &[String],
    ) -> Result<Box<dyn ChangeStream>>;
}

/// Finite sequence of row pages produced by a full scan.
#[async_trait]
pub trait FullScanPages: Send {
    /// Get the next page of rows. Returns None after the last page.
    async fn next_page(&mut self) -> Result<Option<Vec<Document>>>;
}

/// A live, effectively infinite stream of change events.
#[async_trait]
pub trait ChangeStream: Send + Sync {
    /// Get the next event from the stream, suspending while none is
    /// available. Returns None only if the underlying feed has ended, which
    /// for finite sources (files) is a clean end of the pipeline.
    async fn next(&mut self) -> Option<Result<SourceEvent>>;
}
