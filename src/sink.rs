//! Index write abstraction.
//!
//! The [`IndexSink`] trait is the engine's only write path into a search
//! index. Implementations must upsert and delete by primary key, which is
//! what makes replaying events after a restart harmless.

use anyhow::Result;
use async_trait::async_trait;
use sync_core::{ChangeEvent, Document, Mapping, MappingBatch};

/// Write path into one search index destination.
///
/// All operations key documents on the mapping's primary key field, so
/// applying the same event twice converges to the same index state.
#[async_trait]
pub trait IndexSink: Send + Sync {
    /// Whether an index already exists on the destination.
    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// Write a page of backfill rows, creating the index as needed.
    /// Returns the number of documents written.
    async fn apply_full_data(&self, mapping: &Mapping, rows: &[Document]) -> Result<usize>;

    /// Apply a single change event.
    async fn apply_one(&self, mapping: &Mapping, event: &ChangeEvent) -> Result<()>;

    /// Apply batches of buffered events, each batch in receipt order.
    async fn apply_batch(&self, batches: &[MappingBatch]) -> Result<()>;

    /// Number of documents currently in an index.
    async fn count(&self, index: &str) -> Result<u64>;

    /// Remove every document from an index, leaving the index in place.
    /// Used by forced full resyncs.
    async fn delete_all_documents(&self, index: &str) -> Result<()>;
}
