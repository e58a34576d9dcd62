//! search-sync library
//!
//! A daemon that continuously mirrors change events from upstream data
//! sources into search indexes.
//!
//! # Features
//!
//! - Live tailing: change events stream into per-table index mappings
//! - First-run backfill: full table copies before live tailing begins
//! - Batching: per-destination size and interval flush policies
//! - Reliable checkpointing: resume from the last applied position after
//!   failures or restarts, with at-least-once delivery
//! - Hot reconfiguration: one source's pipeline restarts without
//!   disturbing the others
//!
//! # Architecture
//!
//! The [`Orchestrator`] owns one supervised [`Runner`] per configured
//! source. Each runner tails a [`ChangeSource`], fans events out to every
//! enabled mapping for their table, flushes batches to an [`IndexSink`],
//! and persists its position through a [`checkpoint::CheckpointStore`]
//! only after the events up to that position are durably applied.
//!
//! Delivery is at-least-once: sinks upsert and delete by primary key, so
//! replayed events converge instead of duplicating.
//!
//! # CLI Usage
//!
//! ```bash
//! # Run the engine against a configuration file
//! search-sync --config search-sync.yaml run
//!
//! # Compare upstream row count against indexed documents
//! search-sync --config search-sync.yaml check --mapping orders
//!
//! # Force a full resync of one mapping
//! search-sync --config search-sync.yaml refresh --mapping orders
//! ```

pub mod admin;
pub mod batch;
pub mod config;
pub mod connect;
pub mod jsonl;
pub mod orchestrator;
pub mod runner;
pub mod sink;
pub mod source;
pub mod stats;
pub mod testing;

pub use admin::DriftReport;
pub use config::{EngineConfig, EngineSettings, SourcePlan, SyncRoute};
pub use connect::{BuiltinConnectors, Connectors};
pub use orchestrator::Orchestrator;
pub use runner::{EngineContext, Runner, DEFAULT_PAGE_SIZE};
pub use sink::IndexSink;
pub use source::{ChangeSource, ChangeStream, FullScanPages};
pub use stats::{JsonlStatsStore, LogStatsStore, MemoryStatsStore, StatEntry, StatsStore};
