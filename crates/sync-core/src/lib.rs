//! Core types for the search-sync engine.
//!
//! This crate provides the foundational types used across the sync engine:
//!
//! - [`Source`], [`Destination`], [`Mapping`] - the configured sync topology
//! - [`ChangeEvent`], [`SourceEvent`] - events flowing out of change capture
//! - [`SyncError`] - the error taxonomy shared by connectors and the engine
//!
//! # Architecture
//!
//! The sync-core crate sits at the foundation of the engine:
//!
//! ```text
//! sync-core (this crate)
//!    │
//!    ├─── search-sync         (runner, orchestrator, stats, connectors)
//!    └─── checkpoint          (position records referenced by ChangeEvent)
//! ```
//!
//! Types here carry no I/O and no synchronization of their own. Everything
//! that mutates them concurrently is the engine's responsibility.

pub mod duration;
pub mod error;
pub mod event;
pub mod types;

// Re-exports for convenience
pub use duration::parse_duration;
pub use error::SyncError;
pub use event::{ChangeEvent, Document, EventKind, MappingBatch, SourceEvent};
pub use types::{Destination, DestinationId, Mapping, MappingId, Source, SourceId};
