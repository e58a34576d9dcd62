//! Test infrastructure for the sync engine.
//!
//! Provides scripted in-memory implementations of the source and sink
//! contracts plus small fixture builders, used by the integration tests
//! under `tests/` and available to downstream crates writing their own.

pub mod connectors;
pub mod fixtures;
pub mod sink;
pub mod source;

pub use connectors::StaticConnectors;
pub use fixtures::{destination_spec, doc, generate_run_id, mapping_spec, source_spec, wait_until};
pub use sink::{FakeIndexSink, SinkCall};
pub use source::ScriptedChangeSource;
