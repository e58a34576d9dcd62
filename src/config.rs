//! Engine configuration loaded from YAML.
//!
//! A configuration file declares the sync topology (sources, destinations,
//! mappings) plus engine tuning. Everything that can be rejected statically
//! is rejected here, before any pipeline starts: duplicate identities,
//! dangling references, duplicate (destination, source, table) mappings,
//! nonsensical batching values.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sync_core::{Destination, Mapping, MappingId, Source, SourceId, SyncError};

fn default_stats_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_queue_depth() -> usize {
    1024
}

fn default_checkpoint_dir() -> String {
    ".search-sync/checkpoints".to_string()
}

/// Engine-level tuning knobs, all optional in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// How often each runner drains its stat counters
    #[serde(
        default = "default_stats_interval",
        with = "sync_core::duration::required"
    )]
    pub stats_interval: Duration,

    /// Capacity of the intake queue between listen and dispatch
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Directory for the filesystem checkpoint store
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: String,

    /// JSONL file for durable stats; log-only emission when unset
    #[serde(default)]
    pub stats_path: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            stats_interval: default_stats_interval(),
            queue_depth: default_queue_depth(),
            checkpoint_dir: default_checkpoint_dir(),
            stats_path: None,
        }
    }
}

/// One source together with every mapping routed from it.
///
/// This is the unit the orchestrator starts, restarts and removes. Disabled
/// mappings stay in the plan; the runner excludes them from its routing
/// table when it builds, so a disable takes effect on the next restart.
#[derive(Debug, Clone)]
pub struct SourcePlan {
    pub source: Source,
    pub routes: Vec<SyncRoute>,
}

/// A mapping paired with its resolved destination.
#[derive(Debug, Clone)]
pub struct SyncRoute {
    pub mapping: Mapping,
    pub destination: Destination,
}

/// The full engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub destinations: Vec<Destination>,
    #[serde(default)]
    pub mappings: Vec<Mapping>,
}

impl EngineConfig {
    /// Load and validate a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_yaml::from_str(yaml).context("Failed to parse config YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject statically invalid topology.
    pub fn validate(&self) -> Result<(), SyncError> {
        let mut source_ids = HashSet::new();
        for source in &self.sources {
            if source.kind.trim().is_empty() {
                return Err(SyncError::configuration(format!(
                    "source '{}' has no connector kind",
                    source.id
                )));
            }
            if !source_ids.insert(&source.id) {
                return Err(SyncError::configuration(format!(
                    "duplicate source id '{}'",
                    source.id
                )));
            }
        }

        let mut destination_ids = HashSet::new();
        for destination in &self.destinations {
            if destination.batch_size == Some(0) {
                return Err(SyncError::configuration(format!(
                    "destination '{}' has batch_size 0",
                    destination.id
                )));
            }
            if !destination_ids.insert(&destination.id) {
                return Err(SyncError::configuration(format!(
                    "duplicate destination id '{}'",
                    destination.id
                )));
            }
        }

        let mut mapping_ids = HashSet::new();
        let mut bindings = HashSet::new();
        for mapping in &self.mappings {
            if !mapping_ids.insert(&mapping.id) {
                return Err(SyncError::configuration(format!(
                    "duplicate mapping id '{}'",
                    mapping.id
                )));
            }
            if !source_ids.contains(&mapping.source_id) {
                return Err(SyncError::configuration(format!(
                    "mapping '{}' references unknown source '{}'",
                    mapping.id, mapping.source_id
                )));
            }
            if !destination_ids.contains(&mapping.destination_id) {
                return Err(SyncError::configuration(format!(
                    "mapping '{}' references unknown destination '{}'",
                    mapping.id, mapping.destination_id
                )));
            }
            if mapping.primary_key.trim().is_empty() {
                return Err(SyncError::configuration(format!(
                    "mapping '{}' has an empty primary key field",
                    mapping.id
                )));
            }
            let binding = (
                mapping.destination_id.clone(),
                mapping.source_id.clone(),
                mapping.table.clone(),
            );
            if !bindings.insert(binding) {
                return Err(SyncError::configuration(format!(
                    "duplicate mapping for destination '{}', source '{}', table '{}'",
                    mapping.destination_id, mapping.source_id, mapping.table
                )));
            }
        }

        Ok(())
    }

    /// Build the plan for one source, or None if it is not configured.
    pub fn plan_for(&self, source_id: &SourceId) -> Option<SourcePlan> {
        let source = self.sources.iter().find(|s| &s.id == source_id)?.clone();
        let destinations: HashMap<_, _> = self
            .destinations
            .iter()
            .map(|d| (d.id.clone(), d.clone()))
            .collect();

        let routes = self
            .mappings
            .iter()
            .filter(|m| &m.source_id == source_id)
            .filter_map(|m| {
                destinations.get(&m.destination_id).map(|d| SyncRoute {
                    mapping: m.clone(),
                    destination: d.clone(),
                })
            })
            .collect();

        Some(SourcePlan { source, routes })
    }

    /// Build plans for every configured source.
    pub fn plans(&self) -> Vec<SourcePlan> {
        self.sources
            .iter()
            .filter_map(|s| self.plan_for(&s.id))
            .collect()
    }

    /// Locate a mapping and the plan of its owning source.
    pub fn plan_for_mapping(&self, mapping_id: &MappingId) -> Option<(SourcePlan, Mapping)> {
        let mapping = self.mappings.iter().find(|m| &m.id == mapping_id)?.clone();
        let plan = self.plan_for(&mapping.source_id)?;
        Some((plan, mapping))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
engine:
  stats_interval: 30s
sources:
  - id: s1
    label: orders database
    kind: jsonl
    connection:
      dir: /tmp/orders
destinations:
  - id: d1
    label: search cluster
    batch_size: 100
    batch_interval: 10s
mappings:
  - id: m1
    label: orders
    source_id: s1
    destination_id: d1
    table: orders
    index: orders_idx
"#;

    #[test]
    fn test_valid_config_parses() {
        let config = EngineConfig::from_yaml(VALID).unwrap();
        assert_eq!(config.engine.stats_interval, Duration::from_secs(30));
        assert_eq!(config.engine.queue_depth, 1024);
        assert_eq!(config.sources.len(), 1);

        let plans = config.plans();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].routes.len(), 1);
        assert_eq!(plans[0].routes[0].destination.batch_size, Some(100));
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let yaml = format!(
            "{VALID}  - id: m2\n    label: orders again\n    source_id: s1\n    destination_id: d1\n    table: orders\n    index: other_idx\n"
        );
        let err = EngineConfig::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate mapping"));
    }

    #[test]
    fn test_dangling_destination_rejected() {
        let yaml = VALID.replace("destination_id: d1", "destination_id: nope");
        let err = EngineConfig::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("unknown destination"));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let yaml = VALID.replace("batch_size: 100", "batch_size: 0");
        let err = EngineConfig::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("batch_size 0"));
    }

    #[test]
    fn test_plan_for_unknown_source() {
        let config = EngineConfig::from_yaml(VALID).unwrap();
        assert!(config.plan_for(&SourceId::new("nope")).is_none());
    }

    #[test]
    fn test_plan_for_mapping() {
        let config = EngineConfig::from_yaml(VALID).unwrap();
        let (plan, mapping) = config.plan_for_mapping(&MappingId::new("m1")).unwrap();
        assert_eq!(plan.source.id, SourceId::new("s1"));
        assert_eq!(mapping.index, "orders_idx");
    }
}
