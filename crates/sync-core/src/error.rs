//! Error taxonomy for the sync engine.

/// Error type for sync operations.
///
/// Connectors raise `Connectivity` and `Write`; both fail the owning runner
/// and are absorbed by its supervisor as a restart. `Configuration` is
/// rejected at the configuration boundary and never reaches a running
/// pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A source or sink endpoint cannot be reached
    #[error("cannot reach {endpoint}: {reason}")]
    Connectivity { endpoint: String, reason: String },

    /// An event or batch was rejected by the index sink
    #[error("write to index '{index}' rejected: {reason}")]
    Write { index: String, reason: String },

    /// Invalid sync topology or connection parameters
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl SyncError {
    pub fn connectivity(
        endpoint: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::Connectivity {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub fn write(index: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Write {
            index: index.into(),
            reason: reason.to_string(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }
}
