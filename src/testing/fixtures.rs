//! Fixture builders shared by the integration tests.

use std::time::Duration;

use sync_core::{Destination, Document, Mapping, Source};

/// Generate a short unique id for test artifacts.
pub fn generate_run_id() -> String {
    uuid::Uuid::new_v4().to_string()[..8].to_string()
}

/// A source spec resolved by a registered scripted connector.
pub fn source_spec(id: &str) -> Source {
    Source {
        id: id.into(),
        label: format!("{id} (test)"),
        kind: "scripted".to_string(),
        connection: Document::new(),
    }
}

/// A destination spec with no batching policy.
pub fn destination_spec(id: &str) -> Destination {
    Destination {
        id: id.into(),
        label: format!("{id} (test)"),
        connection: Document::new(),
        batch_size: None,
        batch_interval: None,
    }
}

/// A mapping spec with defaults: primary key "id", full sync, enabled.
pub fn mapping_spec(id: &str, source: &str, destination: &str, table: &str, index: &str) -> Mapping {
    Mapping {
        id: id.into(),
        label: format!("{table} to {index}"),
        source_id: source.into(),
        destination_id: destination.into(),
        table: table.to_string(),
        index: index.to_string(),
        primary_key: "id".to_string(),
        full_sync: true,
        fields: None,
        enabled: true,
    }
}

/// Build a JSON object payload.
///
/// Panics on non-object input; test-only.
pub fn doc(value: serde_json::Value) -> Document {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected JSON object, got {other}"),
    }
}

/// Poll until a condition holds or the timeout elapses. Returns whether
/// the condition held.
pub async fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
