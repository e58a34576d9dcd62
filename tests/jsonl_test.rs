//! End-to-end test of the built-in JSONL connector pair through the full
//! engine: config file, orchestrator, filesystem checkpoint store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use checkpoint::{CheckpointStore, FilesystemStore};
use search_sync::runner::EngineContext;
use search_sync::stats::MemoryStatsStore;
use search_sync::testing::{generate_run_id, wait_until};
use search_sync::{BuiltinConnectors, EngineConfig, Orchestrator};
use sync_core::Document;
use tempfile::TempDir;

fn write_lines(path: &std::path::Path, lines: &[&str]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, lines.join("\n") + "\n").unwrap();
}

fn read_index(path: &std::path::Path) -> BTreeMap<String, Document> {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

/// Non-panicking read for polling: the sink may be mid-write.
fn try_read_index(path: &std::path::Path) -> Option<BTreeMap<String, Document>> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

fn config_yaml(tmp: &TempDir, index: &str) -> String {
    format!(
        r#"
engine:
  checkpoint_dir: {root}/checkpoints
sources:
  - id: s1
    label: orders database
    kind: jsonl
    connection:
      dir: {root}/source
      follow: false
destinations:
  - id: d1
    label: file index
    connection:
      kind: file
      dir: {root}/indexes
mappings:
  - id: m1
    label: orders
    source_id: s1
    destination_id: d1
    table: orders
    index: {index}
"#,
        root = tmp.path().display()
    )
}

fn build_context(config: &EngineConfig) -> EngineContext {
    EngineContext::new(
        Arc::new(BuiltinConnectors::new()),
        Arc::new(FilesystemStore::new(&config.engine.checkpoint_dir)),
        Arc::new(MemoryStatsStore::new()),
        config.engine.clone(),
    )
}

#[tokio::test]
async fn test_jsonl_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let index = format!("orders_idx_{}", generate_run_id());

    write_lines(
        &tmp.path().join("source/tables/orders.jsonl"),
        &[
            r#"{"id": 1, "status": "old"}"#,
            r#"{"id": 2, "status": "old"}"#,
        ],
    );
    write_lines(
        &tmp.path().join("source/changes.jsonl"),
        &[
            r#"{"table": "orders", "kind": "create", "payload": {"id": 3, "status": "new"}}"#,
            r#"{"table": "orders", "kind": "delete", "payload": {"id": 1}}"#,
        ],
    );

    let config = EngineConfig::from_yaml(&config_yaml(&tmp, &index)).unwrap();
    let ctx = build_context(&config);
    let orchestrator = Orchestrator::new(ctx.clone());
    orchestrator.startup(config.plans()).await;

    // With follow disabled the stream ends at EOF; the pipeline backfills,
    // applies both events and completes on its own.
    let index_path = tmp.path().join("indexes").join(format!("{index}.json"));
    let expected = index_path.clone();
    assert!(
        wait_until(
            move || {
                try_read_index(&expected)
                    .is_some_and(|documents| documents.len() == 2 && documents.contains_key("3"))
            },
            Duration::from_secs(5)
        )
        .await
    );

    let documents = read_index(&index_path);
    assert!(documents.contains_key("2"));
    assert!(documents.contains_key("3"));
    assert!(!documents.contains_key("1"));

    let checkpoint = ctx.checkpoints.get("s1").await.unwrap().unwrap();
    assert_eq!(checkpoint.payload, "2");

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_jsonl_resumes_across_runs() {
    let tmp = TempDir::new().unwrap();
    let index = format!("orders_idx_{}", generate_run_id());

    write_lines(
        &tmp.path().join("source/tables/orders.jsonl"),
        &[r#"{"id": 1}"#],
    );
    write_lines(
        &tmp.path().join("source/changes.jsonl"),
        &[r#"{"table": "orders", "kind": "delete", "payload": {"id": 1}}"#],
    );

    let config = EngineConfig::from_yaml(&config_yaml(&tmp, &index)).unwrap();
    let index_path = tmp.path().join("indexes").join(format!("{index}.json"));

    // First run: backfill one row, then the delete event empties the index.
    {
        let ctx = build_context(&config);
        let orchestrator = Orchestrator::new(ctx);
        orchestrator.startup(config.plans()).await;
        let expected = index_path.clone();
        assert!(
            wait_until(
                move || try_read_index(&expected).is_some_and(|documents| documents.is_empty()),
                Duration::from_secs(5)
            )
            .await
        );
        orchestrator.shutdown().await;
    }

    // A new change lands between runs.
    std::fs::OpenOptions::new()
        .append(true)
        .open(tmp.path().join("source/changes.jsonl"))
        .map(|mut file| {
            use std::io::Write as _;
            writeln!(
                file,
                r#"{{"table": "orders", "kind": "create", "payload": {{"id": 2}}}}"#
            )
            .unwrap();
        })
        .unwrap();

    // Second run resumes past the already-applied delete; the index keeps
    // its state and only the new event applies. The backfill does not run
    // again: the checkpoint exists.
    {
        let ctx = build_context(&config);
        let orchestrator = Orchestrator::new(ctx.clone());
        orchestrator.startup(config.plans()).await;
        let expected = index_path.clone();
        assert!(
            wait_until(
                move || try_read_index(&expected).is_some_and(|documents| documents.contains_key("2")),
                Duration::from_secs(5)
            )
            .await
        );
        orchestrator.shutdown().await;

        let documents = read_index(&index_path);
        assert_eq!(documents.len(), 1);
        assert!(!documents.contains_key("1"));

        let checkpoint = ctx.checkpoints.get("s1").await.unwrap().unwrap();
        assert_eq!(checkpoint.payload, "2");
    }
}
