//! Orchestrator lifecycle tests: per-source isolation, idempotent
//! operations, self-healing restarts and shutdown.

use std::sync::Arc;
use std::time::Duration;

use checkpoint::MemoryStore;
use search_sync::config::{EngineSettings, SourcePlan, SyncRoute};
use search_sync::runner::EngineContext;
use search_sync::stats::MemoryStatsStore;
use search_sync::testing::{
    destination_spec, doc, mapping_spec, source_spec, wait_until, FakeIndexSink,
    ScriptedChangeSource, StaticConnectors,
};
use search_sync::Orchestrator;
use serde_json::json;
use sync_core::{EventKind, SourceId};

struct TwoSources {
    source1: Arc<ScriptedChangeSource>,
    source2: Arc<ScriptedChangeSource>,
    sink1: Arc<FakeIndexSink>,
    sink2: Arc<FakeIndexSink>,
    checkpoints: Arc<MemoryStore>,
    plan1: SourcePlan,
    plan2: SourcePlan,
    orchestrator: Orchestrator,
}

fn plan_for(n: u32) -> SourcePlan {
    SourcePlan {
        source: source_spec(&format!("s{n}")),
        routes: vec![SyncRoute {
            mapping: mapping_spec(
                &format!("m{n}"),
                &format!("s{n}"),
                &format!("d{n}"),
                "orders",
                &format!("orders_idx{n}"),
            ),
            destination: destination_spec(&format!("d{n}")),
        }],
    }
}

fn two_sources() -> TwoSources {
    let source1 = Arc::new(ScriptedChangeSource::new());
    let source2 = Arc::new(ScriptedChangeSource::new());
    let sink1 = Arc::new(FakeIndexSink::new());
    let sink2 = Arc::new(FakeIndexSink::new());
    let checkpoints = Arc::new(MemoryStore::new());
    let stats = Arc::new(MemoryStatsStore::new());

    let connectors = StaticConnectors::new()
        .with_source("s1", source1.clone())
        .with_source("s2", source2.clone())
        .with_sink("d1", sink1.clone())
        .with_sink("d2", sink2.clone());
    let settings = EngineSettings {
        stats_interval: Duration::from_secs(3600),
        ..EngineSettings::default()
    };
    let ctx = EngineContext::new(Arc::new(connectors), checkpoints.clone(), stats, settings);
    let orchestrator = Orchestrator::new(ctx);

    TwoSources {
        source1,
        source2,
        sink1,
        sink2,
        checkpoints,
        plan1: plan_for(1),
        plan2: plan_for(2),
        orchestrator,
    }
}

#[tokio::test]
async fn test_restart_isolation() {
    let fixture = two_sources();
    fixture
        .orchestrator
        .startup(vec![fixture.plan1.clone(), fixture.plan2.clone()])
        .await;

    fixture
        .source1
        .push_change("orders", EventKind::Create, doc(json!({"id": 1})));
    fixture
        .source2
        .push_change("orders", EventKind::Create, doc(json!({"id": 1})));

    let (s1, s2) = (fixture.sink1.clone(), fixture.sink2.clone());
    assert!(
        wait_until(
            || s1.documents("orders_idx1").len() == 1 && s2.documents("orders_idx2").len() == 1,
            Duration::from_secs(2)
        )
        .await
    );
    // Both positions persisted before the restart, so nothing replays.
    let checkpoints = fixture.checkpoints.clone();
    assert!(
        wait_until(
            || {
                checkpoints.peek("s1").map(|c| c.payload) == Some("1".to_string())
                    && checkpoints.peek("s2").map(|c| c.payload) == Some("1".to_string())
            },
            Duration::from_secs(2)
        )
        .await
    );

    fixture.orchestrator.restart(fixture.plan1.clone()).await;

    fixture
        .source1
        .push_change("orders", EventKind::Create, doc(json!({"id": 2})));
    fixture
        .source2
        .push_change("orders", EventKind::Create, doc(json!({"id": 2})));

    let (s1, s2) = (fixture.sink1.clone(), fixture.sink2.clone());
    assert!(
        wait_until(
            || s1.documents("orders_idx1").len() == 2 && s2.documents("orders_idx2").len() == 2,
            Duration::from_secs(2)
        )
        .await
    );

    // Resumed from its checkpoint: no event was applied twice to either
    // source's index, and the untouched source was never interrupted.
    assert_eq!(fixture.sink1.calls().len(), 2);
    assert_eq!(fixture.sink2.calls().len(), 2);
    let checkpoints = fixture.checkpoints.clone();
    assert!(
        wait_until(
            || {
                checkpoints.peek("s1").map(|c| c.payload) == Some("2".to_string())
                    && checkpoints.peek("s2").map(|c| c.payload) == Some("2".to_string())
            },
            Duration::from_secs(2)
        )
        .await
    );

    fixture.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_restart_applies_new_routing() {
    let fixture = two_sources();
    fixture.orchestrator.start(fixture.plan1.clone()).await;

    fixture
        .source1
        .push_change("orders", EventKind::Create, doc(json!({"id": 1})));
    let s1 = fixture.sink1.clone();
    assert!(wait_until(|| s1.documents("orders_idx1").len() == 1, Duration::from_secs(2)).await);

    // Disable the mapping and restart: the routing table is re-derived.
    let mut reconfigured = fixture.plan1.clone();
    reconfigured.routes[0].mapping.enabled = false;
    fixture.orchestrator.restart(reconfigured).await;

    fixture
        .source1
        .push_change("orders", EventKind::Create, doc(json!({"id": 2})));

    let checkpoints = fixture.checkpoints.clone();
    assert!(
        wait_until(
            || checkpoints.peek("s1").map(|c| c.payload) == Some("2".to_string()),
            Duration::from_secs(2)
        )
        .await
    );
    // The event passed through as unrouted: position advanced, no write.
    assert_eq!(fixture.sink1.calls().len(), 1);

    fixture.orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_auto_restart_after_failure() {
    let fixture = two_sources();
    fixture.sink1.set_fail_writes(true);
    fixture.orchestrator.start(fixture.plan1.clone()).await;

    fixture
        .source1
        .push_change("orders", EventKind::Create, doc(json!({"id": 1})));

    // The write fails and takes the pipeline down.
    let s1 = fixture.sink1.clone();
    assert!(wait_until(|| !s1.calls().is_empty(), Duration::from_secs(5)).await);

    // Heal the sink; the supervisor restarts from the last persisted
    // checkpoint and replays the event.
    fixture.sink1.set_fail_writes(false);
    let s1 = fixture.sink1.clone();
    assert!(
        wait_until(
            || s1.documents("orders_idx1").len() == 1,
            Duration::from_secs(120)
        )
        .await
    );
    assert!(
        fixture
            .orchestrator
            .is_running(&SourceId::new("s1"))
            .await
    );

    fixture.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_remove_is_idempotent() {
    let fixture = two_sources();

    // Removing something that never ran is a no-op.
    fixture.orchestrator.remove(&SourceId::new("s1")).await;

    fixture.orchestrator.start(fixture.plan1.clone()).await;
    assert!(fixture.orchestrator.is_running(&SourceId::new("s1")).await);

    fixture.orchestrator.remove(&SourceId::new("s1")).await;
    fixture.orchestrator.remove(&SourceId::new("s1")).await;
    assert!(!fixture.orchestrator.is_running(&SourceId::new("s1")).await);
}

#[tokio::test]
async fn test_remove_stops_event_flow() {
    let fixture = two_sources();
    fixture.orchestrator.start(fixture.plan1.clone()).await;

    fixture
        .source1
        .push_change("orders", EventKind::Create, doc(json!({"id": 1})));
    let s1 = fixture.sink1.clone();
    assert!(wait_until(|| s1.documents("orders_idx1").len() == 1, Duration::from_secs(2)).await);

    fixture.orchestrator.remove(&SourceId::new("s1")).await;

    fixture
        .source1
        .push_change("orders", EventKind::Create, doc(json!({"id": 2})));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fixture.sink1.calls().len(), 1);
    assert!(fixture.orchestrator.active_sources().await.is_empty());
}

#[tokio::test]
async fn test_double_start_is_ignored() {
    let fixture = two_sources();
    fixture.orchestrator.start(fixture.plan1.clone()).await;
    fixture.orchestrator.start(fixture.plan1.clone()).await;

    assert_eq!(
        fixture.orchestrator.active_sources().await,
        vec![SourceId::new("s1")]
    );

    fixture.orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_cancels_everything() {
    let fixture = two_sources();
    fixture
        .orchestrator
        .startup(vec![fixture.plan1.clone(), fixture.plan2.clone()])
        .await;
    assert_eq!(fixture.orchestrator.active_sources().await.len(), 2);

    fixture.orchestrator.shutdown().await;
    assert!(fixture.orchestrator.active_sources().await.is_empty());

    fixture
        .source1
        .push_change("orders", EventKind::Create, doc(json!({"id": 1})));
    fixture
        .source2
        .push_change("orders", EventKind::Create, doc(json!({"id": 1})));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(fixture.sink1.calls().is_empty());
    assert!(fixture.sink2.calls().is_empty());
}
