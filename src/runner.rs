//! Per-source sync pipeline.
//!
//! A [`Runner`] owns everything about one source: the change stream, the
//! routing table from source tables to index mappings, pending event
//! batches, stat counters, and the source's checkpoint. It is built from a
//! [`SourcePlan`], runs until cancelled or failed, and is never
//! reconfigured in place; configuration changes go through the
//! orchestrator as a restart.
//!
//! # Task structure
//!
//! Four kinds of cooperating tasks share one async mutex:
//!
//! - `listen` pulls events off the change stream and queues them, keeping
//!   slow source I/O out of the critical section
//! - `dispatch` routes each queued event, applies or buffers it, and
//!   advances the checkpoint
//! - one `interval_flush` per mapping whose destination sets
//!   `batch_interval`
//! - `stats_flush` drains the counters every stats interval
//!
//! # Checkpoint discipline
//!
//! A position is persisted only after the events up to it have been applied
//! to every index routed from them. Events whose table has no enabled
//! mapping have nothing to lose, so their positions persist immediately.
//! On restart the stream resumes from the last persisted position and
//! replays anything later; index writes are keyed on the primary key, so
//! replays converge instead of duplicating.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use checkpoint::{Checkpoint, CheckpointStore};
use sync_core::{
    Destination, DestinationId, Mapping, MappingBatch, MappingId, Source, SourceEvent, SourceId,
};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::batch::{EventBatch, StatCounters};
use crate::config::{EngineSettings, SourcePlan};
use crate::connect::Connectors;
use crate::sink::IndexSink;
use crate::source::{ChangeSource, ChangeStream};
use crate::stats::{StatEntry, StatsStore};

/// Page size for full scans when the destination declares no batch size.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Shared handles every runner needs: connector factories, the checkpoint
/// store, the stats backend and engine tuning.
#[derive(Clone)]
pub struct EngineContext {
    pub connectors: Arc<dyn Connectors>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub stats: Arc<dyn StatsStore>,
    pub settings: EngineSettings,
}

impl EngineContext {
    pub fn new(
        connectors: Arc<dyn Connectors>,
        checkpoints: Arc<dyn CheckpointStore>,
        stats: Arc<dyn StatsStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            connectors,
            checkpoints,
            stats,
            settings,
        }
    }
}

/// One enabled mapping with its destination and resolved sink.
struct Route {
    mapping: Mapping,
    destination: Destination,
    sink: Arc<dyn IndexSink>,
}

/// The state shared by a runner's tasks, guarded by one mutex.
#[derive(Default)]
struct Shared {
    batches: HashMap<MappingId, EventBatch>,
    counters: StatCounters,
    checkpoint: Option<Checkpoint>,
}

/// Which task returned, for the supervisor loop in [`Runner::run`].
enum TaskExit {
    Listen,
    Dispatch,
}

/// A built, ready-to-run pipeline for one source.
pub struct Runner {
    source: Source,
    routing: Arc<HashMap<String, Vec<Arc<Route>>>>,
    stream: Box<dyn ChangeStream>,
    shared: Arc<Mutex<Shared>>,
    ctx: EngineContext,
}

impl Runner {
    /// Resolve connectors, derive the routing table, decide cold/warm start
    /// and open the change stream.
    ///
    /// A cold start (no persisted checkpoint) backfills every full-sync
    /// mapping whose index does not exist yet. Backfill failures fail the
    /// build and surface to the supervisor.
    pub async fn build(ctx: &EngineContext, plan: &SourcePlan) -> Result<Self> {
        let source = plan.source.clone();
        let change_source = ctx.connectors.change_source(&source).await?;

        // One sink per distinct destination, shared by its mappings.
        let mut sinks: HashMap<DestinationId, Arc<dyn IndexSink>> = HashMap::new();
        let mut routing: HashMap<String, Vec<Arc<Route>>> = HashMap::new();
        for route in plan.routes.iter().filter(|r| r.mapping.enabled) {
            let sink = match sinks.get(&route.destination.id) {
                Some(sink) => sink.clone(),
                None => {
                    let sink = ctx.connectors.index_sink(&route.destination).await?;
                    sinks.insert(route.destination.id.clone(), sink.clone());
                    sink
                }
            };
            let route = Arc::new(Route {
                mapping: route.mapping.clone(),
                destination: route.destination.clone(),
                sink,
            });
            routing
                .entry(route.mapping.table.clone())
                .or_default()
                .push(route);
        }

        let resume = ctx.checkpoints.get(source.id.as_str()).await?;
        match &resume {
            Some(checkpoint) => {
                info!(
                    source = %source.label,
                    position = %checkpoint,
                    "Resuming sync from persisted checkpoint"
                );
            }
            None => {
                info!(source = %source.label, "No checkpoint found, performing first-run backfill");
                backfill(&source, change_source.as_ref(), &routing).await?;
            }
        }

        let mut tables: Vec<String> = routing.keys().cloned().collect();
        tables.sort();
        let stream = change_source.changes(resume.clone(), &tables).await?;
        info!(source = %source.label, ?tables, "Tailing change stream");

        Ok(Self {
            source,
            routing: Arc::new(routing),
            stream,
            shared: Arc::new(Mutex::new(Shared {
                checkpoint: resume,
                ..Shared::default()
            })),
            ctx: ctx.clone(),
        })
    }

    /// Drive the pipeline until the stream ends, a task fails, or
    /// `shutdown` fires. All spawned tasks are stopped before returning.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let Runner {
            source,
            routing,
            stream,
            shared,
            ctx,
        } = self;

        let (queue_tx, queue_rx) = mpsc::channel(ctx.settings.queue_depth);
        let mut tasks: JoinSet<Result<TaskExit>> = JoinSet::new();

        tasks.spawn(listen(stream, queue_tx));
        tasks.spawn(dispatch(
            queue_rx,
            routing.clone(),
            shared.clone(),
            ctx.clone(),
            source.id.clone(),
        ));
        for route in routing.values().flatten() {
            if let Some(period) = route.destination.batch_interval {
                tasks.spawn(interval_flush(
                    route.clone(),
                    period,
                    shared.clone(),
                    ctx.clone(),
                    source.id.clone(),
                ));
            }
        }
        tasks.spawn(stats_flush(shared.clone(), ctx.clone()));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(source = %source.label, "Cancelling pipeline tasks");
                    tasks.shutdown().await;
                    return Ok(());
                }
                joined = tasks.join_next() => match joined {
                    None => return Ok(()),
                    Some(Ok(Ok(TaskExit::Listen))) => {
                        // Stream ended; the dispatcher drains the queue and
                        // exits on its own.
                        continue;
                    }
                    Some(Ok(Ok(TaskExit::Dispatch))) => {
                        info!(source = %source.label, "Change stream ended, pipeline complete");
                        tasks.shutdown().await;
                        return Ok(());
                    }
                    Some(Ok(Err(error))) => {
                        tasks.shutdown().await;
                        return Err(error);
                    }
                    Some(Err(join_error)) => {
                        tasks.shutdown().await;
                        anyhow::bail!("pipeline task panicked: {join_error}");
                    }
                }
            }
        }
    }
}

/// Copy all existing rows of each full-sync mapping whose index is missing.
async fn backfill(
    source: &Source,
    change_source: &dyn ChangeSource,
    routing: &HashMap<String, Vec<Arc<Route>>>,
) -> Result<()> {
    for route in routing.values().flatten() {
        if !route.mapping.full_sync {
            continue;
        }
        if route.sink.index_exists(&route.mapping.index).await? {
            debug!(
                index = %route.mapping.index,
                "Index already exists, skipping backfill"
            );
            continue;
        }

        let page_size = route.destination.batch_size.unwrap_or(DEFAULT_PAGE_SIZE);
        let mut pages = change_source
            .full_scan(&route.mapping.table, page_size)
            .await
            .with_context(|| format!("scanning table '{}'", route.mapping.table))?;

        let mut total = 0;
        while let Some(rows) = pages.next_page().await? {
            if rows.is_empty() {
                continue;
            }
            total += route
                .sink
                .apply_full_data(&route.mapping, &rows)
                .await
                .with_context(|| format!("backfilling index '{}'", route.mapping.index))?;
        }

        if total > 0 {
            info!(
                "Full sync for table '{}.{}' done, {} documents added",
                source.label, route.mapping.table, total
            );
        } else {
            info!(
                "Full sync for table '{}.{}' done, no data found",
                source.label, route.mapping.table
            );
        }
    }
    Ok(())
}

/// Pull events off the change stream into the intake queue.
async fn listen(
    mut stream: Box<dyn ChangeStream>,
    queue: mpsc::Sender<SourceEvent>,
) -> Result<TaskExit> {
    while let Some(item) = stream.next().await {
        let event = item.context("change stream failed")?;
        if queue.send(event).await.is_err() {
            // Dispatcher gone, the pipeline is already winding down.
            break;
        }
    }
    Ok(TaskExit::Listen)
}

/// Route queued events to their mappings, applying or buffering each one.
async fn dispatch(
    mut queue: mpsc::Receiver<SourceEvent>,
    routing: Arc<HashMap<String, Vec<Arc<Route>>>>,
    shared: Arc<Mutex<Shared>>,
    ctx: EngineContext,
    source_id: SourceId,
) -> Result<TaskExit> {
    while let Some(event) = queue.recv().await {
        let event = match event {
            SourceEvent::Heartbeat(position) => {
                let mut state = shared.lock().await;
                persist(&ctx, &mut state, &source_id, position).await?;
                continue;
            }
            SourceEvent::Change(event) => event,
        };

        let Some(routes) = routing.get(&event.table) else {
            // Tables outside current interest: nothing to apply, nothing to
            // lose, so the position still advances.
            trace!(table = %event.table, "No mapping for table, advancing checkpoint");
            let mut state = shared.lock().await;
            persist(&ctx, &mut state, &source_id, event.position).await?;
            continue;
        };

        let mut state = shared.lock().await;
        for route in routes {
            state.counters.record(&route.mapping.id, event.kind);

            if !route.destination.batches() {
                route
                    .sink
                    .apply_one(&route.mapping, &event)
                    .await
                    .with_context(|| format!("applying event to index '{}'", route.mapping.index))?;
                persist(&ctx, &mut state, &source_id, event.position.clone()).await?;
                continue;
            }

            let batch = state.batches.entry(route.mapping.id.clone()).or_default();
            batch.add(event.clone());
            if let Some(batch_size) = route.destination.batch_size {
                if batch.len() >= batch_size {
                    flush_route(&ctx, &mut state, &source_id, route).await?;
                }
            }
        }
    }

    // Intake closed after a finite stream: flush what is still buffered so
    // nothing sits in memory forever.
    let mut state = shared.lock().await;
    for route in routing.values().flatten() {
        flush_route(&ctx, &mut state, &source_id, route).await?;
    }
    Ok(TaskExit::Dispatch)
}

/// Periodic flush for one mapping with a batch interval.
async fn interval_flush(
    route: Arc<Route>,
    period: std::time::Duration,
    shared: Arc<Mutex<Shared>>,
    ctx: EngineContext,
    source_id: SourceId,
) -> Result<TaskExit> {
    // First flush one full period from now, not immediately.
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let mut state = shared.lock().await;
        flush_route(&ctx, &mut state, &source_id, &route).await?;
    }
}

/// Periodic drain of stat counters into the stats backend.
///
/// Counters reset while the lock is held; the durable write happens after
/// release. A crash between the two loses at most one interval of counts.
async fn stats_flush(shared: Arc<Mutex<Shared>>, ctx: EngineContext) -> Result<TaskExit> {
    let period = ctx.settings.stats_interval;
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let drained = {
            let mut state = shared.lock().await;
            state.counters.drain()
        };
        if drained.is_empty() {
            continue;
        }
        let entries: Vec<StatEntry> = drained
            .into_iter()
            .map(|(mapping_id, kind, count)| StatEntry::new(mapping_id, kind, count))
            .collect();
        ctx.stats
            .record(&entries)
            .await
            .context("recording sync stats")?;
    }
}

/// Flush one mapping's pending batch, if any, and persist the position of
/// the last flushed event. An empty batch is a no-op.
async fn flush_route(
    ctx: &EngineContext,
    state: &mut Shared,
    source_id: &SourceId,
    route: &Route,
) -> Result<()> {
    let Some(batch) = state.batches.get_mut(&route.mapping.id) else {
        return Ok(());
    };
    let events = batch.drain();
    let Some(last) = events.last() else {
        return Ok(());
    };
    let position = last.position.clone();

    let batches = [MappingBatch::new(route.mapping.clone(), events)];
    route
        .sink
        .apply_batch(&batches)
        .await
        .with_context(|| format!("flushing batch to index '{}'", route.mapping.index))?;
    debug!(
        index = %route.mapping.index,
        events = batches[0].events.len(),
        "Flushed batch"
    );
    persist(ctx, state, source_id, position).await
}

/// Advance the in-memory checkpoint and persist it.
async fn persist(
    ctx: &EngineContext,
    state: &mut Shared,
    source_id: &SourceId,
    position: Checkpoint,
) -> Result<()> {
    ctx.checkpoints
        .set(source_id.as_str(), &position)
        .await
        .context("persisting checkpoint")?;
    state.checkpoint = Some(position);
    Ok(())
}
