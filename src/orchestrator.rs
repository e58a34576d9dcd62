//! Ownership of the set of live runners.
//!
//! The orchestrator maps each source identity to at most one running
//! pipeline. Starting, removing and restarting are its only mutations, all
//! taken under the registry's own lock, so no sequence of operations can
//! leave two pipelines holding the same checkpoint key.
//!
//! Every pipeline runs under a supervisor task: when a runner fails (a
//! connectivity loss, a rejected write), the supervisor logs the failure
//! and rebuilds the runner after a backoff, resuming from the persisted
//! checkpoint. Transient downstream failures heal themselves; they never
//! take the process down.

use std::collections::HashMap;

use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use sync_core::SourceId;

use crate::config::SourcePlan;
use crate::runner::{EngineContext, Runner};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
/// A run surviving this long resets the backoff to its initial value.
const STABLE_RUN: Duration = Duration::from_secs(300);

struct RunnerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Registry of live runners, one per active source.
pub struct Orchestrator {
    ctx: EngineContext,
    runners: tokio::sync::Mutex<HashMap<SourceId, RunnerHandle>>,
}

impl Orchestrator {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            runners: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Start one runner per plan. Runner failures never surface here; each
    /// supervisor handles its own source's restarts.
    pub async fn startup(&self, plans: Vec<SourcePlan>) {
        for plan in plans {
            self.start(plan).await;
        }
    }

    /// Start a supervised pipeline for one source. A source that is
    /// already running is left alone.
    pub async fn start(&self, plan: SourcePlan) {
        let mut runners = self.runners.lock().await;
        if runners.contains_key(&plan.source.id) {
            warn!(source = %plan.source.label, "Source already running, ignoring start");
            return;
        }

        info!(source = %plan.source.label, "Starting sync for source");
        let token = CancellationToken::new();
        let source_id = plan.source.id.clone();
        let task = tokio::spawn(supervise(self.ctx.clone(), plan, token.clone()));
        runners.insert(source_id, RunnerHandle { token, task });
    }

    /// Cancel and discard the runner for a source, waiting until all of its
    /// tasks have stopped. No-op if the source is not running.
    pub async fn remove(&self, source_id: &SourceId) {
        let handle = self.runners.lock().await.remove(source_id);
        let Some(handle) = handle else {
            return;
        };

        handle.token.cancel();
        if let Err(join_error) = handle.task.await {
            if !join_error.is_cancelled() {
                warn!(source = %source_id, "Supervisor ended abnormally: {join_error}");
            }
        }
        info!(source = %source_id, "Stopped sync for source");
    }

    /// Apply a configuration change: stop the source's pipeline and start a
    /// fresh one derived from the new plan.
    pub async fn restart(&self, plan: SourcePlan) {
        info!(source = %plan.source.label, "Restarting sync for source");
        self.remove(&plan.source.id).await;
        self.start(plan).await;
    }

    /// Cancel every runner. Best-effort: does not wait for in-flight
    /// flushes; anything un-persisted replays on the next start.
    pub async fn shutdown(&self) {
        let mut runners = self.runners.lock().await;
        for (source_id, handle) in runners.drain() {
            handle.token.cancel();
            handle.task.abort();
            debug!(source = %source_id, "Cancelled runner");
        }
    }

    pub async fn is_running(&self, source_id: &SourceId) -> bool {
        self.runners.lock().await.contains_key(source_id)
    }

    pub async fn active_sources(&self) -> Vec<SourceId> {
        let mut sources: Vec<SourceId> = self.runners.lock().await.keys().cloned().collect();
        sources.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        sources
    }
}

/// Build-and-run loop for one source, restarting on failure with
/// exponential backoff.
async fn supervise(ctx: EngineContext, plan: SourcePlan, token: CancellationToken) {
    let label = plan.source.label.clone();
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let started = Instant::now();
        let result = run_once(&ctx, &plan, &token).await;
        if token.is_cancelled() {
            break;
        }

        match result {
            Ok(()) => {
                info!(source = %label, "Sync pipeline finished");
                break;
            }
            Err(error) => {
                error!(source = %label, "Sync pipeline failed: {error:#}");
                if started.elapsed() >= STABLE_RUN {
                    backoff = INITIAL_BACKOFF;
                }
                warn!(source = %label, "Restarting sync in {backoff:?}");
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

async fn run_once(
    ctx: &EngineContext,
    plan: &SourcePlan,
    token: &CancellationToken,
) -> anyhow::Result<()> {
    let runner = tokio::select! {
        _ = token.cancelled() => return Ok(()),
        built = Runner::build(ctx, plan) => built?,
    };
    runner.run(token.clone()).await
}
