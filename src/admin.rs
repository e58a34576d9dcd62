//! Manual operational triggers.
//!
//! These operations go through the same source/sink interfaces as the
//! pipelines; there is no separate protocol. `check` reads counts on both
//! sides for drift detection; `refresh` forces a full resync of one
//! mapping without touching any other mapping's pipeline.

use anyhow::Result;
use tracing::info;

use sync_core::{MappingId, SyncError};

use crate::config::{SourcePlan, SyncRoute};
use crate::orchestrator::Orchestrator;
use crate::runner::{EngineContext, DEFAULT_PAGE_SIZE};

/// Result of comparing one mapping's two sides.
#[derive(Debug, Clone)]
pub struct DriftReport {
    pub table: String,
    pub index: String,
    pub source_rows: u64,
    pub index_documents: u64,
}

impl DriftReport {
    pub fn in_sync(&self) -> bool {
        self.source_rows == self.index_documents
    }
}

fn find_route<'a>(plan: &'a SourcePlan, mapping_id: &MappingId) -> Result<&'a SyncRoute> {
    plan.routes
        .iter()
        .find(|route| &route.mapping.id == mapping_id)
        .ok_or_else(|| {
            anyhow::Error::new(SyncError::configuration(format!(
                "mapping '{}' is not part of source '{}'",
                mapping_id, plan.source.id
            )))
        })
}

/// Check connectivity of a source.
pub async fn ping(ctx: &EngineContext, plan: &SourcePlan) -> Result<()> {
    let source = ctx.connectors.change_source(&plan.source).await?;
    source.ping().await
}

/// Compare upstream row count against indexed document count for one
/// mapping.
pub async fn check(
    ctx: &EngineContext,
    plan: &SourcePlan,
    mapping_id: &MappingId,
) -> Result<DriftReport> {
    let route = find_route(plan, mapping_id)?;
    let source = ctx.connectors.change_source(&plan.source).await?;
    let sink = ctx.connectors.index_sink(&route.destination).await?;

    let source_rows = source.row_count(&route.mapping.table).await?;
    let index_documents = sink.count(&route.mapping.index).await?;

    Ok(DriftReport {
        table: route.mapping.table.clone(),
        index: route.mapping.index.clone(),
        source_rows,
        index_documents,
    })
}

/// Force a full resync of one mapping: advance the source checkpoint to
/// the stream's current position, wipe the destination index, and re-apply
/// a fresh full scan. Returns the number of documents written.
///
/// The checkpoint moves *before* the reload so changes arriving while the
/// scan runs replay on the next pipeline start instead of being skipped.
///
/// This is the data-only half; callers with a live engine should use
/// [`refresh_running`] so the source's pipeline is stopped around it.
pub async fn refresh(
    ctx: &EngineContext,
    plan: &SourcePlan,
    mapping_id: &MappingId,
) -> Result<u64> {
    let route = find_route(plan, mapping_id)?;
    let source = ctx.connectors.change_source(&plan.source).await?;
    let sink = ctx.connectors.index_sink(&route.destination).await?;

    let position = source.current_position().await?;
    ctx.checkpoints
        .set(plan.source.id.as_str(), &position)
        .await?;

    sink.delete_all_documents(&route.mapping.index).await?;

    let page_size = route.destination.batch_size.unwrap_or(DEFAULT_PAGE_SIZE);
    let mut pages = source.full_scan(&route.mapping.table, page_size).await?;
    let mut total: u64 = 0;
    while let Some(rows) = pages.next_page().await? {
        if rows.is_empty() {
            continue;
        }
        total += sink.apply_full_data(&route.mapping, &rows).await? as u64;
    }

    info!(
        index = %route.mapping.index,
        documents = total,
        "Refreshed index from full scan"
    );
    Ok(total)
}

/// [`refresh`] wrapped for a live engine: stops the source's pipeline,
/// reloads the mapping, and starts the pipeline again from the advanced
/// checkpoint. Other sources' pipelines are untouched.
pub async fn refresh_running(
    ctx: &EngineContext,
    orchestrator: &Orchestrator,
    plan: &SourcePlan,
    mapping_id: &MappingId,
) -> Result<u64> {
    orchestrator.remove(&plan.source.id).await;
    let total = refresh(ctx, plan, mapping_id).await?;
    orchestrator.start(plan.clone()).await;
    Ok(total)
}
