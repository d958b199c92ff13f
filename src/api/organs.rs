use super::{blocking, ApiError, ApiResult};
use crate::model::{OrganListing, OrganStatus, PerformanceReport, SystemsOverview};
use crate::orchestrator::{restart_and_record, Console, RecordedRestart};
use crate::storage::ledger::{verify_entries, LedgerEntry, VerifyReport};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(super) struct LedgerView {
    entries: Vec<LedgerEntry>,
    verification: VerifyReport,
}

pub(super) async fn list_organs(State(console): State<Console>) -> ApiResult<Json<OrganListing>> {
    let registry = console.registry.clone();
    let listing = blocking(move || Ok(registry.list_organs())).await?;
    Ok(Json(listing))
}

pub(super) async fn organ_status(
    State(console): State<Console>,
    Path(name): Path<String>,
) -> ApiResult<Json<OrganStatus>> {
    Ok(Json(console.registry.status(&name)?))
}

/// Blocks until the restart completes or fails. The restart runs in its own task so a
/// client that disconnects cannot cancel it halfway.
pub(super) async fn restart_organ(
    State(console): State<Console>,
    Path(name): Path<String>,
) -> ApiResult<Json<RecordedRestart>> {
    let task = tokio::spawn(async move {
        restart_and_record(&console.registry, &console.ledger, &name).await
    });
    let recorded = task
        .await
        .map_err(|e| ApiError::internal(format!("restart task failed: {e}")))??;
    Ok(Json(recorded))
}

pub(super) async fn systems(State(console): State<Console>) -> ApiResult<Json<SystemsOverview>> {
    let overview = blocking(move || Ok(console.overview())).await?;
    Ok(Json(overview))
}

pub(super) async fn performance(
    State(console): State<Console>,
) -> ApiResult<Json<PerformanceReport>> {
    let metrics = console.metrics.clone();
    let report = blocking(move || Ok(metrics.report())).await?;
    Ok(Json(report))
}

pub(super) async fn ledger(State(console): State<Console>) -> ApiResult<Json<LedgerView>> {
    let ledger = console.ledger.clone();
    let entries = blocking(move || ledger.load().map_err(|e| ApiError::internal(format!("{e:#}")))).await?;
    let verification = verify_entries(&entries);
    Ok(Json(LedgerView {
        entries,
        verification,
    }))
}
