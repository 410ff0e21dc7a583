//! Administrative handlers: manual refresh trigger, staging
//! inspection/recovery, and translation management.
//!
//! The staging operations exist for operational recovery after a crash (a
//! promotion interrupted between datasets, an orphaned staging instance);
//! none of them are used on the steady-state path.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::data::datasets::{Dataset, DatasetKind};
use crate::data::{lock, swap, translations};
use crate::pipeline::{PipelineError, Scope};
use crate::state::AppState;
use crate::web::decks::ModeParams;
use crate::web::error::{db_error, ApiError};

#[derive(Debug, Deserialize)]
pub struct RefreshParams {
    #[serde(default)]
    pub scope: Scope,
}

fn parse_dataset(name: &str, mode_params: &ModeParams) -> Result<Dataset, ApiError> {
    DatasetKind::parse(name)
        .map(|kind| Dataset::new(kind, mode_params.mode))
        .ok_or_else(|| ApiError::not_found(format!("unknown dataset {name}")))
}

/// Kick off a refresh run in the background.
///
/// The definitive contention check is the runner's compare-and-set acquire;
/// the lock read here only gives the caller an immediate 409 for the common
/// case instead of a silently ignored request.
pub(super) async fn trigger_refresh(
    State(state): State<AppState>,
    Query(params): Query<RefreshParams>,
) -> Result<Response, ApiError> {
    let lock_state = lock::read(&state.db_pool).await.map_err(db_error)?;
    if lock_state.is_updating {
        return Err(ApiError::refresh_in_progress());
    }

    let runner = state.runner.clone();
    let scope = params.scope;
    info!(scope = %scope, "manual refresh triggered");
    tokio::spawn(async move {
        match runner.run(scope).await {
            Ok(report) => info!(
                scope = %scope,
                records = report.total_records(),
                failed_targets = report.failures.len(),
                "manual refresh complete"
            ),
            Err(PipelineError::LockContention) => {
                warn!("manual refresh rejected, another run won the lock");
            }
            Err(e) => error!(scope = %scope, error = %e, "manual refresh failed"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "started": true, "scope": scope })),
    )
        .into_response())
}

/// Inspect a staging instance: existence and row count.
pub(super) async fn inspect_staging(
    State(state): State<AppState>,
    Path(dataset_name): Path<String>,
    Query(params): Query<ModeParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let dataset = parse_dataset(&dataset_name, &params)?;
    let records = swap::staging_count(&state.db_pool, dataset)
        .await
        .map_err(db_error)?;
    Ok(Json(json!({
        "dataset": dataset.live(),
        "mode": params.mode,
        "exists": records.is_some(),
        "records": records,
    })))
}

/// Force-promote a staging instance to live.
pub(super) async fn force_promote(
    State(state): State<AppState>,
    Path(dataset_name): Path<String>,
    Query(params): Query<ModeParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let dataset = parse_dataset(&dataset_name, &params)?;
    let promoted = swap::promote(&state.db_pool, dataset)
        .await
        .map_err(db_error)?;
    if promoted {
        warn!(dataset = %dataset, "staging force-promoted by admin");
    }
    Ok(Json(json!({ "dataset": dataset.live(), "promoted": promoted })))
}

/// Drop a staging instance without promoting it.
pub(super) async fn force_cleanup(
    State(state): State<AppState>,
    Path(dataset_name): Path<String>,
    Query(params): Query<ModeParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let dataset = parse_dataset(&dataset_name, &params)?;
    let dropped = swap::cleanup_staging(&state.db_pool, dataset)
        .await
        .map_err(db_error)?;
    if dropped {
        warn!(dataset = %dataset, "staging dropped by admin");
    }
    Ok(Json(json!({ "dataset": dataset.live(), "dropped": dropped })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationBody {
    pub source_name: String,
    pub localized_name: String,
}

/// Add or update a translation entry, then reload the in-memory cache so the
/// next run (and reapply) picks it up.
pub(super) async fn upsert_translation(
    State(state): State<AppState>,
    Json(body): Json<TranslationBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.source_name.trim().is_empty() || body.localized_name.trim().is_empty() {
        return Err(ApiError::bad_request(
            "sourceName and localizedName must be non-empty",
        ));
    }

    translations::upsert(&state.db_pool, body.source_name.trim(), body.localized_name.trim())
        .await
        .map_err(db_error)?;
    let entries = state
        .load_translation_cache()
        .await
        .map_err(|e| ApiError::internal(format!("translation cache reload failed: {e:#}")))?;

    Ok(Json(json!({ "ok": true, "entries": entries })))
}

/// Re-localize names in the live datasets from the translation table.
pub(super) async fn reapply_translations(
    State(state): State<AppState>,
    Query(params): Query<ModeParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = translations::reapply(&state.db_pool, params.mode)
        .await
        .map_err(db_error)?;
    info!(mode = %params.mode, rows = updated, "translations reapplied to live datasets");
    Ok(Json(json!({ "mode": params.mode, "updated": updated })))
}
