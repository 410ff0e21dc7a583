//! Health and status handlers.

use axum::extract::State;
use axum::response::Json;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::trace;

use crate::data::lock::{self, LockState};
use crate::state::{AppState, ServiceStatus};
use crate::web::error::{db_error, ApiError};

#[derive(Serialize)]
pub struct StatusResponse {
    status: ServiceStatus,
    version: String,
    commit: String,
    services: BTreeMap<String, ServiceStatus>,
    lock: LockState,
}

/// Health check endpoint
pub(super) async fn health() -> Json<Value> {
    trace!("health check requested");
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Service status, including the refresh lock readers consult.
pub(super) async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let lock = lock::read(&state.db_pool).await.map_err(db_error)?;

    let services: BTreeMap<String, ServiceStatus> =
        state.service_statuses.all().into_iter().collect();
    let status = if services.values().any(|s| *s == ServiceStatus::Error) {
        ServiceStatus::Error
    } else {
        ServiceStatus::Active
    };

    Ok(Json(StatusResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: env!("GIT_COMMIT_SHORT").to_string(),
        services,
        lock,
    }))
}
