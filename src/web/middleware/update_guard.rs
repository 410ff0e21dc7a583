//! Reader-side policy while a refresh run holds the update lock.
//!
//! Readers never mutate the lock; this middleware consults it before every
//! read and applies the configured policy: serve the previously published
//! data with an advisory header, or reject with a retryable status until the
//! run completes. A failed lock read fails open.

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::config::LockPolicy;
use crate::data::lock;
use crate::state::AppState;

pub const REFRESHING_HEADER: &str = "x-data-refreshing";

pub async fn update_guard(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let lock_state = match lock::read(&state.db_pool).await {
        Ok(s) => s,
        Err(e) => {
            warn!(error = ?e, "failed to read update lock, serving without guard");
            return next.run(req).await;
        }
    };

    if !lock_state.is_updating {
        return next.run(req).await;
    }

    match state.lock_policy {
        LockPolicy::Reject => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::RETRY_AFTER, "120")],
            Json(json!({
                "error": {
                    "code": "refresh_in_progress",
                    "message": "data refresh in progress, retry shortly"
                }
            })),
        )
            .into_response(),
        LockPolicy::Advisory => {
            let mut response = next.run(req).await;
            response
                .headers_mut()
                .insert(REFRESHING_HEADER, HeaderValue::from_static("true"));
            response
        }
    }
}
