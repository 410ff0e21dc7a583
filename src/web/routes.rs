//! Web API router construction and shared response utilities.

use axum::http::HeaderValue;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Router};
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;

use crate::state::AppState;
use crate::web::middleware::rate_limit;
use crate::web::middleware::request_id::RequestIdLayer;
use crate::web::middleware::update_guard;
use crate::web::{admin, decks, status};

/// Cache-Control presets for public endpoints.
pub mod cache {
    /// Bracket-grouped list projections refreshed at most daily.
    pub const SEARCH: &str = "public, max-age=60, s-maxage=300, stale-while-revalidate=120";
    /// Per-archetype / per-deck detail projections.
    pub const DETAIL: &str = "public, max-age=60, s-maxage=300, stale-while-revalidate=120";
}

/// Wraps a JSON response with a `Cache-Control` header.
pub fn with_cache_control<T: serde::Serialize>(value: T, header: &'static str) -> Response {
    let mut response = Json(value).into_response();
    response.headers_mut().insert(
        axum::http::header::CACHE_CONTROL,
        HeaderValue::from_static(header),
    );
    response
}

/// Creates the web server router.
pub fn create_router(app_state: AppState) -> Router {
    // Read projections go through the update guard; admin and status do not.
    let read_router = Router::new()
        .route("/decks", get(decks::decks))
        .route("/archetypes", get(decks::archetypes))
        .route("/card-stats", get(decks::card_stats))
        .route("/archetype-decks", get(decks::archetype_decks))
        .route("/deck-matchups", get(decks::deck_matchups))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            update_guard::update_guard,
        ))
        .with_state(app_state.clone());

    let admin_router = Router::new()
        .route("/admin/refresh", post(admin::trigger_refresh))
        .route(
            "/admin/staging/{dataset}",
            get(admin::inspect_staging).delete(admin::force_cleanup),
        )
        .route(
            "/admin/staging/{dataset}/promote",
            post(admin::force_promote),
        )
        .route("/admin/translations", post(admin::upsert_translation))
        .route(
            "/admin/translations/reapply",
            post(admin::reapply_translations),
        )
        .with_state(app_state.clone());

    let status_router = Router::new()
        .route("/health", get(status::health))
        .route("/status", get(status::status))
        .with_state(app_state);

    Router::new()
        .nest("/api", read_router.merge(admin_router).merge(status_router))
        .layer(axum_middleware::from_fn(rate_limit::rate_limit))
        .layer(RequestIdLayer)
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}
