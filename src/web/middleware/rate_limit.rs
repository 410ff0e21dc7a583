//! Inbound per-IP rate limiting.
//!
//! Two keyed token buckets: a general per-IP budget for all public endpoints,
//! and a tighter budget for the expensive detail endpoints (matchups and
//! archetype deck lists), which fan out to the largest queries. Admin and
//! health endpoints are exempt. The client IP is taken from the first entry
//! of `X-Forwarded-For` when present, else from the socket address.

use axum::extract::{ConnectInfo, Request};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::LazyLock;
use tracing::warn;

const GENERAL_PER_MINUTE: u32 = 120;
const DETAIL_PER_MINUTE: u32 = 30;

static GENERAL: LazyLock<DefaultKeyedRateLimiter<IpAddr>> = LazyLock::new(|| {
    RateLimiter::keyed(Quota::per_minute(
        NonZeroU32::new(GENERAL_PER_MINUTE).unwrap(),
    ))
});

static DETAIL: LazyLock<DefaultKeyedRateLimiter<IpAddr>> = LazyLock::new(|| {
    RateLimiter::keyed(Quota::per_minute(
        NonZeroU32::new(DETAIL_PER_MINUTE).unwrap(),
    ))
});

fn is_exempt(path: &str) -> bool {
    path.starts_with("/api/admin") || path == "/api/health" || path == "/api/status"
}

fn is_detail_endpoint(path: &str) -> bool {
    path == "/api/deck-matchups" || path == "/api/archetype-decks"
}

/// First IP in an `X-Forwarded-For` header value, if it parses.
fn forwarded_ip(value: &str) -> Option<IpAddr> {
    value.split(',').next()?.trim().parse().ok()
}

fn client_ip(req: &Request) -> Option<IpAddr> {
    if let Some(ip) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(forwarded_ip)
    {
        return Some(ip);
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
}

pub async fn rate_limit(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if is_exempt(&path) {
        return next.run(req).await;
    }

    let Some(ip) = client_ip(&req) else {
        return next.run(req).await;
    };

    let limited = GENERAL.check_key(&ip).is_err()
        || (is_detail_endpoint(&path) && DETAIL.check_key(&ip).is_err());
    if limited {
        warn!(ip = %ip, path = %path, "rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, "60")],
            Json(json!({
                "error": { "code": "rate_limited", "message": "too many requests" }
            })),
        )
            .into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_endpoints_classified() {
        assert!(is_detail_endpoint("/api/deck-matchups"));
        assert!(is_detail_endpoint("/api/archetype-decks"));
        assert!(!is_detail_endpoint("/api/decks"));
    }

    #[test]
    fn admin_and_health_exempt() {
        assert!(is_exempt("/api/admin/refresh"));
        assert!(is_exempt("/api/health"));
        assert!(!is_exempt("/api/decks"));
    }

    #[test]
    fn forwarded_for_takes_first_client_ip() {
        assert_eq!(
            forwarded_ip("203.0.113.9, 198.51.100.2"),
            Some("203.0.113.9".parse().unwrap())
        );
        assert_eq!(forwarded_ip("not-an-ip"), None);
    }
}
