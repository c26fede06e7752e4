use axum::extract::{Request, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::limiter::{Decision, Quota};
use crate::response::RateLimitExceeded;
use crate::server::AppState;

/// Identity used when no forwarding header is present. All such callers
/// share one quota bucket.
pub const SENTINEL_IDENTITY: &str = "unknown";

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Quota snapshot stashed in request extensions on admit, so `/api/status`
/// can report the caller's position.
#[derive(Debug, Clone)]
pub struct CallerQuota {
    pub ip: String,
    pub quota: Quota,
}

/// Pre-handler gate for rate-limited routes.
///
/// Admitted requests continue down the chain and pick up quota headers on
/// the way out. Rejected requests short-circuit into a 429 with a
/// machine-readable `retryAfter`. If the counter store is unreachable the
/// request passes through untouched (fail open) with no quota headers.
pub async fn rate_limit(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = client_identity(request.headers());
    let now_ms = unix_time_ms();

    match state.limiter.evaluate(&identity, now_ms).await {
        Decision::Admit(quota) => {
            debug!(ip = %identity, remaining = quota.remaining, "request admitted");
            request
                .extensions_mut()
                .insert(CallerQuota { ip: identity, quota });

            let mut response = next.run(request).await;
            apply_quota_headers(response.headers_mut(), &quota);
            response
        }
        Decision::Reject {
            quota,
            retry_after_secs,
        } => {
            info!(ip = %identity, retry_after_secs, "request rejected, quota exhausted");
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(RateLimitExceeded::new(retry_after_secs)),
            )
                .into_response();
            apply_quota_headers(response.headers_mut(), &quota);
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
            response
        }
        Decision::FailOpen => next.run(request).await,
    }
}

pub fn apply_quota_headers(headers: &mut HeaderMap, quota: &Quota) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(quota.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(quota.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(quota.reset_epoch_secs()));
}

/// Caller identity from forwarding headers. Extraction never fails a
/// request; anything unusable collapses to [`SENTINEL_IDENTITY`].
pub fn client_identity(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded) = forwarded.to_str() {
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip) = real_ip.to_str() {
            let ip = ip.trim();
            if !ip.is_empty() {
                return ip.to_string();
            }
        }
    }

    SENTINEL_IDENTITY.to_string()
}

pub fn unix_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = client_identity(request.headers());

    info!(
        target: "quotegate::middleware",
        method = %method,
        uri = %uri,
        client_ip = %client_ip,
        "Incoming request"
    );

    let response = next.run(request).await;

    info!(
        target: "quotegate::middleware",
        method = %method,
        uri = %uri,
        status = %response.status(),
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_from_forwarded_header_takes_first_entry() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("192.168.1.1, 10.0.0.1"),
        );
        assert_eq!(client_identity(&headers), "192.168.1.1");
    }

    #[test]
    fn identity_falls_back_to_real_ip_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.1"));
        assert_eq!(client_identity(&headers), "203.0.113.1");
    }

    #[test]
    fn identity_falls_back_to_sentinel() {
        assert_eq!(client_identity(&HeaderMap::new()), SENTINEL_IDENTITY);

        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("  ,10.0.0.1"));
        assert_eq!(client_identity(&headers), SENTINEL_IDENTITY);
    }

    #[test]
    fn quota_headers_round_reset_up_to_epoch_seconds() {
        let mut headers = HeaderMap::new();
        apply_quota_headers(
            &mut headers,
            &Quota {
                limit: 10,
                remaining: 4,
                reset_at_ms: 1_700_000_000_001,
            },
        );

        assert_eq!(headers[&X_RATELIMIT_LIMIT], "10");
        assert_eq!(headers[&X_RATELIMIT_REMAINING], "4");
        assert_eq!(headers[&X_RATELIMIT_RESET], "1700000001");
    }
}
