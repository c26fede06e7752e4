use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::middleware::{unix_time_ms, CallerQuota, SENTINEL_IDENTITY};
use crate::quotes::{Quote, QUOTES};
use crate::response::{HealthResponse, RandomQuotes, RateLimitStatus, ServiceInfo};
use crate::server::AppState;

const MAX_RANDOM_QUOTES: usize = 5;

/// GET /api/quote
pub async fn quote() -> impl IntoResponse {
    let at = rand::thread_rng().gen_range(0..QUOTES.len());
    Json(&QUOTES[at])
}

/// GET /api/quotes/random/:count
pub async fn random_quotes(Path(count): Path<String>) -> impl IntoResponse {
    let count = parse_count(&count);
    let quotes: Vec<&'static Quote> = QUOTES
        .choose_multiple(&mut rand::thread_rng(), count)
        .collect();

    Json(RandomQuotes {
        count: quotes.len(),
        quotes,
    })
}

/// GET /api/status
///
/// The gate middleware stashes the caller's quota in request extensions on
/// admit. When it is absent (fail-open pass-through) the caller is reported
/// at full quota.
pub async fn status(
    State(state): State<AppState>,
    caller: Option<Extension<CallerQuota>>,
) -> impl IntoResponse {
    let policy = state.limiter.policy();

    let body = match caller {
        Some(Extension(caller)) => RateLimitStatus {
            ip: caller.ip,
            remaining: caller.quota.remaining,
            reset_in: caller
                .quota
                .reset_at_ms
                .saturating_sub(unix_time_ms())
                .div_ceil(1000),
            limit: caller.quota.limit,
        },
        None => RateLimitStatus {
            ip: SENTINEL_IDENTITY.to_string(),
            remaining: policy.limit(),
            reset_in: policy.window_seconds(),
            limit: policy.limit(),
        },
    };

    Json(body)
}

/// GET /health, never rate-limited.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse::healthy())
}

/// GET /, service metadata, never rate-limited.
pub async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(ServiceInfo::new(state.limiter.policy()))
}

/// Lenient count parsing: non-numeric or zero collapses to 1, anything
/// above the cap is clamped down to it.
fn parse_count(raw: &str) -> usize {
    raw.trim()
        .parse::<usize>()
        .ok()
        .filter(|count| *count > 0)
        .unwrap_or(1)
        .min(MAX_RANDOM_QUOTES)
}
