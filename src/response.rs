use serde::Serialize;

use crate::limiter::QuotaPolicy;
use crate::quotes::Quote;

/// Body of a 429 response.
#[derive(Debug, Serialize)]
pub struct RateLimitExceeded {
    pub error: &'static str,
    #[serde(rename = "retryAfter")]
    pub retry_after: u64,
}

impl RateLimitExceeded {
    pub fn new(retry_after: u64) -> Self {
        Self {
            error: "Too many requests",
            retry_after,
        }
    }
}

/// Body of `/api/status`.
#[derive(Debug, Serialize)]
pub struct RateLimitStatus {
    pub ip: String,
    pub remaining: u32,
    #[serde(rename = "resetIn")]
    pub reset_in: u64,
    pub limit: u32,
}

/// Body of `/health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self { status: "healthy" }
    }
}

/// Body of `/api/quotes/random/:count`.
#[derive(Debug, Serialize)]
pub struct RandomQuotes {
    pub count: usize,
    pub quotes: Vec<&'static Quote>,
}

/// Service metadata served at the root.
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub endpoints: Endpoints,
    #[serde(rename = "rateLimit")]
    pub rate_limit: PolicyInfo,
}

#[derive(Debug, Serialize)]
pub struct Endpoints {
    pub quote: &'static str,
    pub status: &'static str,
    #[serde(rename = "multipleQuotes")]
    pub multiple_quotes: &'static str,
    pub health: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PolicyInfo {
    pub limit: u32,
    #[serde(rename = "windowSeconds")]
    pub window_seconds: u64,
}

impl ServiceInfo {
    pub fn new(policy: QuotaPolicy) -> Self {
        Self {
            name: "Quotegate Rate Limiter API",
            endpoints: Endpoints {
                quote: "/api/quote",
                status: "/api/status",
                multiple_quotes: "/api/quotes/random/:count",
                health: "/health",
            },
            rate_limit: PolicyInfo {
                limit: policy.limit(),
                window_seconds: policy.window_seconds(),
            },
        }
    }
}
