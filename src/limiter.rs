//! Sliding-window log rate limiter.
//!
//! Every admitted request is recorded as one member of a per-identity sorted
//! set, scored by its arrival time in milliseconds. Evaluation prunes
//! entries older than one window, counts the survivors, and either records
//! the new request or rejects it. The limiter holds no mutable state of its
//! own; the counter store is the only arbiter of concurrent access. Two
//! requests racing the same identity at the window boundary can both observe
//! `count < limit`, so the quota can be exceeded by at most `N - 1` under
//! N-way concurrency. That race is accepted; the store's command atomicity
//! is the only synchronization used.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::CounterStore;

const KEY_PREFIX: &str = "ratelimit:";

/// Process-wide quota configuration. Immutable after startup.
#[derive(Debug, Clone, Copy)]
pub struct QuotaPolicy {
    limit: u32,
    window: Duration,
}

impl QuotaPolicy {
    pub fn new(limit: u32, window: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(Error::Config("rate limit must be greater than 0".into()));
        }
        if window.as_secs() == 0 {
            return Err(Error::Config(
                "rate limit window must be at least one second".into(),
            ));
        }
        Ok(Self { limit, window })
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window_seconds(&self) -> u64 {
        self.window.as_secs()
    }

    pub fn window_ms(&self) -> u64 {
        self.window.as_millis() as u64
    }
}

/// Quota telemetry exposed on every rate-limited response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at_ms: u64,
}

impl Quota {
    /// Reset time as epoch seconds, rounded up (the `X-RateLimit-Reset`
    /// header value).
    pub fn reset_epoch_secs(&self) -> u64 {
        self.reset_at_ms.div_ceil(1000)
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Under quota; the request was recorded.
    Admit(Quota),
    /// Over quota; nothing was recorded.
    Reject {
        quota: Quota,
        retry_after_secs: u64,
    },
    /// The counter store could not be consulted. The request passes without
    /// accounting and without quota telemetry.
    FailOpen,
}

pub struct SlidingWindowLimiter {
    store: Arc<dyn CounterStore>,
    policy: QuotaPolicy,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn CounterStore>, policy: QuotaPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> QuotaPolicy {
        self.policy
    }

    /// Evaluate one request from `identity` arriving at `now_ms`.
    ///
    /// Store failures never escape: any error or timeout downgrades to
    /// [`Decision::FailOpen`], so a limiter outage cannot become a request
    /// outage.
    pub async fn evaluate(&self, identity: &str, now_ms: u64) -> Decision {
        match self.evaluate_strict(identity, now_ms).await {
            Ok(decision) => decision,
            Err(err) => {
                warn!(
                    identity,
                    error = %err,
                    "counter store unavailable, admitting without quota accounting"
                );
                Decision::FailOpen
            }
        }
    }

    async fn evaluate_strict(&self, identity: &str, now_ms: u64) -> Result<Decision> {
        let key = format!("{}{}", KEY_PREFIX, identity);
        let window_ms = self.policy.window_ms();
        let window_start = now_ms.saturating_sub(window_ms);

        // Entries scored at or before `window_start` are one full window old
        // and no longer count against the quota.
        let pruned = self.store.remove_range_by_score(&key, 0, window_start).await?;
        if pruned > 0 {
            debug!(identity, pruned, "expired window entries removed");
        }

        let count = self.store.count(&key).await?;
        let limit = u64::from(self.policy.limit);

        if count >= limit {
            // The oldest surviving entry decides when a slot frees up. It can
            // expire between the count and this read; fall back to a full
            // window from now.
            let oldest = self.store.range_with_scores(&key, 0, 0).await?;
            let reset_at_ms = oldest
                .first()
                .map(|(_, oldest_ms)| *oldest_ms + window_ms)
                .unwrap_or(now_ms + window_ms);
            let retry_after_secs = reset_at_ms.saturating_sub(now_ms).div_ceil(1000);

            return Ok(Decision::Reject {
                quota: Quota {
                    limit: self.policy.limit,
                    remaining: 0,
                    reset_at_ms,
                },
                retry_after_secs,
            });
        }

        // The uuid disambiguates entries landing in the same millisecond.
        let member = format!("{}-{}", now_ms, Uuid::new_v4());
        self.store.add(&key, now_ms, &member).await?;
        self.store
            .set_expiry(&key, self.policy.window_seconds())
            .await?;

        Ok(Decision::Admit(Quota {
            limit: self.policy.limit,
            remaining: self.policy.limit - count as u32 - 1,
            reset_at_ms: now_ms + window_ms,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    const BASE_MS: u64 = 1_700_000_000_000;

    fn limiter_with(store: Arc<dyn CounterStore>, limit: u32, window_secs: u64) -> SlidingWindowLimiter {
        let policy = QuotaPolicy::new(limit, Duration::from_secs(window_secs)).unwrap();
        SlidingWindowLimiter::new(store, policy)
    }

    fn limiter(limit: u32, window_secs: u64) -> SlidingWindowLimiter {
        limiter_with(Arc::new(MemoryStore::new()), limit, window_secs)
    }

    /// Every store operation fails, as if the backend were down.
    struct FailingStore;

    #[async_trait]
    impl CounterStore for FailingStore {
        async fn remove_range_by_score(&self, _: &str, _: u64, _: u64) -> Result<u64> {
            Err(Error::Store("connection refused".into()))
        }
        async fn count(&self, _: &str) -> Result<u64> {
            Err(Error::Store("connection refused".into()))
        }
        async fn range_with_scores(&self, _: &str, _: i64, _: i64) -> Result<Vec<(String, u64)>> {
            Err(Error::Store("connection refused".into()))
        }
        async fn add(&self, _: &str, _: u64, _: &str) -> Result<()> {
            Err(Error::Store("connection refused".into()))
        }
        async fn set_expiry(&self, _: &str, _: u64) -> Result<()> {
            Err(Error::Store("connection refused".into()))
        }
    }

    /// Reports a full window but no readable oldest entry, reproducing the
    /// narrow race where entries expire between the count and the fetch.
    struct VanishingOldestStore;

    #[async_trait]
    impl CounterStore for VanishingOldestStore {
        async fn remove_range_by_score(&self, _: &str, _: u64, _: u64) -> Result<u64> {
            Ok(0)
        }
        async fn count(&self, _: &str) -> Result<u64> {
            Ok(10)
        }
        async fn range_with_scores(&self, _: &str, _: i64, _: i64) -> Result<Vec<(String, u64)>> {
            Ok(Vec::new())
        }
        async fn add(&self, _: &str, _: u64, _: &str) -> Result<()> {
            Ok(())
        }
        async fn set_expiry(&self, _: &str, _: u64) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn admits_up_to_limit_with_decreasing_remaining() {
        let limiter = limiter(10, 60);

        for i in 0..10u64 {
            let now = BASE_MS + i;
            match limiter.evaluate("1.2.3.4", now).await {
                Decision::Admit(quota) => {
                    assert_eq!(quota.limit, 10);
                    assert_eq!(quota.remaining, 9 - i as u32);
                    assert_eq!(quota.reset_at_ms, now + 60_000);
                }
                other => panic!("request {} not admitted: {:?}", i, other),
            }
        }
    }

    #[tokio::test]
    async fn rejects_once_window_is_full() {
        let limiter = limiter(10, 60);

        for i in 0..10u64 {
            limiter.evaluate("1.2.3.4", BASE_MS + i).await;
        }

        let now = BASE_MS + 10;
        match limiter.evaluate("1.2.3.4", now).await {
            Decision::Reject {
                quota,
                retry_after_secs,
            } => {
                // All ten entries sit within the last few milliseconds, so
                // the caller has to wait out nearly the whole window.
                assert_eq!(retry_after_secs, 60);
                assert_eq!(quota.remaining, 0);
                assert_eq!(quota.reset_at_ms, BASE_MS + 60_000);
            }
            other => panic!("expected rejection: {:?}", other),
        }
    }

    #[tokio::test]
    async fn rejection_is_not_recorded() {
        let limiter = limiter(1, 60);

        assert!(matches!(
            limiter.evaluate("1.2.3.4", BASE_MS).await,
            Decision::Admit(_)
        ));

        // Repeated evaluations at the same instant must return identical
        // numbers: pruning is idempotent and rejections write nothing.
        let first = limiter.evaluate("1.2.3.4", BASE_MS + 5).await;
        let second = limiter.evaluate("1.2.3.4", BASE_MS + 5).await;
        assert_eq!(first, second);
        assert!(matches!(first, Decision::Reject { .. }));
    }

    #[tokio::test]
    async fn quota_recovers_after_the_window_passes() {
        let limiter = limiter(10, 60);

        for i in 0..10u64 {
            limiter.evaluate("1.2.3.4", BASE_MS + i).await;
        }
        assert!(matches!(
            limiter.evaluate("1.2.3.4", BASE_MS + 10).await,
            Decision::Reject { .. }
        ));

        match limiter.evaluate("1.2.3.4", BASE_MS + 61_000).await {
            Decision::Admit(quota) => assert_eq!(quota.remaining, 9),
            other => panic!("expected admit after window passed: {:?}", other),
        }
    }

    #[tokio::test]
    async fn identities_do_not_share_quota() {
        let limiter = limiter(2, 60);

        limiter.evaluate("10.0.0.1", BASE_MS).await;
        limiter.evaluate("10.0.0.1", BASE_MS + 1).await;
        assert!(matches!(
            limiter.evaluate("10.0.0.1", BASE_MS + 2).await,
            Decision::Reject { .. }
        ));

        match limiter.evaluate("10.0.0.2", BASE_MS + 3).await {
            Decision::Admit(quota) => assert_eq!(quota.remaining, 1),
            other => panic!("identity B affected by identity A: {:?}", other),
        }
    }

    #[tokio::test]
    async fn entry_exactly_one_window_old_is_expired() {
        let store = Arc::new(MemoryStore::new());
        store
            .add("ratelimit:1.2.3.4", BASE_MS, "old-entry")
            .await
            .unwrap();

        let limiter = limiter_with(store, 10, 60);

        // window_start == BASE_MS: the boundary entry no longer counts.
        match limiter.evaluate("1.2.3.4", BASE_MS + 60_000).await {
            Decision::Admit(quota) => assert_eq!(quota.remaining, 9),
            other => panic!("boundary entry still counted: {:?}", other),
        }
    }

    #[tokio::test]
    async fn reset_falls_back_to_full_window_when_oldest_entry_missing() {
        let limiter = limiter_with(Arc::new(VanishingOldestStore), 10, 60);

        match limiter.evaluate("1.2.3.4", BASE_MS).await {
            Decision::Reject {
                quota,
                retry_after_secs,
            } => {
                assert_eq!(quota.reset_at_ms, BASE_MS + 60_000);
                assert_eq!(retry_after_secs, 60);
            }
            other => panic!("expected rejection: {:?}", other),
        }
    }

    #[tokio::test]
    async fn store_failure_fails_open() {
        let limiter = limiter_with(Arc::new(FailingStore), 10, 60);
        assert_eq!(
            limiter.evaluate("1.2.3.4", BASE_MS).await,
            Decision::FailOpen
        );
    }

    #[test]
    fn policy_rejects_zero_values() {
        assert!(QuotaPolicy::new(0, Duration::from_secs(60)).is_err());
        assert!(QuotaPolicy::new(10, Duration::from_secs(0)).is_err());
        assert!(QuotaPolicy::new(10, Duration::from_millis(500)).is_err());
    }

    #[test]
    fn reset_header_rounds_up_to_whole_seconds() {
        let quota = Quota {
            limit: 10,
            remaining: 3,
            reset_at_ms: 1_700_000_000_500,
        };
        assert_eq!(quota.reset_epoch_secs(), 1_700_000_001);
    }
}
