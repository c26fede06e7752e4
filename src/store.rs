//! Counter store backends.
//!
//! The limiter only needs a narrow slice of sorted-set behavior: prune by
//! score range, count members, read the oldest entry, insert, and refresh a
//! key TTL. `CounterStore` captures exactly that, with a Valkey/Redis
//! implementation for shared state and an in-process implementation for
//! local mode and tests.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;
use tokio::time;

use crate::error::{Error, Result};

/// Sorted-set operations consumed by the rate limiter. Scores are unix
/// timestamps in milliseconds.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Remove members with scores in `[min, max]` (inclusive). Returns the
    /// number of members removed.
    async fn remove_range_by_score(&self, key: &str, min: u64, max: u64) -> Result<u64>;

    /// Number of members under `key`.
    async fn count(&self, key: &str) -> Result<u64>;

    /// Members with scores for the index range `[start, stop]`, redis-style:
    /// inclusive on both ends, negative indices count from the end.
    async fn range_with_scores(&self, key: &str, start: i64, stop: i64)
        -> Result<Vec<(String, u64)>>;

    /// Insert `member` with `score`, replacing any existing entry for the
    /// same member.
    async fn add(&self, key: &str, score: u64, member: &str) -> Result<()>;

    /// Refresh the key's time-to-live.
    async fn set_expiry(&self, key: &str, seconds: u64) -> Result<()>;
}

/// Shared counter store over a Valkey/Redis server.
///
/// The connection is opened once at startup and shared by every request;
/// `ConnectionManager` reconnects in the background after a drop, and any
/// operation issued while the link is down errors out (which the limiter
/// turns into a fail-open admit). Every command is bounded by `op_timeout`.
pub struct ValkeyStore {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl ValkeyStore {
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn, op_timeout })
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        self.bounded(async move {
            redis::cmd("PING").query_async::<_, String>(&mut conn).await
        })
        .await?;
        Ok(())
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>> + Send,
    {
        match time::timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::StoreTimeout(self.op_timeout)),
        }
    }
}

#[async_trait]
impl CounterStore for ValkeyStore {
    async fn remove_range_by_score(&self, key: &str, min: u64, max: u64) -> Result<u64> {
        let mut conn = self.conn.clone();
        self.bounded(async move {
            redis::cmd("ZREMRANGEBYSCORE")
                .arg(key)
                .arg(min)
                .arg(max)
                .query_async(&mut conn)
                .await
        })
        .await
    }

    async fn count(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        self.bounded(async move { redis::cmd("ZCARD").arg(key).query_async(&mut conn).await })
            .await
    }

    async fn range_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<(String, u64)>> {
        let mut conn = self.conn.clone();
        self.bounded(async move {
            redis::cmd("ZRANGE")
                .arg(key)
                .arg(start)
                .arg(stop)
                .arg("WITHSCORES")
                .query_async(&mut conn)
                .await
        })
        .await
    }

    async fn add(&self, key: &str, score: u64, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        self.bounded(async move {
            redis::cmd("ZADD")
                .arg(key)
                .arg(score)
                .arg(member)
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await
    }

    async fn set_expiry(&self, key: &str, seconds: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        self.bounded(async move {
            redis::cmd("EXPIRE")
                .arg(key)
                .arg(seconds)
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await
    }
}

/// In-process counter store. Used when no cache connection string is
/// configured and throughout the test suite. Not shared across replicas.
#[derive(Default)]
pub struct MemoryStore {
    keys: Mutex<HashMap<String, SortedSet>>,
}

#[derive(Default)]
struct SortedSet {
    /// Members ordered by `(score, member)`, mirroring sorted-set ordering.
    members: Vec<(u64, String)>,
    expires_at: Option<Instant>,
}

impl SortedSet {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the key if its TTL has lapsed, then hands back whatever is left.
    fn live_entry<'a>(
        keys: &'a mut HashMap<String, SortedSet>,
        key: &str,
    ) -> Option<&'a mut SortedSet> {
        if keys.get(key).map(SortedSet::is_expired).unwrap_or(false) {
            keys.remove(key);
        }
        keys.get_mut(key)
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn remove_range_by_score(&self, key: &str, min: u64, max: u64) -> Result<u64> {
        let mut keys = self.keys.lock().await;
        let Some(set) = MemoryStore::live_entry(&mut keys, key) else {
            return Ok(0);
        };
        let before = set.members.len();
        set.members.retain(|(score, _)| *score < min || *score > max);
        Ok((before - set.members.len()) as u64)
    }

    async fn count(&self, key: &str) -> Result<u64> {
        let mut keys = self.keys.lock().await;
        Ok(MemoryStore::live_entry(&mut keys, key)
            .map(|set| set.members.len() as u64)
            .unwrap_or(0))
    }

    async fn range_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<(String, u64)>> {
        let mut keys = self.keys.lock().await;
        let Some(set) = MemoryStore::live_entry(&mut keys, key) else {
            return Ok(Vec::new());
        };

        let len = set.members.len() as i64;
        let start = if start < 0 { (len + start).max(0) } else { start };
        let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if len == 0 || start > stop || stop < 0 || start >= len {
            return Ok(Vec::new());
        }

        Ok(set.members[start as usize..=stop as usize]
            .iter()
            .map(|(score, member)| (member.clone(), *score))
            .collect())
    }

    async fn add(&self, key: &str, score: u64, member: &str) -> Result<()> {
        let mut keys = self.keys.lock().await;
        let _ = MemoryStore::live_entry(&mut keys, key);
        let set = keys.entry(key.to_string()).or_default();
        set.members.retain(|(_, existing)| existing != member);
        let at = set
            .members
            .partition_point(|(s, m)| (*s, m.as_str()) < (score, member));
        set.members.insert(at, (score, member.to_string()));
        Ok(())
    }

    async fn set_expiry(&self, key: &str, seconds: u64) -> Result<()> {
        let mut keys = self.keys.lock().await;
        if let Some(set) = MemoryStore::live_entry(&mut keys, key) {
            set.expires_at = Some(Instant::now() + Duration::from_secs(seconds));
        }
        Ok(())
    }
}
