use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use crate::settings::RateLimitSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    Allowed,
    /// Over the per-IP quota.
    Limited,
    /// On the temporary block list.
    Blocked,
}

#[async_trait]
pub trait RateGate: Send + Sync {
    /// Counts the request against the caller's window.
    async fn admit(&self, ip: &str) -> Result<GateVerdict>;
    /// Returns `true` when this failure put the IP on the block list.
    async fn record_failure(&self, ip: &str) -> Result<bool>;
    /// Returns `true` when a block was lifted.
    async fn unblock(&self, ip: &str) -> Result<bool>;
    async fn ping(&self) -> Result<()>;
}

fn rate_key(ip: &str) -> String {
    format!("rate:{}", ip)
}

fn failure_key(ip: &str) -> String {
    format!("fail:{}", ip)
}

fn block_key(ip: &str) -> String {
    format!("blocked:{}", ip)
}

/// Counts one failure and starts its expiry in the same transaction.
/// NX keeps the window anchored at the first failure (Redis 7+).
fn failure_pipeline(key: &str, window_secs: u64) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .cmd("INCR")
        .arg(key)
        .cmd("EXPIRE")
        .arg(key)
        .arg(window_secs)
        .arg("NX")
        .ignore();
    pipe
}

/// Sliding-window limiter and IP block list kept in Redis.
#[derive(Clone)]
pub struct RedisRateLimiter {
    conn: ConnectionManager,
    limits: RateLimitSettings,
}

impl RedisRateLimiter {
    pub async fn connect(redis_url: &str, limits: RateLimitSettings) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Invalid REDIS_URL")?;
        let conn = client
            .get_connection_manager()
            .await
            .context("Failed to connect to Redis")?;

        tracing::info!("Redis connected");
        Ok(Self { conn, limits })
    }
}

#[async_trait]
impl RateGate for RedisRateLimiter {
    async fn admit(&self, ip: &str) -> Result<GateVerdict> {
        let mut conn = self.conn.clone();

        let blocked: bool = redis::cmd("EXISTS")
            .arg(block_key(ip))
            .query_async(&mut conn)
            .await
            .context("Redis EXISTS failed")?;
        if blocked {
            return Ok(GateVerdict::Blocked);
        }

        let key = rate_key(ip);
        let now_ms = Utc::now().timestamp_millis();
        let window_start = now_ms - (self.limits.window_secs as i64) * 1000;
        let member = format!("{}-{}", now_ms, Uuid::new_v4().simple());

        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&key)
            .arg(0)
            .arg(window_start)
            .ignore()
            .cmd("ZADD")
            .arg(&key)
            .arg(now_ms)
            .arg(&member)
            .ignore()
            .cmd("ZCARD")
            .arg(&key)
            .cmd("EXPIRE")
            .arg(&key)
            .arg(self.limits.window_secs)
            .ignore()
            .query_async(&mut conn)
            .await
            .context("Redis rate window update failed")?;

        if count > self.limits.requests_per_window {
            return Ok(GateVerdict::Limited);
        }
        Ok(GateVerdict::Allowed)
    }

    async fn record_failure(&self, ip: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let key = failure_key(ip);

        let (failures,): (u64,) = failure_pipeline(&key, self.limits.failure_window_secs)
            .query_async(&mut conn)
            .await
            .context("Redis failure counter update failed")?;

        if failures < self.limits.failure_threshold {
            return Ok(false);
        }

        let _: () = redis::pipe()
            .atomic()
            .cmd("SETEX")
            .arg(block_key(ip))
            .arg(self.limits.block_ttl_secs)
            .arg(failures)
            .ignore()
            .cmd("DEL")
            .arg(&key)
            .ignore()
            .query_async(&mut conn)
            .await
            .context("Redis block write failed")?;

        tracing::warn!(ip, failures, "IP blocked after repeated validation failures");
        Ok(true)
    }

    async fn unblock(&self, ip: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let (removed, _): (u64, u64) = redis::pipe()
            .cmd("DEL")
            .arg(block_key(ip))
            .cmd("DEL")
            .arg(failure_key(ip))
            .query_async(&mut conn)
            .await
            .context("Redis DEL failed")?;
        Ok(removed > 0)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis PING failed")?;
        Ok(())
    }
}
