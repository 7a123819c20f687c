//! Rate Limiter
//!
//! Distributed sliding-window rate limiting over shared KV counters.
//!
//! # Algorithm
//!
//! Time is cut into buckets of `period`. A request increments the counter of
//! the current bucket and reads the counters of the buckets that still fall
//! inside `expiration`; the request is rejected when their sum exceeds
//! `limit`. Every tag of one request is checked in a single pipelined round
//! trip, and atomicity comes from Redis `INCR` alone.
//!
//! Counter keys: `{prefix}:{tag key}:{tag value}:{base36(bucket)}`, each
//! expiring one second after its own period.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::infrastructure::cache::{keys, CounterOp, KvStore};
use crate::infrastructure::metrics;
use crate::shared::clock::Clock;
use crate::shared::error::AppError;

/// Limit of one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    /// Requests allowed inside the window
    pub limit: i64,
    /// Bucket width
    pub period: Duration,
    /// Window length; rounded up to whole periods
    pub expiration: Duration,
}

impl Limit {
    fn period_ms(&self) -> i64 {
        (self.period.as_millis() as i64).max(1)
    }

    /// Number of buckets before the current one that still count.
    fn lookback(&self) -> i64 {
        let period = self.period_ms();
        let expiration = self.expiration.as_millis() as i64;
        ((expiration + period - 1) / period - 1).max(0)
    }
}

/// One dimension a request is counted under, e.g. `("ip", "10.0.0.1")`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
    pub limit: Limit,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>, limit: Limit) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            limit,
        }
    }
}

/// Rate limiter errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limited on {tag} until {retry_at}")]
    Limited {
        tag: String,
        retry_at: DateTime<Utc>,
    },

    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<RateLimitError> for AppError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Limited { retry_at, .. } => AppError::RateLimited { retry_at },
            RateLimitError::Store(e) => e,
        }
    }
}

/// Sliding-window limiter over a [`KvStore`].
#[derive(Clone)]
pub struct RateLimiter {
    kv: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    prefix: String,
}

impl RateLimiter {
    pub fn new(kv: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            kv,
            clock,
            prefix: keys::RATE_LIMIT.to_string(),
        }
    }

    /// A limiter on the same store whose keys are nested under `name`.
    pub fn namespace(&self, name: &str) -> Self {
        Self {
            kv: self.kv.clone(),
            clock: self.clock.clone(),
            prefix: format!("{}:{}", self.prefix, name),
        }
    }

    fn key(&self, tag: &Tag, bucket: i64) -> String {
        format!("{}:{}:{}:{}", self.prefix, tag.key, tag.value, base36(bucket))
    }

    /// Count one request under every tag and reject it if any tag is over
    /// its limit. Tags with an empty value are skipped.
    #[instrument(skip(self, tags), fields(tags = tags.len()), level = "debug")]
    pub async fn check(&self, tags: &[Tag]) -> Result<(), RateLimitError> {
        let tags: Vec<&Tag> = tags.iter().filter(|t| !t.value.is_empty()).collect();
        if tags.is_empty() {
            return Ok(());
        }

        let now_ms = self.clock.now().timestamp_millis().max(0);
        let mut ops = Vec::new();
        let mut plan = Vec::with_capacity(tags.len());

        for tag in &tags {
            let period_ms = tag.limit.period_ms();
            let bucket = now_ms / period_ms;
            let lookback = tag.limit.lookback();

            ops.push(CounterOp::Incr {
                key: self.key(tag, bucket),
                ttl: tag.limit.period + Duration::from_secs(1),
            });
            for back in 1..=lookback {
                if bucket - back < 0 {
                    break;
                }
                ops.push(CounterOp::Get {
                    key: self.key(tag, bucket - back),
                });
            }

            plan.push((tag, bucket, 1 + lookback.min(bucket) as usize));
        }

        let values = self.kv.counters(&ops).await?;

        let mut offset = 0;
        for (tag, bucket, count) in plan {
            let sum: i64 = values.iter().skip(offset).take(count).sum();
            offset += count;

            if sum > tag.limit.limit {
                let retry_ms = (bucket + 1) * tag.limit.period_ms();
                let retry_at =
                    DateTime::from_timestamp_millis(retry_ms).unwrap_or_else(|| self.clock.now());
                debug!(tag = %tag.key, sum, limit = tag.limit.limit, "Rate limit exceeded");
                metrics::record_rate_limit_rejection(&tag.key);
                return Err(RateLimitError::Limited {
                    tag: tag.key.clone(),
                    retry_at,
                });
            }
        }

        Ok(())
    }
}

/// Lowercase base-36 rendering of a non-negative bucket number.
fn base36(mut n: i64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if n <= 0 {
        return "0".into();
    }

    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
