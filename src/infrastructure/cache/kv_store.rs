//! Key-Value Store
//!
//! The narrow KV surface used by presence tracking and rate limiting, with
//! a Redis implementation.
//!
//! Only three primitives are needed: TTL'd writes, pipelined multi-gets, and
//! pipelined counter increments with expiry. Everything that must be atomic
//! relies on Redis `INCR`/`EXPIRE` rather than client-side locking.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, instrument};

use crate::shared::error::AppError;

/// One counter operation inside a pipelined batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterOp {
    /// Increment by one and (re)set the expiry.
    Incr { key: String, ttl: Duration },
    /// Read without modifying. A missing key reads as 0.
    Get { key: String },
}

/// KV operations shared by presence and rate limiting.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Set `key` to `value`, expiring after `ttl`. Any previous TTL is replaced.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AppError>;

    /// Fetch all `keys` in one round trip. Missing or expired keys are `None`.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, AppError>;

    /// Returns true if the key existed.
    async fn delete(&self, key: &str) -> Result<bool, AppError>;

    /// Run all counter operations in one round trip, returning one value per
    /// operation in order.
    async fn counters(&self, ops: &[CounterOp]) -> Result<Vec<i64>, AppError>;
}

/// Redis-backed KV store.
#[derive(Clone)]
pub struct RedisKvStore {
    conn: ConnectionManager,
    prefix: Option<Arc<str>>,
}

impl RedisKvStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn, prefix: None }
    }

    /// All keys will be prefixed, e.g. `"chat:v1:"`.
    pub fn with_prefix(conn: ConnectionManager, prefix: impl Into<Arc<str>>) -> Self {
        Self {
            conn,
            prefix: Some(prefix.into()),
        }
    }

    fn format_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, key),
            None => key.to_string(),
        }
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    #[instrument(skip(self, value), level = "debug")]
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        let _: () = conn.set_ex(&full_key, value, ttl.as_secs().max(1)).await?;
        debug!(key = %full_key, ttl_secs = ttl.as_secs(), "KV set");

        Ok(())
    }

    #[instrument(skip(self, keys), fields(count = keys.len()), level = "debug")]
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, AppError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let full_keys: Vec<String> = keys.iter().map(|k| self.format_key(k)).collect();
        let mut conn = self.conn.clone();

        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&full_keys)
            .query_async(&mut conn)
            .await?;

        Ok(values)
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let full_key = self.format_key(key);
        let mut conn = self.conn.clone();

        let deleted: i64 = conn.del(&full_key).await?;
        Ok(deleted > 0)
    }

    #[instrument(skip(self, ops), fields(count = ops.len()), level = "debug")]
    async fn counters(&self, ops: &[CounterOp]) -> Result<Vec<i64>, AppError> {
        if ops.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();

        for op in ops {
            match op {
                CounterOp::Incr { key, ttl } => {
                    let full_key = self.format_key(key);
                    pipe.incr(&full_key, 1i64);
                    pipe.expire(&full_key, ttl.as_secs() as i64).ignore();
                }
                CounterOp::Get { key } => {
                    pipe.get(self.format_key(key));
                }
            }
        }

        let mut conn = self.conn.clone();
        let values: Vec<Option<i64>> = pipe.query_async(&mut conn).await?;

        Ok(values.into_iter().map(|v| v.unwrap_or(0)).collect())
    }
}

impl std::fmt::Debug for RedisKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKvStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
