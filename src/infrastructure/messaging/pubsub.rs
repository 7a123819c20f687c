//! Pub/Sub Publisher
//!
//! Live notifications are pushed to per-user private channels. Delivery is
//! fire-and-forget: a subscriber that is not listening misses the message.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{instrument, trace};

use crate::shared::error::AppError;

/// Publishes a payload on a named channel.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), AppError>;
}

/// Redis `PUBLISH` implementation.
#[derive(Clone)]
pub struct RedisPublisher {
    conn: ConnectionManager,
}

impl RedisPublisher {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Publisher for RedisPublisher {
    #[instrument(skip(self, payload), fields(bytes = payload.len()), level = "debug")]
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(channel, payload).await?;
        trace!(channel, receivers, "Published");
        Ok(())
    }
}
