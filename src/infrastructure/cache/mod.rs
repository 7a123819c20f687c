//! Cache Module
//!
//! Redis connection management and the KV store used for ephemeral state.
//!
//! This module provides:
//! - Redis connection management with automatic reconnection
//! - The `KvStore` trait and its `RedisKvStore` implementation
//! - Predefined key builders for consistent key naming
//!
//! # Architecture
//!
//! ```text
//! +------------------------------+
//! | PresenceTracker  RateLimiter |
//! +------------------------------+
//!          |
//!          v
//! +-------------------+
//! |   KvStore Trait   |  <-- Abstract interface
//! +-------------------+
//!          |
//!          v
//! +-------------------+
//! |   RedisKvStore    |  <-- Concrete implementation
//! +-------------------+
//!          |
//!          v
//! +-------------------+
//! | ConnectionManager |  <-- Shared Redis connection
//! +-------------------+
//! ```

mod kv_store;

pub use kv_store::{CounterOp, KvStore, RedisKvStore};

use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{info, instrument};

use crate::config::RedisSettings;

/// Creates a Redis connection manager with automatic reconnection.
///
/// The connection manager handles reconnection when the connection is
/// lost; clones share the same underlying multiplexed connection.
#[instrument(skip(settings), fields(url = %settings.url))]
pub async fn create_redis_client(
    settings: &RedisSettings,
) -> Result<ConnectionManager, redis::RedisError> {
    info!("Connecting to Redis...");
    let client = Client::open(settings.url.as_str())?;
    let manager = ConnectionManager::new(client).await?;
    info!("Redis connection established");
    Ok(manager)
}

/// Key builders for the KV and pub/sub keyspaces.
pub mod keys {
    /// Prefix for user presence (e.g., "presence:user_id")
    pub const USER_PRESENCE: &str = "presence:";

    /// Root prefix for rate limiting counters
    pub const RATE_LIMIT: &str = "rl";

    /// Prefix for per-user private pub/sub channels (e.g., "user.user_id")
    pub const USER_CHANNEL: &str = "user.";

    /// Prefix for event streams (e.g., "events.friends.0")
    pub const EVENT_STREAM: &str = "events.";

    /// Generates a presence key for a user
    #[inline]
    pub fn presence(user_id: impl std::fmt::Display) -> String {
        format!("{}{}", USER_PRESENCE, user_id)
    }

    /// Generates a user's private channel name
    #[inline]
    pub fn user_channel(user_id: impl std::fmt::Display) -> String {
        format!("{}{}", USER_CHANNEL, user_id)
    }

    /// Generates the stream name of one partition of a subject
    #[inline]
    pub fn event_stream(subject: &str, partition: u32) -> String {
        format!("{}{}.{}", EVENT_STREAM, subject, partition)
    }

}
