//! Event Streams
//!
//! Partitioned, at-least-once domain event transport built on Redis Streams.
//!
//! Each subject is split into `partitions` streams (`events.{subject}.{n}`).
//! Publishers route by a partition key so that all events about one entity
//! land, in order, on one stream. Consumers read through a consumer group:
//!
//! 1. Entries left unacknowledged for longer than `ack_wait` are reclaimed
//!    with `XAUTOCLAIM` and handed out again, which increments their
//!    delivery count.
//! 2. Otherwise new entries are read with `XREADGROUP ... >`.
//!
//! Once an entry has been delivered more than `max_deliver` times the
//! configured [`ExhaustedPolicy`] decides its fate.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamPendingCountReply,
    StreamReadOptions, StreamReadReply,
};
use redis::AsyncCommands;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::infrastructure::cache::keys;
use crate::shared::error::AppError;

/// What happens to an entry that exceeded the maximum delivery count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustedPolicy {
    /// Copy it to `{stream}.dlq` and acknowledge it.
    #[default]
    DeadLetter,
    /// Acknowledge it without further processing.
    Drop,
    /// Leave it pending; it keeps being reclaimed and reported.
    Retain,
}

/// Consumer tuning.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub partitions: u32,
    pub ack_wait: Duration,
    pub max_deliver: u32,
    pub batch_size: usize,
    pub block: Duration,
    pub exhausted: ExhaustedPolicy,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            partitions: 1,
            ack_wait: Duration::from_secs(15),
            max_deliver: 30,
            batch_size: 32,
            block: Duration::from_secs(2),
            exhausted: ExhaustedPolicy::default(),
        }
    }
}

/// One delivery attempt of one stream entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub stream: String,
    pub id: String,
    pub key: String,
    pub payload: Vec<u8>,
    /// 1 for the first delivery
    pub attempt: u32,
}

/// Appends events to a subject.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, subject: &str, key: &str, payload: &[u8]) -> Result<(), AppError>;
}

/// Pulls deliveries from a subject.
///
/// Deliveries that are not acknowledged are redelivered by the transport.
#[async_trait]
pub trait EventConsumer: Send {
    /// Wait for the next batch. An empty batch means nothing arrived in time.
    async fn fetch(&mut self) -> Result<Vec<Delivery>, AppError>;

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), AppError>;
}

/// Partition of `key` among `partitions` streams.
pub fn partition_of(key: &str, partitions: u32) -> u32 {
    if partitions <= 1 {
        return 0;
    }
    let digest = Sha256::digest(key.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) % partitions
}

/// `XADD` publisher.
#[derive(Clone)]
pub struct RedisEventPublisher {
    conn: ConnectionManager,
    partitions: u32,
}

impl RedisEventPublisher {
    pub fn new(conn: ConnectionManager, partitions: u32) -> Self {
        Self {
            conn,
            partitions: partitions.max(1),
        }
    }
}

#[async_trait]
impl EventPublisher for RedisEventPublisher {
    #[instrument(skip(self, payload), level = "debug")]
    async fn publish(&self, subject: &str, key: &str, payload: &[u8]) -> Result<(), AppError> {
        let stream = keys::event_stream(subject, partition_of(key, self.partitions));
        let mut conn = self.conn.clone();

        let id: String = conn
            .xadd(&stream, "*", &[("key", key.as_bytes()), ("data", payload)])
            .await?;
        debug!(stream = %stream, id = %id, "Event appended");

        Ok(())
    }
}

/// Consumer-group reader over every partition of one subject.
///
/// Give each consumer its own connection: `XREADGROUP ... BLOCK` holds the
/// connection for up to `block`.
pub struct RedisStreamConsumer {
    conn: ConnectionManager,
    streams: Vec<String>,
    group: String,
    consumer: String,
    opts: StreamOptions,
}

impl RedisStreamConsumer {
    /// Join (creating if needed) consumer group `group` on all partitions
    /// of `subject`.
    #[instrument(skip(conn, opts))]
    pub async fn bind(
        conn: ConnectionManager,
        subject: &str,
        group: &str,
        opts: StreamOptions,
    ) -> Result<Self, AppError> {
        let streams: Vec<String> = (0..opts.partitions.max(1))
            .map(|p| keys::event_stream(subject, p))
            .collect();

        let mut c = conn.clone();
        for stream in &streams {
            let created: redis::RedisResult<()> =
                c.xgroup_create_mkstream(stream, group, "0").await;
            match created {
                Ok(()) => info!(stream = %stream, group, "Consumer group created"),
                Err(e) if e.code() == Some("BUSYGROUP") => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Self {
            conn,
            streams,
            group: group.to_string(),
            consumer: format!("{}-{}", group, Uuid::new_v4().simple()),
            opts,
        })
    }

    async fn reclaim(&mut self) -> Result<Vec<Delivery>, AppError> {
        let mut out = Vec::new();
        let min_idle = self.opts.ack_wait.as_millis() as usize;

        for stream in self.streams.clone() {
            let options = StreamAutoClaimOptions::default().count(self.opts.batch_size);
            let reply: StreamAutoClaimReply = self
                .conn
                .xautoclaim_options(&stream, &self.group, &self.consumer, min_idle, "0-0", options)
                .await?;

            for entry in reply.claimed {
                let attempt = self.delivery_count(&stream, &entry.id).await?;
                if attempt > self.opts.max_deliver {
                    self.exhaust(&stream, &entry, attempt).await?;
                    continue;
                }
                warn!(stream = %stream, id = %entry.id, attempt, "Redelivering event");
                out.push(to_delivery(&stream, entry, attempt));
            }
        }

        Ok(out)
    }

    async fn delivery_count(&mut self, stream: &str, id: &str) -> Result<u32, AppError> {
        let pending: StreamPendingCountReply = self
            .conn
            .xpending_count(stream, &self.group, id, id, 1)
            .await?;

        Ok(pending
            .ids
            .first()
            .map(|p| p.times_delivered as u32)
            .unwrap_or(1))
    }

    async fn exhaust(&mut self, stream: &str, entry: &StreamId, attempt: u32) -> Result<(), AppError> {
        error!(
            stream = %stream,
            id = %entry.id,
            attempt,
            policy = ?self.opts.exhausted,
            "Event exceeded maximum deliveries"
        );

        match self.opts.exhausted {
            ExhaustedPolicy::DeadLetter => {
                let key: Vec<u8> = entry.get("key").unwrap_or_default();
                let data: Vec<u8> = entry.get("data").unwrap_or_default();
                let dlq = format!("{}.dlq", stream);
                let _: String = self
                    .conn
                    .xadd(
                        &dlq,
                        "*",
                        &[
                            ("key", key),
                            ("data", data),
                            ("origin", entry.id.clone().into_bytes()),
                        ],
                    )
                    .await?;
                let _: i64 = self.conn.xack(stream, &self.group, &[&entry.id]).await?;
            }
            ExhaustedPolicy::Drop => {
                let _: i64 = self.conn.xack(stream, &self.group, &[&entry.id]).await?;
            }
            ExhaustedPolicy::Retain => {}
        }

        Ok(())
    }
}

#[async_trait]
impl EventConsumer for RedisStreamConsumer {
    async fn fetch(&mut self) -> Result<Vec<Delivery>, AppError> {
        let reclaimed = self.reclaim().await?;
        if !reclaimed.is_empty() {
            return Ok(reclaimed);
        }

        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(self.opts.batch_size)
            .block(self.opts.block.as_millis() as usize);
        let ids = vec![">"; self.streams.len()];

        let reply: Option<StreamReadReply> = self
            .conn
            .xread_options(&self.streams, &ids, &options)
            .await?;

        Ok(reply
            .map(|r| {
                r.keys
                    .into_iter()
                    .flat_map(|k| {
                        let stream = k.key;
                        k.ids
                            .into_iter()
                            .map(move |entry| to_delivery(&stream, entry, 1))
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), AppError> {
        let _: i64 = self
            .conn
            .xack(&delivery.stream, &self.group, &[&delivery.id])
            .await?;
        Ok(())
    }
}

fn to_delivery(stream: &str, entry: StreamId, attempt: u32) -> Delivery {
    let key: String = entry.get("key").unwrap_or_default();
    let payload: Vec<u8> = entry.get("data").unwrap_or_default();
    Delivery {
        stream: stream.to_string(),
        id: entry.id,
        key,
        payload,
        attempt,
    }
}
