//! Messaging Module
//!
//! Transports between this process and the outside world:
//!
//! - **pubsub**: per-user live notification channels (Redis `PUBLISH`)
//! - **event_stream**: partitioned, at-least-once domain event streams
//!   (Redis Streams with consumer groups)

pub mod event_stream;
pub mod pubsub;

pub use event_stream::{
    Delivery, EventConsumer, EventPublisher, ExhaustedPolicy, RedisEventPublisher,
    RedisStreamConsumer, StreamOptions,
};
pub use pubsub::{Publisher, RedisPublisher};
