//! Rate limiter tests over the shared KV store

use std::time::Duration;

use chat_core::application::services::{Limit, RateLimitError, Tag};

use crate::common::Harness;

fn limit(limit: i64) -> Limit {
    Limit {
        limit,
        period: Duration::from_secs(10),
        expiration: Duration::from_secs(30),
    }
}

/// The limit holds over the trailing window, then frees up
#[tokio::test]
async fn test_limit_over_trailing_window() {
    // Arrange
    let harness = Harness::new();
    let limiter = harness.services.rate_limiter.namespace("login");
    let tags = [Tag::new("ip", "203.0.113.9", limit(3))];

    // Act
    for _ in 0..3 {
        limiter.check(&tags).await.unwrap();
        harness.advance(5);
    }
    let rejected = limiter.check(&tags).await;

    // Assert
    match rejected {
        Err(RateLimitError::Limited { tag, retry_at }) => {
            assert_eq!(tag, "ip");
            assert_eq!(retry_at.timestamp() % 10, 0);
            assert!(retry_at > crate::common::start_time());
        }
        other => panic!("expected a limit, got {:?}", other.err()),
    }

    harness.advance(40);
    assert!(limiter.check(&tags).await.is_ok());
}

/// Counters live under the limiter's namespace and one round trip is made
/// per check
#[tokio::test]
async fn test_namespaces_are_isolated() {
    let harness = Harness::new();
    let login = harness.services.rate_limiter.namespace("login");
    let upload = harness.services.rate_limiter.namespace("upload");
    let tags = [Tag::new("user", "amy", limit(1))];

    login.check(&tags).await.unwrap();
    upload.check(&tags).await.unwrap();
    assert!(login.check(&tags).await.is_err());

    assert_eq!(*harness.kv.counter_calls.lock(), 3);
    let keys = harness.kv.counter_keys();
    assert!(keys.iter().any(|k| k.starts_with("rl:login:user:amy:")));
    assert!(keys.iter().any(|k| k.starts_with("rl:upload:user:amy:")));
}
