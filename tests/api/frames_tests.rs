//! Client Frame API Tests

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::json;

use chat_core::domain::LocationFilter;

use crate::common::{rate_limits, Harness};

fn user_header() -> HeaderName {
    HeaderName::from_static("x-user-id")
}

fn server(harness: &Harness, user_limit: i64) -> TestServer {
    TestServer::new(harness.router(&rate_limits(100, user_limit, 100))).unwrap()
}

/// Frames are rejected without an identity
#[tokio::test]
async fn test_frame_requires_identity() {
    let harness = Harness::new();
    let server = server(&harness, 100);

    let response = server
        .post("/v1/frames")
        .json(&json!({"op": "presence", "d": {"location": "dm"}}))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

/// A presence ping records the sender's location
#[tokio::test]
async fn test_presence_ping_sets_presence() {
    // Arrange
    let harness = Harness::new();
    let server = server(&harness, 100);

    // Act
    let response = server
        .post("/v1/frames")
        .add_header(user_header(), HeaderValue::from_static("alice"))
        .json(&json!({"op": "presence", "d": {"location": "dm"}}))
        .await;

    // Assert
    response.assert_status(StatusCode::NO_CONTENT);
    let online = harness
        .services
        .presence
        .get_presence(&LocationFilter::Any, &["alice".to_string()])
        .await
        .unwrap();
    assert_eq!(online, vec!["alice".to_string()]);
}

/// Oversized frames fail validation before touching presence
#[tokio::test]
async fn test_oversized_query_is_rejected() {
    let harness = Harness::new();
    let server = server(&harness, 100);
    let userids: Vec<String> = (0..256).map(|i| format!("u{}", i)).collect();

    let response = server
        .post("/v1/frames")
        .add_header(user_header(), HeaderValue::from_static("alice"))
        .json(&json!({"op": "presence_query", "d": {"userids": userids}}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(harness.publisher.channels().is_empty());
}

/// A presence query is answered on the requester's channel
#[tokio::test]
async fn test_presence_query_answers_on_own_channel() {
    // Arrange
    let harness = Harness::new();
    harness.link("alice", "bob").await;
    harness
        .services
        .presence
        .set_presence("bob", "gdm")
        .await
        .unwrap();
    let server = server(&harness, 100);

    // Act
    let response = server
        .post("/v1/frames")
        .add_header(user_header(), HeaderValue::from_static("alice"))
        .json(&json!({"op": "presence_query", "d": {"userids": ["bob", "carol"]}}))
        .await;

    // Assert
    response.assert_status(StatusCode::NO_CONTENT);
    assert_eq!(
        harness.publisher.messages_on("user.alice"),
        vec![json!({"userids": ["bob"]})]
    );
}

/// The user tag limits requests across addresses
#[tokio::test]
async fn test_user_rate_limit_returns_429() {
    // Arrange
    let harness = Harness::new();
    let server = server(&harness, 3);
    let ping = json!({"op": "presence", "d": {"location": "dm"}});

    // Act
    for _ in 0..3 {
        server
            .post("/v1/frames")
            .add_header(user_header(), HeaderValue::from_static("alice"))
            .json(&ping)
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }
    let limited = server
        .post("/v1/frames")
        .add_header(user_header(), HeaderValue::from_static("alice"))
        .json(&ping)
        .await;

    // Assert
    limited.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body = limited.json::<serde_json::Value>();
    assert!(body["retry_at"].is_i64());

    // Another user is unaffected
    server
        .post("/v1/frames")
        .add_header(user_header(), HeaderValue::from_static("bob"))
        .json(&ping)
        .await
        .assert_status(StatusCode::NO_CONTENT);
}

/// Anonymous traffic is counted under its address before identity is
/// enforced
#[tokio::test]
async fn test_anonymous_requests_are_limited_by_address() {
    let harness = Harness::new();
    let server = TestServer::new(harness.router(&rate_limits(2, 100, 100))).unwrap();
    let forwarded = HeaderName::from_static("x-forwarded-for");
    let ping = json!({"op": "presence", "d": {"location": "dm"}});

    for _ in 0..2 {
        server
            .post("/v1/frames")
            .add_header(forwarded.clone(), HeaderValue::from_static("198.51.100.4"))
            .json(&ping)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }
    let limited = server
        .post("/v1/frames")
        .add_header(forwarded.clone(), HeaderValue::from_static("198.51.100.4"))
        .json(&ping)
        .await;

    limited.assert_status(StatusCode::TOO_MANY_REQUESTS);
}

/// Clearing presence takes the user offline
#[tokio::test]
async fn test_clear_presence() {
    let harness = Harness::new();
    let server = server(&harness, 100);
    harness
        .services
        .presence
        .set_presence("alice", "dm")
        .await
        .unwrap();

    server
        .delete("/v1/presence")
        .add_header(user_header(), HeaderValue::from_static("alice"))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let online = harness
        .services
        .presence
        .get_presence(&LocationFilter::Any, &["alice".to_string()])
        .await
        .unwrap();
    assert!(online.is_empty());
}
