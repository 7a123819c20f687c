//! Presence tracker tests

use pretty_assertions::assert_eq;
use test_case::test_case;

use chat_core::domain::{Location, LocationFilter};

use crate::common::Harness;

fn users(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// A ping is visible until the TTL runs out, and not after
#[tokio::test]
async fn test_presence_expires_after_ttl() {
    // Arrange
    let harness = Harness::new();
    let presence = &harness.services.presence;
    presence.set_presence("amy", "dm").await.unwrap();

    // Act & Assert
    harness.advance(59);
    assert_eq!(
        presence
            .get_presence(&LocationFilter::Any, &users(&["amy"]))
            .await
            .unwrap(),
        users(&["amy"])
    );

    harness.advance(2);
    assert!(presence
        .get_presence(&LocationFilter::Any, &users(&["amy"]))
        .await
        .unwrap()
        .is_empty());
}

/// Each ping restarts the TTL
#[tokio::test]
async fn test_ping_refreshes_ttl() {
    let harness = Harness::new();
    let presence = &harness.services.presence;

    presence.set_presence("amy", "dm").await.unwrap();
    harness.advance(50);
    presence.set_presence("amy", "gdm").await.unwrap();
    harness.advance(50);

    let here = LocationFilter::Exact(Location::Gdm);
    assert_eq!(
        presence.get_presence(&here, &users(&["amy"])).await.unwrap(),
        users(&["amy"])
    );
}

#[test_case("dm", Some(Location::Dm) ; "direct chats")]
#[test_case("gdm", Some(Location::Gdm) ; "group chats")]
#[tokio::test]
async fn test_known_locations_are_recorded(raw: &str, expected: Option<Location>) {
    let harness = Harness::new();
    let presence = &harness.services.presence;

    let written = presence.set_presence("amy", raw).await.unwrap();

    assert_eq!(written, expected);
    assert_eq!(
        presence
            .get_presence(&LocationFilter::Any, &users(&["amy"]))
            .await
            .unwrap(),
        users(&["amy"])
    );
}

#[test_case("guild" ; "unknown area")]
#[test_case("dm:chat1" ; "chat scoped")]
#[test_case("" ; "empty")]
#[tokio::test]
async fn test_invalid_location_is_ignored(raw: &str) {
    let harness = Harness::new();
    let presence = &harness.services.presence;

    let written = presence.set_presence("amy", raw).await.unwrap();

    assert_eq!(written, None);
    assert!(presence
        .get_presence(&LocationFilter::Any, &users(&["amy"]))
        .await
        .unwrap()
        .is_empty());
}

/// Exact filters only match users in that area; order follows candidates
#[tokio::test]
async fn test_exact_filter() {
    let harness = Harness::new();
    let presence = &harness.services.presence;
    presence.set_presence("cat", "dm").await.unwrap();
    presence.set_presence("amy", "dm").await.unwrap();
    presence.set_presence("bob", "gdm").await.unwrap();

    let here = LocationFilter::Exact(Location::Dm);
    let found = presence
        .get_presence(&here, &users(&["bob", "cat", "dan", "amy"]))
        .await
        .unwrap();

    assert_eq!(found, users(&["cat", "amy"]));
}

/// Presence queries only reveal friends
#[tokio::test]
async fn test_presence_query_is_limited_to_friends() {
    let harness = Harness::new();
    harness.link("amy", "bob").await;
    let presence = &harness.services.presence;
    presence.set_presence("bob", "dm").await.unwrap();
    presence.set_presence("cat", "gdm").await.unwrap();

    let online = harness
        .services
        .fanout
        .presence_query("amy", &users(&["bob", "cat"]))
        .await
        .unwrap();

    assert_eq!(online, users(&["bob"]));
    assert_eq!(harness.publisher.channels(), vec!["user.amy"]);
}
