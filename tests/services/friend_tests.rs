//! Friend graph tests

use std::sync::Arc;

use pretty_assertions::assert_eq;

use chat_core::application::services::{FriendError, SyncOutcome};
use chat_core::domain::FriendEvent;

use crate::common::{BrokenEvents, EdgeWitness, Harness};

/// Accepting an invitation mirrors the edge and publishes one friend event
#[tokio::test]
async fn test_accept_creates_mirrored_edges() {
    // Arrange
    let harness = Harness::new();
    harness.add_users(&["alice", "bob"]);
    let friends = &harness.services.friends;

    // Act
    friends.invite_friend("bob", "alice").await.unwrap();
    friends.accept_invitation("bob", "alice").await.unwrap();

    // Assert
    assert!(harness.friends.has_edge("alice", "bob"));
    assert!(harness.friends.has_edge("bob", "alice"));
    assert!(harness.friends.is_mirrored());
    assert_eq!(harness.invitations.count(), 0);
    assert_eq!(harness.bus.pending(), 1);
    assert_eq!(harness.sync().await, vec![SyncOutcome::DmCreated]);
    assert!(harness.dms.by_pair("alice", "bob").is_some());
}

#[tokio::test]
async fn test_invite_rejections() {
    let harness = Harness::new();
    harness.add_users(&["alice", "bob"]);
    let friends = &harness.services.friends;

    assert!(matches!(
        friends.invite_friend("alice", "alice").await,
        Err(FriendError::SelfFriend)
    ));
    assert!(matches!(
        friends.invite_friend("nobody", "alice").await,
        Err(FriendError::UserNotFound(id)) if id == "nobody"
    ));

    harness.befriend("alice", "bob").await;
    assert!(matches!(
        friends.invite_friend("bob", "alice").await,
        Err(FriendError::AlreadyFriends)
    ));
}

/// Invitations stop being acceptable once the invitation duration passes
#[tokio::test]
async fn test_expired_invitation_cannot_be_accepted() {
    let harness = Harness::new();
    harness.add_users(&["alice", "bob"]);
    let friends = &harness.services.friends;
    friends.invite_friend("bob", "alice").await.unwrap();

    harness.advance(72 * 3600 + 1);

    assert!(friends
        .list_invitations("bob", None, 10)
        .await
        .unwrap()
        .is_empty());
    assert!(matches!(
        friends.accept_invitation("bob", "alice").await,
        Err(FriendError::InvitationNotFound)
    ));
    assert_eq!(harness.friends.edge_count(), 0);
}

/// Inviting again restarts the invitation's lifetime
#[tokio::test]
async fn test_reinvite_replaces_invitation() {
    let harness = Harness::new();
    harness.add_users(&["alice", "bob"]);
    let friends = &harness.services.friends;

    friends.invite_friend("bob", "alice").await.unwrap();
    harness.advance(3600);
    friends.invite_friend("bob", "alice").await.unwrap();

    let sent = friends.list_invited("alice", None, 10).await.unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].created_at, crate::common::start_time() + chrono::Duration::hours(1));
}

#[tokio::test]
async fn test_decline_and_cancel() {
    let harness = Harness::new();
    harness.add_users(&["alice", "bob", "carol"]);
    let friends = &harness.services.friends;
    friends.invite_friend("bob", "alice").await.unwrap();
    friends.invite_friend("carol", "alice").await.unwrap();

    friends.decline_invitation("bob", "alice").await.unwrap();
    friends.cancel_invitation("alice", "carol").await.unwrap();

    assert_eq!(harness.invitations.count(), 0);
    assert!(matches!(
        friends.decline_invitation("bob", "alice").await,
        Err(FriendError::InvitationNotFound)
    ));
    assert_eq!(harness.bus.pending(), 0);
}

/// Removal deletes both edges and publishes an unfriend event
#[tokio::test]
async fn test_remove_friend() {
    // Arrange
    let harness = Harness::new();
    harness.add_users(&["alice", "bob"]);
    harness.befriend("alice", "bob").await;

    // Act
    harness
        .services
        .friends
        .remove_friend("bob", "alice")
        .await
        .unwrap();

    // Assert
    assert_eq!(harness.friends.edge_count(), 0);
    assert_eq!(harness.sync().await, vec![SyncOutcome::DmDeleted { messages: 0 }]);
    assert!(harness.dms.by_pair("alice", "bob").is_none());
    assert!(matches!(
        harness.services.friends.remove_friend("bob", "alice").await,
        Err(FriendError::NotFriends)
    ));
}

/// A dead event stream never fails the friend graph write
#[tokio::test]
async fn test_publish_failure_is_swallowed() {
    let harness = Harness::with_events(Arc::new(BrokenEvents));
    harness.add_users(&["alice", "bob"]);
    let friends = &harness.services.friends;

    friends.invite_friend("bob", "alice").await.unwrap();
    friends.accept_invitation("bob", "alice").await.unwrap();
    friends.remove_friend("alice", "bob").await.unwrap();

    assert_eq!(harness.friends.edge_count(), 0);
}

/// A store failure during accept keeps the invitation, so the accept can be
/// retried once the store is back
#[tokio::test]
async fn test_failed_accept_keeps_invitation() {
    // Arrange
    let harness = Harness::new();
    harness.add_users(&["alice", "bob"]);
    let friends = &harness.services.friends;
    friends.invite_friend("bob", "alice").await.unwrap();
    harness.friends.set_offline(true);

    // Act
    let failed = friends.accept_invitation("bob", "alice").await;

    // Assert
    assert!(matches!(failed, Err(FriendError::Store(_))));
    assert_eq!(harness.invitations.count(), 1);
    assert_eq!(harness.friends.edge_count(), 0);
    assert_eq!(harness.bus.pending(), 0);

    harness.friends.set_offline(false);
    friends.accept_invitation("bob", "alice").await.unwrap();
    assert!(harness.friends.is_mirrored());
    assert_eq!(harness.friends.edge_count(), 2);
    assert_eq!(harness.invitations.count(), 0);
    assert_eq!(harness.bus.pending(), 1);
}

/// `friend` is published once the edges exist, `unfriend` while they still do
#[tokio::test]
async fn test_events_are_published_while_edges_exist() {
    let witness = Arc::new(EdgeWitness::default());
    let harness = Harness::with_events(witness.clone());
    witness.watch(harness.friends.clone());
    harness.add_users(&["alice", "bob"]);
    let friends = &harness.services.friends;

    friends.invite_friend("bob", "alice").await.unwrap();
    friends.accept_invitation("bob", "alice").await.unwrap();
    friends.remove_friend("alice", "bob").await.unwrap();

    assert_eq!(
        witness.seen(),
        vec![("friend".to_string(), true), ("unfriend".to_string(), true)]
    );
    assert_eq!(harness.friends.edge_count(), 0);
}

#[tokio::test]
async fn test_list_search_and_filter() {
    let harness = Harness::new();
    harness.directory.add("alice", "alice");
    harness.directory.add("bob", "bobby");
    harness.directory.add("carol", "carol");
    harness.directory.add("dave", "bob_the_builder");
    harness.befriend("alice", "bob").await;
    harness.befriend("alice", "carol").await;
    harness.befriend("alice", "dave").await;
    let friends = &harness.services.friends;

    let page: Vec<String> = friends
        .list_friends("alice", Some("bob"), 10)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.friend_id)
        .collect();
    assert_eq!(page, vec!["carol", "dave"]);

    let found: Vec<String> = friends
        .search_friends("alice", "bob", 10)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.friend_username)
        .collect();
    assert_eq!(found, vec!["bob_the_builder", "bobby"]);

    let filtered = friends
        .filter_friends("alice", &["carol".into(), "zed".into(), "bob".into()])
        .await
        .unwrap();
    assert_eq!(filtered, vec!["carol", "bob"]);
}

/// The partition key is the same from both sides of the pair
#[test]
fn test_events_of_a_pair_share_partition_key() {
    let friend = FriendEvent::Friend {
        userid: "zed".into(),
        invited_by: "amy".into(),
    };
    let unfriend = FriendEvent::Unfriend {
        userid: "amy".into(),
        other: "zed".into(),
    };
    assert_eq!(friend.partition_key(), unfriend.partition_key());
}
