//! Friend edge and invitation entities and repository traits.
//!
//! Maps to the `friends` and `friend_invitations` tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// One direction of a friendship.
///
/// Maps to the `friends` table:
/// - userid: VARCHAR(31) NOT NULL (composite PK)
/// - friend_id: VARCHAR(31) NOT NULL (composite PK)
/// - friend_username: VARCHAR(255) NOT NULL -- mirror of the peer's username
/// - created_at: TIMESTAMPTZ NOT NULL
///
/// Edges only ever exist in mirrored pairs: a row `A -> B` exists iff the
/// row `B -> A` exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendEdge {
    pub userid: String,
    pub friend_id: String,
    pub friend_username: String,
    pub created_at: DateTime<Utc>,
}

/// A pending friend invitation.
///
/// Maps to the `friend_invitations` table:
/// - userid: VARCHAR(31) NOT NULL (composite PK) -- the invitee
/// - invited_by: VARCHAR(31) NOT NULL (composite PK)
/// - created_at: TIMESTAMPTZ NOT NULL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendInvitation {
    pub userid: String,
    pub invited_by: String,
    pub created_at: DateTime<Utc>,
}

impl FriendInvitation {
    /// Whether the invitation is still acceptable at `now`
    pub fn is_live(&self, now: DateTime<Utc>, duration: chrono::Duration) -> bool {
        self.created_at > now - duration
    }
}

/// Repository trait for friend edges.
#[async_trait]
pub trait FriendRepository: Send + Sync {
    /// Whether the edge `userid -> friend_id` exists.
    async fn exists(&self, userid: &str, friend_id: &str) -> Result<bool, AppError>;

    /// Insert both directions of a friendship in one statement.
    async fn insert_mirrored(&self, edges: [FriendEdge; 2]) -> Result<(), AppError>;

    /// Delete both directions of a friendship in one statement.
    ///
    /// Returns false if no row existed.
    async fn delete_mirrored(&self, userid1: &str, userid2: &str) -> Result<bool, AppError>;

    /// Friends of `userid` ordered by friend ID, starting after `after`.
    async fn list(
        &self,
        userid: &str,
        after: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FriendEdge>, AppError>;

    /// Friends of `userid` whose username starts with `prefix`.
    async fn search(
        &self,
        userid: &str,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<FriendEdge>, AppError>;

    /// The subset of `candidates` that are friends of `userid`.
    async fn filter_friends(
        &self,
        userid: &str,
        candidates: &[String],
    ) -> Result<Vec<String>, AppError>;
}

/// Repository trait for pending friend invitations.
#[async_trait]
pub trait InvitationRepository: Send + Sync {
    async fn find(
        &self,
        userid: &str,
        invited_by: &str,
    ) -> Result<Option<FriendInvitation>, AppError>;

    /// Insert an invitation. Fails with `Conflict` if one exists for the pair.
    async fn insert(&self, invitation: &FriendInvitation) -> Result<(), AppError>;

    /// Returns false if no invitation existed.
    async fn delete(&self, userid: &str, invited_by: &str) -> Result<bool, AppError>;

    /// Invitations received by `userid` created after `since`.
    async fn list_received(
        &self,
        userid: &str,
        since: DateTime<Utc>,
        after: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FriendInvitation>, AppError>;

    /// Invitations sent by `invited_by` created after `since`.
    async fn list_sent(
        &self,
        invited_by: &str,
        since: DateTime<Utc>,
        after: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FriendInvitation>, AppError>;

    /// Invitations created at or before `before`.
    async fn list_expired(
        &self,
        before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<FriendInvitation>, AppError>;

    /// Invitations sent or received by `userid`.
    async fn list_involving(
        &self,
        userid: &str,
        limit: i64,
    ) -> Result<Vec<FriendInvitation>, AppError>;
}
