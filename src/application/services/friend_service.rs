//! Friend Service
//!
//! Friend graph management: invitations, mirrored edges and lookups.
//!
//! Edge writes are the durable source of truth. Each accept or removal also
//! publishes a friend graph event, best effort, keyed by the sorted user
//! pair; a lost event only delays the direct chat change, it never fails
//! the call.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::domain::{
    FriendEdge, FriendEvent, FriendInvitation, FriendRepository, InvitationRepository,
    UserDirectory,
};
use crate::domain::events::FRIEND_EVENTS_SUBJECT;
use crate::infrastructure::messaging::EventPublisher;
use crate::shared::clock::Clock;
use crate::shared::error::AppError;

/// Friend service trait
#[async_trait]
pub trait FriendService: Send + Sync {
    /// `invited_by` invites `userid`. Replaces any earlier invitation
    /// between them in that direction.
    async fn invite_friend(&self, userid: &str, invited_by: &str) -> Result<(), FriendError>;

    /// `userid` accepts the invitation sent by `inviter`.
    async fn accept_invitation(&self, userid: &str, inviter: &str) -> Result<(), FriendError>;

    /// `userid` declines the invitation sent by `inviter`.
    async fn decline_invitation(&self, userid: &str, inviter: &str) -> Result<(), FriendError>;

    /// `inviter` withdraws the invitation sent to `invitee`.
    async fn cancel_invitation(&self, inviter: &str, invitee: &str) -> Result<(), FriendError>;

    /// Remove the friendship in both directions.
    async fn remove_friend(&self, userid1: &str, userid2: &str) -> Result<(), FriendError>;

    /// Friends of `userid` ordered by ID, after the `after` cursor.
    async fn list_friends(
        &self,
        userid: &str,
        after: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FriendEdge>, FriendError>;

    /// Friends of `userid` whose username starts with `prefix`.
    async fn search_friends(
        &self,
        userid: &str,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<FriendEdge>, FriendError>;

    /// Live invitations received by `userid`.
    async fn list_invitations(
        &self,
        userid: &str,
        after: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FriendInvitation>, FriendError>;

    /// Live invitations sent by `userid`.
    async fn list_invited(
        &self,
        userid: &str,
        after: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FriendInvitation>, FriendError>;

    /// The subset of `candidates` that are friends of `userid`.
    async fn filter_friends(
        &self,
        userid: &str,
        candidates: &[String],
    ) -> Result<Vec<String>, FriendError>;
}

/// Friend service errors
#[derive(Debug, thiserror::Error)]
pub enum FriendError {
    #[error("Users are already friends")]
    AlreadyFriends,

    #[error("Users are not friends")]
    NotFriends,

    #[error("Invitation not found")]
    InvitationNotFound,

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Cannot befriend yourself")]
    SelfFriend,

    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<FriendError> for AppError {
    fn from(err: FriendError) -> Self {
        match err {
            FriendError::AlreadyFriends => AppError::Conflict(err.to_string()),
            FriendError::NotFriends
            | FriendError::InvitationNotFound
            | FriendError::UserNotFound(_) => AppError::NotFound(err.to_string()),
            FriendError::SelfFriend => AppError::BadRequest(err.to_string()),
            FriendError::Store(e) => e,
        }
    }
}

/// FriendService implementation
pub struct FriendServiceImpl {
    friends: Arc<dyn FriendRepository>,
    invitations: Arc<dyn InvitationRepository>,
    directory: Arc<dyn UserDirectory>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    invitation_duration: chrono::Duration,
}

impl FriendServiceImpl {
    pub fn new(
        friends: Arc<dyn FriendRepository>,
        invitations: Arc<dyn InvitationRepository>,
        directory: Arc<dyn UserDirectory>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        invitation_duration: chrono::Duration,
    ) -> Self {
        Self {
            friends,
            invitations,
            directory,
            events,
            clock,
            invitation_duration,
        }
    }

    /// Publish, logging instead of failing.
    async fn publish(&self, event: FriendEvent) {
        let payload = match event.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(kind = event.kind(), error = %e, "Failed to encode friend event");
                return;
            }
        };

        if let Err(e) = self
            .events
            .publish(FRIEND_EVENTS_SUBJECT, &event.partition_key(), &payload)
            .await
        {
            warn!(kind = event.kind(), pair = %event.pair(), error = %e, "Failed to publish friend event");
        }
    }

    fn live_since(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now() - self.invitation_duration
    }
}

#[async_trait]
impl FriendService for FriendServiceImpl {
    #[instrument(skip(self))]
    async fn invite_friend(&self, userid: &str, invited_by: &str) -> Result<(), FriendError> {
        if userid == invited_by {
            return Err(FriendError::SelfFriend);
        }
        if self.friends.exists(userid, invited_by).await? {
            return Err(FriendError::AlreadyFriends);
        }

        let known = self.directory.usernames(&[userid.to_string()]).await?;
        if !known.contains_key(userid) {
            return Err(FriendError::UserNotFound(userid.to_string()));
        }

        self.invitations.delete(userid, invited_by).await?;
        self.invitations
            .insert(&FriendInvitation {
                userid: userid.to_string(),
                invited_by: invited_by.to_string(),
                created_at: self.clock.now(),
            })
            .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn accept_invitation(&self, userid: &str, inviter: &str) -> Result<(), FriendError> {
        let now = self.clock.now();
        self.invitations
            .find(userid, inviter)
            .await?
            .filter(|inv| inv.is_live(now, self.invitation_duration))
            .ok_or(FriendError::InvitationNotFound)?;

        let usernames = self
            .directory
            .usernames(&[userid.to_string(), inviter.to_string()])
            .await?;
        let username_of = |id: &str| {
            usernames
                .get(id)
                .cloned()
                .ok_or_else(|| FriendError::UserNotFound(id.to_string()))
        };
        let (user_name, inviter_name) = (username_of(userid)?, username_of(inviter)?);

        // Edges first: a failed insert must leave the invitation in place.
        self.friends
            .insert_mirrored([
                FriendEdge {
                    userid: userid.to_string(),
                    friend_id: inviter.to_string(),
                    friend_username: inviter_name,
                    created_at: now,
                },
                FriendEdge {
                    userid: inviter.to_string(),
                    friend_id: userid.to_string(),
                    friend_username: user_name,
                    created_at: now,
                },
            ])
            .await
            .map_err(|e| match e {
                AppError::Conflict(_) => FriendError::AlreadyFriends,
                other => FriendError::Store(other),
            })?;

        info!(userid, inviter, "Friendship created");

        if let Err(e) = self.invitations.delete(userid, inviter).await {
            warn!(userid, inviter, error = %e, "Accepted invitation left for collection");
        }

        self.publish(FriendEvent::Friend {
            userid: userid.to_string(),
            invited_by: inviter.to_string(),
        })
        .await;

        Ok(())
    }

    async fn decline_invitation(&self, userid: &str, inviter: &str) -> Result<(), FriendError> {
        if self.invitations.delete(userid, inviter).await? {
            Ok(())
        } else {
            Err(FriendError::InvitationNotFound)
        }
    }

    async fn cancel_invitation(&self, inviter: &str, invitee: &str) -> Result<(), FriendError> {
        self.decline_invitation(invitee, inviter).await
    }

    #[instrument(skip(self))]
    async fn remove_friend(&self, userid1: &str, userid2: &str) -> Result<(), FriendError> {
        if !self.friends.exists(userid1, userid2).await? {
            return Err(FriendError::NotFriends);
        }

        // Publish before the edge delete, never after.
        self.publish(FriendEvent::Unfriend {
            userid: userid1.to_string(),
            other: userid2.to_string(),
        })
        .await;

        self.friends.delete_mirrored(userid1, userid2).await?;
        info!(userid1, userid2, "Friendship removed");

        Ok(())
    }

    async fn list_friends(
        &self,
        userid: &str,
        after: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FriendEdge>, FriendError> {
        Ok(self.friends.list(userid, after, limit).await?)
    }

    async fn search_friends(
        &self,
        userid: &str,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<FriendEdge>, FriendError> {
        Ok(self.friends.search(userid, prefix, limit).await?)
    }

    async fn list_invitations(
        &self,
        userid: &str,
        after: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FriendInvitation>, FriendError> {
        Ok(self
            .invitations
            .list_received(userid, self.live_since(), after, limit)
            .await?)
    }

    async fn list_invited(
        &self,
        userid: &str,
        after: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FriendInvitation>, FriendError> {
        Ok(self
            .invitations
            .list_sent(userid, self.live_since(), after, limit)
            .await?)
    }

    async fn filter_friends(
        &self,
        userid: &str,
        candidates: &[String],
    ) -> Result<Vec<String>, FriendError> {
        Ok(self.friends.filter_friends(userid, candidates).await?)
    }
}
