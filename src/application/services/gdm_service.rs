//! Group Chat Service
//!
//! Group chats have 3 to 31 members and no owner. Every count-guarded
//! membership change is a single repository call, so the bounds hold under
//! concurrent adds and removes. A removal that would leave fewer than three
//! members dissolves the chat instead.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, instrument};
use validator::Validate;

use crate::application::dto::{ChatProps, CreateGroupChat, Notification};
use crate::application::services::chat_error::{ensure_unique, on_conflict, ChatError};
use crate::application::services::fanout::Notifier;
use crate::domain::{
    ChatRef, FriendRepository, GdmRepository, GroupChat, MembershipChange, MessageRepository,
    UserDirectory, MAX_GROUP_MEMBERS, MIN_GROUP_MEMBERS,
};
use crate::shared::clock::Clock;
use crate::shared::error::AppError;

/// What removing one user did to a group chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GdmRemoval {
    /// The user left; the chat lives on.
    Removed { remaining: usize },
    /// The chat was too small to lose a member and was deleted.
    Dissolved,
}

/// Group chat service trait
#[async_trait]
pub trait GdmService: Send + Sync {
    /// Create a chat. `members[0]` is the creator; everyone else must be a
    /// friend of the creator.
    async fn create(&self, props: ChatProps, members: Vec<String>)
        -> Result<GroupChat, ChatError>;

    async fn get(&self, chat_id: &str, requester: &str) -> Result<GroupChat, ChatError>;

    async fn members(&self, chat_id: &str, requester: &str) -> Result<Vec<String>, ChatError>;

    async fn update_props(
        &self,
        chat_id: &str,
        requester: &str,
        props: ChatProps,
    ) -> Result<GroupChat, ChatError>;

    /// Returns the new member count.
    async fn add_members(
        &self,
        chat_id: &str,
        actor: &str,
        userids: Vec<String>,
    ) -> Result<usize, ChatError>;

    /// Returns the new member count.
    async fn remove_members(
        &self,
        chat_id: &str,
        actor: &str,
        userids: Vec<String>,
    ) -> Result<usize, ChatError>;

    /// `userid` leaves the chat.
    async fn leave(&self, chat_id: &str, userid: &str) -> Result<GdmRemoval, ChatError>;

    /// Remove `userid`, dissolving the chat if it has only three members.
    async fn remove_user(&self, chat_id: &str, userid: &str) -> Result<GdmRemoval, ChatError>;

    /// IDs of the chats of `userid`, most recently updated first.
    async fn latest(
        &self,
        userid: &str,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<String>, ChatError>;

    /// IDs of the chats `userid` and `other` are both in.
    async fn shared_with(
        &self,
        userid: &str,
        other: &str,
        limit: i64,
    ) -> Result<Vec<String>, ChatError>;
}

/// GdmService implementation
pub struct GdmServiceImpl {
    gdms: Arc<dyn GdmRepository>,
    messages: Arc<dyn MessageRepository>,
    friends: Arc<dyn FriendRepository>,
    directory: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl GdmServiceImpl {
    pub fn new(
        gdms: Arc<dyn GdmRepository>,
        messages: Arc<dyn MessageRepository>,
        friends: Arc<dyn FriendRepository>,
        directory: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gdms,
            messages,
            friends,
            directory,
            notifier,
            clock,
        }
    }

    fn capacity() -> ChatError {
        ChatError::Capacity {
            min: MIN_GROUP_MEMBERS,
            max: MAX_GROUP_MEMBERS,
        }
    }

    async fn ensure_member(&self, chat_id: &str, userid: &str) -> Result<(), ChatError> {
        if self.gdms.is_member(chat_id, userid).await? {
            Ok(())
        } else {
            Err(ChatError::NotFound)
        }
    }

    /// Every user in `userids` exists and is a friend of `of`.
    async fn ensure_friends(&self, of: &str, userids: &[String]) -> Result<(), ChatError> {
        let known = self.directory.usernames(userids).await?;
        let unknown: Vec<String> = userids
            .iter()
            .filter(|id| !known.contains_key(*id))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(ChatError::UnknownUsers(unknown));
        }

        let others: Vec<String> = userids.iter().filter(|id| *id != of).cloned().collect();
        let friends = self.friends.filter_friends(of, &others).await?;
        let strangers: Vec<String> = others
            .into_iter()
            .filter(|id| !friends.contains(id))
            .collect();
        if !strangers.is_empty() {
            return Err(ChatError::NotFriends(strangers));
        }

        Ok(())
    }

    /// Delete messages, then the chat with its membership.
    async fn dissolve(&self, chat_id: &str, members: Vec<String>) -> Result<(), ChatError> {
        let erased = self.messages.delete_all(chat_id).await?;
        self.gdms.delete(chat_id).await?;
        info!(chat_id, erased, "Group chat dissolved");

        self.notifier.notify_members(
            members,
            Notification::ChatDelete {
                chat: ChatRef::Gdm(chat_id.to_string()),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl GdmService for GdmServiceImpl {
    #[instrument(skip(self, props))]
    async fn create(
        &self,
        props: ChatProps,
        members: Vec<String>,
    ) -> Result<GroupChat, ChatError> {
        ensure_unique(&members)?;
        if members.len() < MIN_GROUP_MEMBERS || members.len() > MAX_GROUP_MEMBERS {
            return Err(Self::capacity());
        }
        let request = CreateGroupChat { props, members };
        request
            .validate()
            .map_err(|e| ChatError::Invalid(e.to_string()))?;
        let CreateGroupChat { props, members } = request;
        let theme = props
            .theme_value()
            .map_err(|e| ChatError::Invalid(e.to_string()))?;

        self.ensure_friends(&members[0], &members).await?;

        let chat = GroupChat::new(props.name, theme, self.clock.now());
        self.gdms.create(&chat, &members).await?;
        info!(chat_id = %chat.chat_id, members = members.len(), "Group chat created");

        Ok(chat)
    }

    async fn get(&self, chat_id: &str, requester: &str) -> Result<GroupChat, ChatError> {
        self.ensure_member(chat_id, requester).await?;
        self.gdms.find(chat_id).await?.ok_or(ChatError::NotFound)
    }

    async fn members(&self, chat_id: &str, requester: &str) -> Result<Vec<String>, ChatError> {
        self.ensure_member(chat_id, requester).await?;
        Ok(self.gdms.members(chat_id).await?)
    }

    #[instrument(skip(self, props))]
    async fn update_props(
        &self,
        chat_id: &str,
        requester: &str,
        props: ChatProps,
    ) -> Result<GroupChat, ChatError> {
        props
            .validate()
            .map_err(|e| ChatError::Invalid(e.to_string()))?;
        let theme = props
            .theme_value()
            .map_err(|e| ChatError::Invalid(e.to_string()))?;

        let mut chat = self.get(chat_id, requester).await?;
        let now = self.clock.now();
        if !self.gdms.update_props(chat_id, &props.name, &theme, now).await? {
            return Err(ChatError::NotFound);
        }

        chat.name = props.name;
        chat.theme = theme;
        chat.last_updated = now;

        self.notifier.notify(Notification::ChatUpdate {
            chat: ChatRef::Gdm(chat_id.to_string()),
        });
        Ok(chat)
    }

    #[instrument(skip(self))]
    async fn add_members(
        &self,
        chat_id: &str,
        actor: &str,
        userids: Vec<String>,
    ) -> Result<usize, ChatError> {
        if userids.is_empty() {
            return Err(ChatError::Invalid("no users to add".into()));
        }
        ensure_unique(&userids)?;
        self.ensure_member(chat_id, actor).await?;
        self.ensure_friends(actor, &userids).await?;

        let change = self
            .gdms
            .add_members(chat_id, &userids, MAX_GROUP_MEMBERS, self.clock.now())
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => ChatError::NotFound,
                other => on_conflict(other, ChatError::AlreadyMember),
            })?;

        match change {
            MembershipChange::Applied { count } => {
                self.notifier.notify(Notification::MembersAdd {
                    chat: ChatRef::Gdm(chat_id.to_string()),
                    userids,
                });
                Ok(count)
            }
            MembershipChange::OverCapacity { .. } | MembershipChange::BelowFloor { .. } => {
                Err(Self::capacity())
            }
        }
    }

    #[instrument(skip(self))]
    async fn remove_members(
        &self,
        chat_id: &str,
        actor: &str,
        userids: Vec<String>,
    ) -> Result<usize, ChatError> {
        if userids.is_empty() {
            return Err(ChatError::Invalid("no users to remove".into()));
        }
        ensure_unique(&userids)?;

        let members = self.gdms.members(chat_id).await?;
        if !members.iter().any(|m| m == actor) {
            return Err(ChatError::NotFound);
        }
        if userids.iter().any(|id| !members.contains(id)) {
            return Err(ChatError::NotMember);
        }

        let change = self
            .gdms
            .remove_members(chat_id, &userids, MIN_GROUP_MEMBERS, self.clock.now())
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => ChatError::NotMember,
                other => ChatError::Store(other),
            })?;

        match change {
            MembershipChange::Applied { count } => {
                self.notifier.notify_members(
                    members,
                    Notification::MembersRemove {
                        chat: ChatRef::Gdm(chat_id.to_string()),
                        userids,
                    },
                );
                Ok(count)
            }
            MembershipChange::OverCapacity { .. } | MembershipChange::BelowFloor { .. } => {
                Err(Self::capacity())
            }
        }
    }

    async fn leave(&self, chat_id: &str, userid: &str) -> Result<GdmRemoval, ChatError> {
        self.remove_user(chat_id, userid).await
    }

    #[instrument(skip(self))]
    async fn remove_user(&self, chat_id: &str, userid: &str) -> Result<GdmRemoval, ChatError> {
        let members = self.gdms.members(chat_id).await?;
        if members.is_empty() {
            return Err(ChatError::NotFound);
        }
        if !members.iter().any(|m| m == userid) {
            return Err(ChatError::NotMember);
        }

        let change = self
            .gdms
            .remove_members(
                chat_id,
                &[userid.to_string()],
                MIN_GROUP_MEMBERS,
                self.clock.now(),
            )
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => ChatError::NotFound,
                other => ChatError::Store(other),
            })?;

        match change {
            MembershipChange::Applied { count } => {
                self.notifier.notify_members(
                    members,
                    Notification::MembersRemove {
                        chat: ChatRef::Gdm(chat_id.to_string()),
                        userids: vec![userid.to_string()],
                    },
                );
                Ok(GdmRemoval::Removed { remaining: count })
            }
            MembershipChange::BelowFloor { .. } => {
                self.dissolve(chat_id, members).await?;
                Ok(GdmRemoval::Dissolved)
            }
            MembershipChange::OverCapacity { .. } => Err(ChatError::Store(AppError::Internal(
                "capacity outcome for a removal".into(),
            ))),
        }
    }

    async fn latest(
        &self,
        userid: &str,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<String>, ChatError> {
        Ok(self
            .gdms
            .latest(userid, before, limit)
            .await?
            .into_iter()
            .map(|chat| chat.chat_id)
            .collect())
    }

    async fn shared_with(
        &self,
        userid: &str,
        other: &str,
        limit: i64,
    ) -> Result<Vec<String>, ChatError> {
        Ok(self.gdms.shared(userid, other, limit).await?)
    }
}
