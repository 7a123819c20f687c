//! Group chat entity and repository trait.
//!
//! Maps to the `gdms`, `gdm_members` and `gdm_assoc` tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::shared::error::AppError;
use crate::shared::ids::new_chat_id;

/// Smallest membership a group chat may have
pub const MIN_GROUP_MEMBERS: usize = 3;

/// Largest membership a group chat may have
pub const MAX_GROUP_MEMBERS: usize = 31;

/// An N-party chat with no owner.
///
/// Maps to the `gdms` table:
/// - chatid: VARCHAR(31) PRIMARY KEY
/// - name: VARCHAR(127) NOT NULL
/// - theme: JSONB NOT NULL DEFAULT '{}'
/// - last_updated: TIMESTAMPTZ NOT NULL
/// - created_at: TIMESTAMPTZ NOT NULL
///
/// Membership lives in `gdm_members (chatid, userid, last_updated)`. The
/// `gdm_assoc (chatid, userid_1, userid_2)` index holds every ordered pair
/// of distinct members and answers "group chats shared by two users".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupChat {
    pub chat_id: String,
    pub name: String,
    pub theme: Value,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl GroupChat {
    pub fn new(name: impl Into<String>, theme: Value, now: DateTime<Utc>) -> Self {
        Self {
            chat_id: new_chat_id(),
            name: name.into(),
            theme,
            last_updated: now,
            created_at: now,
        }
    }
}

/// Result of a count-guarded membership mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    /// The mutation was applied; `count` is the new member count.
    Applied { count: usize },
    /// Adding would exceed the cap; nothing changed.
    OverCapacity { count: usize },
    /// Removing would drop below the floor; nothing changed.
    BelowFloor { count: usize },
}

/// Every ordered pair of distinct members, as stored in the assoc index.
pub fn member_pairs(members: &[String]) -> Vec<(String, String)> {
    members
        .iter()
        .flat_map(|a| {
            members
                .iter()
                .filter(move |b| *b != a)
                .map(move |b| (a.clone(), b.clone()))
        })
        .collect()
}

/// Repository trait for group chats.
///
/// Member-count checks and the mutation they guard run as one unit so that
/// concurrent adds or removes cannot push membership outside the bounds.
#[async_trait]
pub trait GdmRepository: Send + Sync {
    /// Insert the chat, its members and the derived assoc rows.
    async fn create(&self, chat: &GroupChat, members: &[String]) -> Result<(), AppError>;

    async fn find(&self, chat_id: &str) -> Result<Option<GroupChat>, AppError>;

    async fn is_member(&self, chat_id: &str, userid: &str) -> Result<bool, AppError>;

    /// All members, ordered by user ID.
    async fn members(&self, chat_id: &str) -> Result<Vec<String>, AppError>;

    /// Add `userids` unless the result would exceed `max`.
    ///
    /// Fails with `NotFound` for an unknown chat and `Conflict` if any user
    /// is already a member.
    async fn add_members(
        &self,
        chat_id: &str,
        userids: &[String],
        max: usize,
        now: DateTime<Utc>,
    ) -> Result<MembershipChange, AppError>;

    /// Remove `userids` unless the result would drop below `min`.
    ///
    /// Fails with `NotFound` for an unknown chat or if any user is not a
    /// member.
    async fn remove_members(
        &self,
        chat_id: &str,
        userids: &[String],
        min: usize,
        now: DateTime<Utc>,
    ) -> Result<MembershipChange, AppError>;

    async fn update_props(
        &self,
        chat_id: &str,
        name: &str,
        theme: &Value,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Bump `last_updated` on the chat and all its member rows.
    async fn touch(&self, chat_id: &str, now: DateTime<Utc>) -> Result<bool, AppError>;

    /// Chats of `userid`, most recently updated first, strictly older than `before`.
    async fn latest(
        &self,
        userid: &str,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<GroupChat>, AppError>;

    /// IDs of chats `userid` belongs to, in no particular order.
    async fn chats_of(&self, userid: &str, limit: i64) -> Result<Vec<String>, AppError>;

    /// IDs of chats both users belong to.
    async fn shared(&self, userid: &str, other: &str, limit: i64)
        -> Result<Vec<String>, AppError>;

    /// Delete the chat with its members and assoc rows.
    async fn delete(&self, chat_id: &str) -> Result<bool, AppError>;
}
