//! Direct chat entity and repository trait.
//!
//! Maps to the `dms` table in the database schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::value_objects::UserPair;
use crate::shared::error::AppError;
use crate::shared::ids::new_chat_id;

/// A two-party chat.
///
/// Maps to the `dms` table:
/// - userid_1: VARCHAR(31) NOT NULL (composite PK, always < userid_2)
/// - userid_2: VARCHAR(31) NOT NULL (composite PK)
/// - chatid: VARCHAR(31) NOT NULL UNIQUE
/// - name: VARCHAR(127) NOT NULL DEFAULT ''
/// - theme: JSONB NOT NULL DEFAULT '{}'
/// - last_updated: TIMESTAMPTZ NOT NULL
/// - created_at: TIMESTAMPTZ NOT NULL
///
/// The participant columns are the only access control: a chat is visible
/// to exactly the two users of its pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectChat {
    pub chat_id: String,
    pub pair: UserPair,
    pub name: String,
    pub theme: Value,
    pub last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl DirectChat {
    /// A fresh chat for `pair` with a random ID, no name and an empty theme.
    pub fn new(pair: UserPair, now: DateTime<Utc>) -> Self {
        Self {
            chat_id: new_chat_id(),
            pair,
            name: String::new(),
            theme: Value::Object(Default::default()),
            last_updated: now,
            created_at: now,
        }
    }

    pub fn is_visible_to(&self, userid: &str) -> bool {
        self.pair.contains(userid)
    }

    pub fn members(&self) -> [&str; 2] {
        [self.pair.first(), self.pair.second()]
    }
}

/// Repository trait for direct chats.
#[async_trait]
pub trait DmRepository: Send + Sync {
    /// Insert a chat. Fails with `Conflict` if the pair already has one.
    async fn insert(&self, chat: &DirectChat) -> Result<(), AppError>;

    async fn find_by_pair(&self, pair: &UserPair) -> Result<Option<DirectChat>, AppError>;

    async fn find_by_id(&self, chat_id: &str) -> Result<Option<DirectChat>, AppError>;

    /// Replace name and theme. Returns false if the chat does not exist.
    async fn update_props(
        &self,
        chat_id: &str,
        name: &str,
        theme: &Value,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Bump `last_updated`. Returns false if the chat does not exist.
    async fn touch(&self, chat_id: &str, now: DateTime<Utc>) -> Result<bool, AppError>;

    /// Chats of `userid`, most recently updated first, strictly older than `before`.
    async fn latest(
        &self,
        userid: &str,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<DirectChat>, AppError>;

    /// Returns false if the chat did not exist.
    async fn delete(&self, chat_id: &str) -> Result<bool, AppError>;
}
