//! Message entity and repository trait.
//!
//! Maps to the `msgs` table in the database schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Kind of message payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text
    #[default]
    Text,
    /// Reference to an uploaded file
    File,
    /// Generated by the system (membership changes and the like)
    System,
}

impl MessageKind {
    /// Convert from database string representation.
    pub fn from_str(s: &str) -> Self {
        match s {
            "file" => Self::File,
            "system" => Self::System,
            _ => Self::Text,
        }
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::File => "file",
            Self::System => "system",
        }
    }
}

/// Which chat family a chat ID belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum ChatRef {
    Dm(String),
    Gdm(String),
}

impl ChatRef {
    pub fn id(&self) -> &str {
        match self {
            ChatRef::Dm(id) | ChatRef::Gdm(id) => id,
        }
    }
}

/// An immutable chat message.
///
/// Maps to the `msgs` table:
/// - chatid: VARCHAR(31) NOT NULL (composite PK)
/// - msgid: BIGINT NOT NULL (composite PK, snowflake)
/// - userid: VARCHAR(31) NOT NULL
/// - time: TIMESTAMPTZ NOT NULL
/// - kind: VARCHAR(15) NOT NULL
/// - value: TEXT NOT NULL
///
/// Messages are never edited; deletion erases the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub chat_id: String,
    pub msg_id: i64,
    pub userid: String,
    pub time: DateTime<Utc>,
    pub kind: MessageKind,
    pub value: String,
}

/// Repository trait for the append-only message log.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: &Message) -> Result<(), AppError>;

    async fn find(&self, chat_id: &str, msg_id: i64) -> Result<Option<Message>, AppError>;

    /// Newest first, strictly older than the `before` message ID.
    async fn list(
        &self,
        chat_id: &str,
        before: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Message>, AppError>;

    /// Returns false if the message did not exist.
    async fn delete(&self, chat_id: &str, msg_id: i64) -> Result<bool, AppError>;

    /// Erase every message of a chat. Returns the number removed.
    async fn delete_all(&self, chat_id: &str) -> Result<u64, AppError>;
}
