//! Live notification payloads pushed on `user.{userid}` channels.

use serde::{Deserialize, Serialize};

use crate::domain::{ChatRef, Message};

/// A chat change pushed to present members.
///
/// Wire format: `{"type": "message_create", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Notification {
    MessageCreate { chat: ChatRef, message: Message },
    MessageDelete { chat: ChatRef, msg_id: i64 },
    ChatUpdate { chat: ChatRef },
    MembersAdd { chat: ChatRef, userids: Vec<String> },
    MembersRemove { chat: ChatRef, userids: Vec<String> },
    ChatDelete { chat: ChatRef },
}

impl Notification {
    /// Name used for the wire tag and metric labels
    pub fn name(&self) -> &'static str {
        match self {
            Notification::MessageCreate { .. } => "message_create",
            Notification::MessageDelete { .. } => "message_delete",
            Notification::ChatUpdate { .. } => "chat_update",
            Notification::MembersAdd { .. } => "members_add",
            Notification::MembersRemove { .. } => "members_remove",
            Notification::ChatDelete { .. } => "chat_delete",
        }
    }

    pub fn chat(&self) -> &ChatRef {
        match self {
            Notification::MessageCreate { chat, .. }
            | Notification::MessageDelete { chat, .. }
            | Notification::ChatUpdate { chat }
            | Notification::MembersAdd { chat, .. }
            | Notification::MembersRemove { chat, .. }
            | Notification::ChatDelete { chat } => chat,
        }
    }
}

/// Answer to a presence query, sent on the requester's own channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceAnswer {
    pub userids: Vec<String>,
}
