//! Message Service
//!
//! Append-only chat messages for both chat families. Posting bumps the
//! chat's `last_updated` so the "latest chats" listings stay ordered by
//! activity.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::application::dto::Notification;
use crate::application::services::chat_error::ChatError;
use crate::application::services::fanout::Notifier;
use crate::domain::{ChatRef, DmRepository, GdmRepository, Message, MessageKind, MessageRepository};
use crate::shared::clock::Clock;
use crate::shared::snowflake::SnowflakeGenerator;

/// Longest accepted message body, in bytes
pub const MAX_MESSAGE_LEN: usize = 4000;

/// Message service trait
#[async_trait]
pub trait MessageService: Send + Sync {
    /// Append a message to a chat `userid` can see.
    async fn post(
        &self,
        chat: &ChatRef,
        userid: &str,
        kind: MessageKind,
        value: String,
    ) -> Result<Message, ChatError>;

    /// Messages newest first, strictly older than the `before` message ID.
    async fn list(
        &self,
        chat: &ChatRef,
        requester: &str,
        before: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Message>, ChatError>;

    /// Hard delete a message. Only its author may do this.
    async fn erase(&self, chat: &ChatRef, requester: &str, msg_id: i64) -> Result<(), ChatError>;
}

/// MessageService implementation
pub struct MessageServiceImpl {
    messages: Arc<dyn MessageRepository>,
    dms: Arc<dyn DmRepository>,
    gdms: Arc<dyn GdmRepository>,
    notifier: Arc<dyn Notifier>,
    snowflake: Arc<SnowflakeGenerator>,
    clock: Arc<dyn Clock>,
}

impl MessageServiceImpl {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        dms: Arc<dyn DmRepository>,
        gdms: Arc<dyn GdmRepository>,
        notifier: Arc<dyn Notifier>,
        snowflake: Arc<SnowflakeGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            messages,
            dms,
            gdms,
            notifier,
            snowflake,
            clock,
        }
    }

    /// NotFound unless `userid` belongs to the chat.
    async fn ensure_visible(&self, chat: &ChatRef, userid: &str) -> Result<(), ChatError> {
        let visible = match chat {
            ChatRef::Dm(id) => self
                .dms
                .find_by_id(id)
                .await?
                .is_some_and(|dm| dm.is_visible_to(userid)),
            ChatRef::Gdm(id) => self.gdms.is_member(id, userid).await?,
        };

        if visible {
            Ok(())
        } else {
            Err(ChatError::NotFound)
        }
    }
}

#[async_trait]
impl MessageService for MessageServiceImpl {
    #[instrument(skip(self, value), fields(chat_id = chat.id(), len = value.len()))]
    async fn post(
        &self,
        chat: &ChatRef,
        userid: &str,
        kind: MessageKind,
        value: String,
    ) -> Result<Message, ChatError> {
        if value.is_empty() || value.len() > MAX_MESSAGE_LEN {
            return Err(ChatError::Invalid(format!(
                "message must be 1 to {} bytes",
                MAX_MESSAGE_LEN
            )));
        }
        self.ensure_visible(chat, userid).await?;

        let now = self.clock.now();
        let message = Message {
            chat_id: chat.id().to_string(),
            msg_id: self.snowflake.generate(),
            userid: userid.to_string(),
            time: now,
            kind,
            value,
        };
        self.messages.insert(&message).await?;

        match chat {
            ChatRef::Dm(id) => self.dms.touch(id, now).await?,
            ChatRef::Gdm(id) => self.gdms.touch(id, now).await?,
        };
        debug!(msg_id = message.msg_id, "Message posted");

        self.notifier.notify(Notification::MessageCreate {
            chat: chat.clone(),
            message: message.clone(),
        });

        Ok(message)
    }

    async fn list(
        &self,
        chat: &ChatRef,
        requester: &str,
        before: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Message>, ChatError> {
        self.ensure_visible(chat, requester).await?;
        Ok(self.messages.list(chat.id(), before, limit).await?)
    }

    #[instrument(skip(self), fields(chat_id = chat.id()))]
    async fn erase(&self, chat: &ChatRef, requester: &str, msg_id: i64) -> Result<(), ChatError> {
        self.ensure_visible(chat, requester).await?;

        let message = self
            .messages
            .find(chat.id(), msg_id)
            .await?
            .ok_or(ChatError::MessageNotFound)?;
        if message.userid != requester {
            return Err(ChatError::NotAuthor);
        }

        if !self.messages.delete(chat.id(), msg_id).await? {
            return Err(ChatError::MessageNotFound);
        }

        self.notifier.notify(Notification::MessageDelete {
            chat: chat.clone(),
            msg_id,
        });
        Ok(())
    }
}
