//! Direct Chat Service
//!
//! Direct chats are keyed by the sorted user pair, so `(a, b)` and `(b, a)`
//! always resolve to the same chat. They are created and destroyed by the
//! event synchronizer; this service reads them and edits their properties.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::instrument;
use validator::Validate;

use crate::application::dto::{ChatProps, Notification};
use crate::application::services::chat_error::ChatError;
use crate::application::services::fanout::Notifier;
use crate::domain::{ChatRef, DirectChat, DmRepository, UserPair};
use crate::shared::clock::Clock;

/// Direct chat service trait
#[async_trait]
pub trait DmService: Send + Sync {
    async fn get_by_pair(&self, a: &str, b: &str) -> Result<DirectChat, ChatError>;

    /// A chat by ID, if `requester` is one of its two participants.
    async fn get_by_id(&self, chat_id: &str, requester: &str) -> Result<DirectChat, ChatError>;

    async fn update_props(
        &self,
        chat_id: &str,
        requester: &str,
        props: ChatProps,
    ) -> Result<DirectChat, ChatError>;

    /// IDs of the chats of `userid`, most recently updated first, strictly
    /// older than `before`.
    async fn latest(
        &self,
        userid: &str,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<String>, ChatError>;
}

/// DmService implementation
pub struct DmServiceImpl {
    dms: Arc<dyn DmRepository>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl DmServiceImpl {
    pub fn new(
        dms: Arc<dyn DmRepository>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dms,
            notifier,
            clock,
        }
    }
}

#[async_trait]
impl DmService for DmServiceImpl {
    async fn get_by_pair(&self, a: &str, b: &str) -> Result<DirectChat, ChatError> {
        self.dms
            .find_by_pair(&UserPair::new(a, b))
            .await?
            .ok_or(ChatError::NotFound)
    }

    async fn get_by_id(&self, chat_id: &str, requester: &str) -> Result<DirectChat, ChatError> {
        self.dms
            .find_by_id(chat_id)
            .await?
            .filter(|chat| chat.is_visible_to(requester))
            .ok_or(ChatError::NotFound)
    }

    #[instrument(skip(self, props))]
    async fn update_props(
        &self,
        chat_id: &str,
        requester: &str,
        props: ChatProps,
    ) -> Result<DirectChat, ChatError> {
        props
            .validate()
            .map_err(|e| ChatError::Invalid(e.to_string()))?;
        let theme = props
            .theme_value()
            .map_err(|e| ChatError::Invalid(e.to_string()))?;

        let mut chat = self.get_by_id(chat_id, requester).await?;
        let now = self.clock.now();

        if !self.dms.update_props(chat_id, &props.name, &theme, now).await? {
            return Err(ChatError::NotFound);
        }

        chat.name = props.name;
        chat.theme = theme;
        chat.last_updated = now;

        self.notifier.notify(Notification::ChatUpdate {
            chat: ChatRef::Dm(chat.chat_id.clone()),
        });

        Ok(chat)
    }

    async fn latest(
        &self,
        userid: &str,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<String>, ChatError> {
        Ok(self
            .dms
            .latest(userid, before, limit)
            .await?
            .into_iter()
            .map(|chat| chat.chat_id)
            .collect())
    }
}
