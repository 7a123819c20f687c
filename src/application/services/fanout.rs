//! Fanout
//!
//! Pushes chat changes to the private channel of every member that is
//! currently in the area of the chat's family (`dm` or `gdm`). Offline
//! members get nothing; they catch up through the read operations. Every
//! push runs detached from the request that caused it, under its own
//! timeout, and only ever logs its failures.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::application::dto::{Notification, PresenceAnswer};
use crate::application::services::presence_service::PresenceTracker;
use crate::domain::{
    ChatRef, DmRepository, FriendRepository, GdmRepository, Location, LocationFilter,
};
use crate::infrastructure::cache::keys;
use crate::infrastructure::messaging::Publisher;
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// Detached notification side channel used by the chat services.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    /// Notify the present members of the notification's chat.
    fn notify(&self, notification: Notification) -> JoinHandle<()>;

    /// Notify the present members among `members`, for changes after which
    /// the chat's own member list no longer has the right audience.
    fn notify_members(&self, members: Vec<String>, notification: Notification) -> JoinHandle<()>;
}

/// Presence area in which members see changes to `chat`.
pub fn location_of(chat: &ChatRef) -> Location {
    match chat {
        ChatRef::Dm(_) => Location::Dm,
        ChatRef::Gdm(_) => Location::Gdm,
    }
}

struct Inner {
    dms: Arc<dyn DmRepository>,
    gdms: Arc<dyn GdmRepository>,
    friends: Arc<dyn FriendRepository>,
    presence: PresenceTracker,
    publisher: Arc<dyn Publisher>,
    timeout: Duration,
}

/// Presence-aware pusher.
#[derive(Clone)]
pub struct Fanout {
    inner: Arc<Inner>,
}

impl Fanout {
    pub fn new(
        dms: Arc<dyn DmRepository>,
        gdms: Arc<dyn GdmRepository>,
        friends: Arc<dyn FriendRepository>,
        presence: PresenceTracker,
        publisher: Arc<dyn Publisher>,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                dms,
                gdms,
                friends,
                presence,
                publisher,
                timeout,
            }),
        }
    }

    /// Full member list of a chat; empty if it no longer exists.
    async fn members_of(&self, chat: &ChatRef) -> Result<Vec<String>, AppError> {
        match chat {
            ChatRef::Dm(id) => Ok(self
                .inner
                .dms
                .find_by_id(id)
                .await?
                .map(|dm| dm.members().iter().map(|m| m.to_string()).collect())
                .unwrap_or_default()),
            ChatRef::Gdm(id) => self.inner.gdms.members(id).await,
        }
    }

    /// Push `notification` to the members present in its chat family's
    /// area. A failed push to one member does not stop the others. Returns
    /// the number of delivered pushes.
    #[instrument(skip(self, members, notification), fields(event = notification.name()))]
    pub async fn push(
        &self,
        members: &[String],
        notification: &Notification,
    ) -> Result<usize, AppError> {
        let filter = LocationFilter::Exact(location_of(notification.chat()));
        let present = self.inner.presence.get_presence(&filter, members).await?;
        if present.is_empty() {
            return Ok(0);
        }

        let payload = serde_json::to_vec(notification)?;
        let results = join_all(present.iter().map(|userid| {
            let channel = keys::user_channel(userid);
            let payload = &payload;
            async move { self.inner.publisher.publish(&channel, payload).await }
        }))
        .await;

        let mut pushed = 0;
        for (userid, result) in present.iter().zip(results) {
            match result {
                Ok(()) => pushed += 1,
                Err(e) => warn!(userid = %userid, error = %e, "Push to member failed"),
            }
        }

        metrics::record_fanout(notification.name(), pushed);
        debug!(pushed, present = present.len(), "Fanout delivered");
        Ok(pushed)
    }

    /// Resolve the chat's members, then [`push`](Self::push).
    pub async fn push_to_chat(&self, notification: &Notification) -> Result<usize, AppError> {
        let members = self.members_of(notification.chat()).await?;
        self.push(&members, notification).await
    }

    /// Answer which of `candidates` are online, considering only friends of
    /// `requester`. The answer goes to the requester's own channel.
    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    pub async fn presence_query(
        &self,
        requester: &str,
        candidates: &[String],
    ) -> Result<Vec<String>, AppError> {
        let friends = self
            .inner
            .friends
            .filter_friends(requester, candidates)
            .await?;
        let online = self
            .inner
            .presence
            .get_presence(&LocationFilter::Any, &friends)
            .await?;

        let answer = PresenceAnswer {
            userids: online.clone(),
        };
        self.inner
            .publisher
            .publish(&keys::user_channel(requester), &serde_json::to_vec(&answer)?)
            .await?;

        Ok(online)
    }

    fn detach<F>(&self, event: &'static str, work: F) -> JoinHandle<()>
    where
        F: std::future::Future<Output = Result<usize, AppError>> + Send + 'static,
    {
        let timeout = self.inner.timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, work).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(event, error = %e, "Fanout failed"),
                Err(_) => warn!(event, timeout_ms = timeout.as_millis() as u64, "Fanout timed out"),
            }
        })
    }
}

impl Notifier for Fanout {
    fn notify(&self, notification: Notification) -> JoinHandle<()> {
        let fanout = self.clone();
        self.detach(notification.name(), async move {
            fanout.push_to_chat(&notification).await
        })
    }

    fn notify_members(&self, members: Vec<String>, notification: Notification) -> JoinHandle<()> {
        let fanout = self.clone();
        self.detach(notification.name(), async move {
            fanout.push(&members, &notification).await
        })
    }
}
