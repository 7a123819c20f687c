//! Event Synchronizer
//!
//! Keeps direct chats in step with the friend graph. Consumes `friend` and
//! `unfriend` events at least once and applies each idempotently:
//!
//! - `friend`: create the pair's direct chat; an existing one is success.
//! - `unfriend`: delete the pair's messages, then the chat; no chat is success.
//!
//! A delivery that fails, including one that does not decode, is left
//! unacknowledged so the transport hands it out again.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{DirectChat, DmRepository, FriendEvent, MessageRepository, UserPair};
use crate::infrastructure::messaging::{Delivery, EventConsumer};
use crate::infrastructure::metrics;
use crate::shared::clock::Clock;
use crate::shared::error::AppError;

/// Pause after a failed fetch before asking the transport again
const FETCH_BACKOFF: Duration = Duration::from_secs(1);

/// What applying one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    DmCreated,
    DmExisted,
    DmDeleted { messages: u64 },
    NoDm,
    /// Event about a user and themselves
    Ignored,
}

/// Synchronizer errors
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] AppError),
}

/// Applies friend graph events to direct chats.
pub struct EventSynchronizer {
    dms: Arc<dyn DmRepository>,
    messages: Arc<dyn MessageRepository>,
    clock: Arc<dyn Clock>,
}

impl EventSynchronizer {
    pub fn new(
        dms: Arc<dyn DmRepository>,
        messages: Arc<dyn MessageRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dms,
            messages,
            clock,
        }
    }

    /// Decode and apply one raw event.
    pub async fn handle(&self, payload: &[u8]) -> Result<SyncOutcome, SyncError> {
        let event = FriendEvent::decode(payload)?;
        self.apply(&event).await
    }

    #[instrument(skip(self), fields(kind = event.kind()))]
    pub async fn apply(&self, event: &FriendEvent) -> Result<SyncOutcome, SyncError> {
        let pair = event.pair();
        if pair.is_self_pair() {
            warn!(pair = %pair, "Ignoring friend event about a single user");
            return Ok(SyncOutcome::Ignored);
        }

        let outcome = match event {
            FriendEvent::Friend { .. } => self.on_friend(pair).await?,
            FriendEvent::Unfriend { .. } => self.on_unfriend(pair).await?,
        };
        debug!(?outcome, "Friend event applied");

        Ok(outcome)
    }

    async fn on_friend(&self, pair: UserPair) -> Result<SyncOutcome, AppError> {
        let chat = DirectChat::new(pair, self.clock.now());
        match self.dms.insert(&chat).await {
            Ok(()) => {
                info!(chat_id = %chat.chat_id, pair = %chat.pair, "Direct chat created");
                Ok(SyncOutcome::DmCreated)
            }
            Err(AppError::Conflict(_)) => Ok(SyncOutcome::DmExisted),
            Err(e) => Err(e),
        }
    }

    async fn on_unfriend(&self, pair: UserPair) -> Result<SyncOutcome, AppError> {
        let Some(chat) = self.dms.find_by_pair(&pair).await? else {
            return Ok(SyncOutcome::NoDm);
        };

        let messages = self.messages.delete_all(&chat.chat_id).await?;
        self.dms.delete(&chat.chat_id).await?;
        info!(chat_id = %chat.chat_id, pair = %pair, messages, "Direct chat deleted");

        Ok(SyncOutcome::DmDeleted { messages })
    }

    async fn process(&self, consumer: &mut (dyn EventConsumer + '_), delivery: &Delivery) {
        match self.handle(&delivery.payload).await {
            Ok(outcome) => {
                metrics::record_event(outcome_kind(outcome), true);
                if let Err(e) = consumer.ack(delivery).await {
                    warn!(id = %delivery.id, error = %e, "Failed to acknowledge event");
                }
            }
            Err(SyncError::Store(e)) if e.is_infrastructure() => {
                metrics::record_event("failed", false);
                warn!(
                    id = %delivery.id,
                    attempt = delivery.attempt,
                    error = %e,
                    "Store unavailable for friend event; leaving it for redelivery"
                );
            }
            Err(e) => {
                metrics::record_event("failed", false);
                error!(
                    id = %delivery.id,
                    stream = %delivery.stream,
                    attempt = delivery.attempt,
                    error = %e,
                    "Friend event failed; leaving it for redelivery"
                );
            }
        }
    }

    /// Consume until `cancel` fires. Never returns an error: fetch failures
    /// are logged and retried after a short pause.
    pub async fn run(&self, consumer: &mut (dyn EventConsumer + '_), cancel: CancellationToken) {
        info!("Event synchronizer started");

        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => break,
                batch = consumer.fetch() => batch,
            };

            match batch {
                Ok(deliveries) => {
                    for delivery in &deliveries {
                        if cancel.is_cancelled() {
                            break;
                        }
                        self.process(consumer, delivery).await;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to fetch events");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(FETCH_BACKOFF) => {}
                    }
                }
            }
        }

        info!("Event synchronizer stopped");
    }
}

fn outcome_kind(outcome: SyncOutcome) -> &'static str {
    match outcome {
        SyncOutcome::DmCreated | SyncOutcome::DmExisted => "friend",
        SyncOutcome::DmDeleted { .. } | SyncOutcome::NoDm => "unfriend",
        SyncOutcome::Ignored => "ignored",
    }
}
