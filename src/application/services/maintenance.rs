//! Maintenance
//!
//! Background cascades that keep relations consistent with the outside
//! world:
//!
//! - **user purge**: a user deleted from the directory loses every friend
//!   edge, every group chat membership and every invitation. Removing the
//!   edges goes through the friend service so the usual `unfriend` events
//!   tear down the direct chats.
//! - **invitation GC**: expired invitations are deleted.
//!
//! Both drain in pages until a short page, so an interrupted run is simply
//! started again later.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::application::services::chat_error::ChatError;
use crate::application::services::friend_service::{FriendError, FriendService};
use crate::application::services::gdm_service::GdmService;
use crate::domain::{FriendRepository, GdmRepository, InvitationRepository, UserDirectory};
use crate::infrastructure::metrics;
use crate::shared::clock::Clock;
use crate::shared::drain::{drain_pages, DrainOutcome};
use crate::shared::error::AppError;

/// Default page size of every drain
pub const DEFAULT_PAGE_SIZE: usize = 256;

/// What one user purge removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub friends: usize,
    pub group_chats: usize,
    pub invitations: usize,
    pub cancelled: bool,
}

/// Collaborators of the maintenance tasks.
pub struct MaintenanceDeps {
    pub friends: Arc<dyn FriendRepository>,
    pub friend_service: Arc<dyn FriendService>,
    pub gdms: Arc<dyn GdmRepository>,
    pub gdm_service: Arc<dyn GdmService>,
    pub invitations: Arc<dyn InvitationRepository>,
    pub directory: Arc<dyn UserDirectory>,
    pub clock: Arc<dyn Clock>,
}

pub struct Maintenance {
    deps: MaintenanceDeps,
    invitation_duration: chrono::Duration,
    page_size: usize,
}

impl Maintenance {
    pub fn new(deps: MaintenanceDeps, invitation_duration: chrono::Duration, page_size: usize) -> Self {
        Self {
            deps,
            invitation_duration,
            page_size: page_size.max(1),
        }
    }

    /// Remove every relation of `userid`.
    #[instrument(skip(self, cancel))]
    pub async fn purge_user(
        &self,
        userid: &str,
        cancel: &CancellationToken,
    ) -> Result<PurgeReport, AppError> {
        let deps = &self.deps;
        let mut report = PurgeReport::default();

        let friends = drain_pages(
            cancel,
            self.page_size,
            |limit| deps.friends.list(userid, None, limit as i64),
            |edge| async move {
                match deps.friend_service.remove_friend(userid, &edge.friend_id).await {
                    Ok(()) | Err(FriendError::NotFriends) => Ok(()),
                    Err(e) => Err(AppError::from(e)),
                }
            },
        )
        .await?;
        report.friends = friends.processed();
        if matches!(friends, DrainOutcome::Cancelled { .. }) {
            report.cancelled = true;
            return Ok(report);
        }

        let chats = drain_pages(
            cancel,
            self.page_size,
            |limit| deps.gdms.chats_of(userid, limit as i64),
            |chat_id| async move {
                match deps.gdm_service.remove_user(&chat_id, userid).await {
                    Ok(_) | Err(ChatError::NotFound) | Err(ChatError::NotMember) => Ok(()),
                    Err(e) => Err(AppError::from(e)),
                }
            },
        )
        .await?;
        report.group_chats = chats.processed();
        if matches!(chats, DrainOutcome::Cancelled { .. }) {
            report.cancelled = true;
            return Ok(report);
        }

        let invitations = drain_pages(
            cancel,
            self.page_size,
            |limit| deps.invitations.list_involving(userid, limit as i64),
            |inv| async move {
                deps.invitations.delete(&inv.userid, &inv.invited_by).await?;
                Ok(())
            },
        )
        .await?;
        report.invitations = invitations.processed();
        report.cancelled = matches!(invitations, DrainOutcome::Cancelled { .. });

        info!(
            friends = report.friends,
            group_chats = report.group_chats,
            invitations = report.invitations,
            cancelled = report.cancelled,
            "User purged"
        );
        Ok(report)
    }

    /// Purge every user the directory reports as deleted. A user is marked
    /// done only after a complete purge. Returns the number of users.
    #[instrument(skip(self, cancel))]
    pub async fn purge_deleted_users(&self, cancel: &CancellationToken) -> Result<usize, AppError> {
        let deps = &self.deps;

        let outcome = drain_pages(
            cancel,
            self.page_size,
            |limit| deps.directory.pending_purge(limit as i64),
            |userid| async move {
                let report = self.purge_user(&userid, cancel).await?;
                if !report.cancelled {
                    deps.directory.complete_purge(&userid).await?;
                }
                Ok(())
            },
        )
        .await?;

        metrics::record_maintenance("user_purge", outcome.processed());
        Ok(outcome.processed())
    }

    /// Delete invitations older than the invitation duration. Returns the
    /// number deleted.
    #[instrument(skip(self, cancel))]
    pub async fn gc_invitations(&self, cancel: &CancellationToken) -> Result<usize, AppError> {
        let deps = &self.deps;
        let before = deps.clock.now() - self.invitation_duration;

        let outcome = drain_pages(
            cancel,
            self.page_size,
            |limit| deps.invitations.list_expired(before, limit as i64),
            |inv| async move {
                deps.invitations.delete(&inv.userid, &inv.invited_by).await?;
                Ok(())
            },
        )
        .await?;

        if outcome.processed() > 0 {
            info!(deleted = outcome.processed(), "Expired invitations deleted");
        }
        metrics::record_maintenance("invitation_gc", outcome.processed());
        Ok(outcome.processed())
    }

    /// Run both tasks periodically until `cancel` fires.
    pub fn spawn_workers(
        self: Arc<Self>,
        purge_every: Duration,
        gc_every: Duration,
        cancel: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let purge = {
            let this = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(purge_every);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                    if let Err(e) = this.purge_deleted_users(&cancel).await {
                        error!(error = %e, "User purge failed");
                    }
                }
            })
        };

        let gc = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(gc_every);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if let Err(e) = self.gc_invitations(&cancel).await {
                    error!(error = %e, "Invitation GC failed");
                }
            }
        });

        vec![purge, gc]
    }
}
