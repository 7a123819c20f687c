//! Application Services
//!
//! Business logic services that coordinate domain operations.
//!
//! ## Available Services
//!
//! - **FriendService**: Invitations, mirrored friend edges, friend lookups
//! - **DmService**: Direct chat reads and property edits
//! - **GdmService**: Group chat lifecycle and bounded membership
//! - **MessageService**: Posting, listing and erasing messages
//! - **EventSynchronizer**: Applies friend graph events to direct chats
//! - **PresenceTracker / Fanout**: Presence records and live pushes
//! - **RateLimiter**: Sliding-window request limiting
//! - **Maintenance**: User purge and invitation GC

pub mod chat_error;
pub mod dm_service;
pub mod event_sync;
pub mod fanout;
pub mod friend_service;
pub mod gdm_service;
pub mod maintenance;
pub mod message_service;
pub mod presence_service;
pub mod rate_limit_service;

pub use chat_error::ChatError;

pub use dm_service::{DmService, DmServiceImpl};

pub use event_sync::{EventSynchronizer, SyncError, SyncOutcome};

pub use fanout::{Fanout, Notifier};

pub use friend_service::{FriendError, FriendService, FriendServiceImpl};

pub use gdm_service::{GdmRemoval, GdmService, GdmServiceImpl};

pub use maintenance::{Maintenance, MaintenanceDeps, PurgeReport};

pub use message_service::{MessageService, MessageServiceImpl};

pub use presence_service::{PresenceTracker, PRESENCE_TTL};

pub use rate_limit_service::{Limit, RateLimitError, RateLimiter, Tag};
