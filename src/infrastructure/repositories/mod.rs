//! Repository Implementations
//!
//! PostgreSQL implementations of domain repository traits.
//!
//! ## Available Repositories
//!
//! - **PgFriendRepository** - Mirrored friend edges with prefix search
//! - **PgInvitationRepository** - Pending friend invitations
//! - **PgDmRepository** - Direct chats keyed by the sorted user pair
//! - **PgGdmRepository** - Group chats, membership and the assoc index
//! - **PgMessageRepository** - Message log with cursor pagination
//! - **PgUserDirectory** - Usernames and pending account purges
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use sqlx::PgPool;
//! use crate::infrastructure::repositories::{PgFriendRepository, PgDmRepository};
//!
//! async fn setup_repositories(pool: PgPool) {
//!     let friends = PgFriendRepository::new(pool.clone());
//!     let dms = PgDmRepository::new(pool.clone());
//! }
//! ```

pub mod dm_repository;
pub mod friend_repository;
pub mod gdm_repository;
pub mod invitation_repository;
pub mod message_repository;
pub mod user_directory;

pub use dm_repository::PgDmRepository;
pub use friend_repository::PgFriendRepository;
pub use gdm_repository::PgGdmRepository;
pub use invitation_repository::PgInvitationRepository;
pub use message_repository::PgMessageRepository;
pub use user_directory::PgUserDirectory;
