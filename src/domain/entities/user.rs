//! External user directory.
//!
//! Users are owned by another service; this core only needs to know
//! whether they exist, what they are called, and which deleted accounts
//! still need their relations purged.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::shared::error::AppError;

/// Read access to the user directory.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Usernames of the given users. Unknown or deleted users are absent
    /// from the map.
    async fn usernames(&self, userids: &[String]) -> Result<HashMap<String, String>, AppError>;

    /// Deleted users whose friends and group chats have not been purged yet.
    async fn pending_purge(&self, limit: i64) -> Result<Vec<String>, AppError>;

    /// Record that a deleted user's relations are gone.
    async fn complete_purge(&self, userid: &str) -> Result<(), AppError>;
}
