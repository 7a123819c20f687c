//! Errors shared by the direct chat, group chat and message services.

use crate::shared::error::AppError;

/// Chat service errors
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Absent, or not visible to the requester.
    #[error("Chat not found")]
    NotFound,

    #[error("Not a member of the chat")]
    NotMember,

    #[error("User IDs must be unique")]
    DuplicateMembers,

    #[error("User is already a member")]
    AlreadyMember,

    #[error("Group chats must have between {min} and {max} members")]
    Capacity { min: usize, max: usize },

    #[error("Unknown users: {0:?}")]
    UnknownUsers(Vec<String>),

    #[error("Not friends: {0:?}")]
    NotFriends(Vec<String>),

    #[error("Invalid chat properties: {0}")]
    Invalid(String),

    #[error("Message not found")]
    MessageNotFound,

    #[error("Only the author may erase a message")]
    NotAuthor,

    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::NotFound | ChatError::NotMember | ChatError::MessageNotFound => {
                AppError::NotFound(err.to_string())
            }
            ChatError::NotAuthor => AppError::Unauthorized(err.to_string()),
            ChatError::DuplicateMembers | ChatError::AlreadyMember => {
                AppError::Conflict(err.to_string())
            }
            ChatError::Capacity { .. } => AppError::Capacity(err.to_string()),
            ChatError::UnknownUsers(_) => AppError::NotFound(err.to_string()),
            ChatError::NotFriends(_) => AppError::BadRequest(err.to_string()),
            ChatError::Invalid(msg) => AppError::Validation(msg),
            ChatError::Store(e) => e,
        }
    }
}

/// Repository `Conflict` as a domain error, everything else as a store error.
pub(crate) fn on_conflict(err: AppError, conflict: ChatError) -> ChatError {
    match err {
        AppError::Conflict(_) => conflict,
        other => ChatError::Store(other),
    }
}

/// Reject lists that name a user twice.
pub(crate) fn ensure_unique(userids: &[String]) -> Result<(), ChatError> {
    let mut seen = std::collections::HashSet::with_capacity(userids.len());
    if userids.iter().all(|id| seen.insert(id.as_str())) {
        Ok(())
    } else {
        Err(ChatError::DuplicateMembers)
    }
}
