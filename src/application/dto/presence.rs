//! Inbound presence frames.
//!
//! Size limits are checked here, at the boundary, before anything reaches
//! the presence tracker.

use serde::Deserialize;
use validator::Validate;

use crate::shared::validation::validate_user_ids;

/// Largest candidate list a presence query may carry
pub const MAX_QUERY_IDS: u64 = 255;

/// A frame sent by a connected client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", content = "d", rename_all = "snake_case")]
pub enum InboundFrame {
    /// Location ping
    Presence(PresencePing),
    /// Which of these users are online?
    PresenceQuery(PresenceQuery),
}

/// `{"location": "dm" | "gdm"}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
pub struct PresencePing {
    #[validate(length(min = 1, max = 16, message = "location must be 1 to 16 characters"))]
    pub location: String,
}

/// `{"userids": [...]}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
pub struct PresenceQuery {
    #[validate(
        length(min = 1, max = 255, message = "between 1 and 255 user IDs"),
        custom(function = validate_user_ids)
    )]
    pub userids: Vec<String>,
}
