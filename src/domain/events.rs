//! Friend graph domain events.
//!
//! Wire envelope: `{"kind": "friend" | "unfriend", "payload": {...}}`.
//! Any other kind fails to decode; the consumer treats that as a failed
//! delivery so the transport redelivers it.

use serde::{Deserialize, Serialize};

use super::value_objects::UserPair;

/// Stream subject carrying friend graph events
pub const FRIEND_EVENTS_SUBJECT: &str = "friends";

/// A change of the friend graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "lowercase")]
pub enum FriendEvent {
    /// `userid` accepted an invitation from `invited_by`
    Friend { userid: String, invited_by: String },
    /// `userid` removed `other` as a friend
    Unfriend { userid: String, other: String },
}

impl FriendEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            FriendEvent::Friend { .. } => "friend",
            FriendEvent::Unfriend { .. } => "unfriend",
        }
    }

    /// The canonical pair the event is about
    pub fn pair(&self) -> UserPair {
        match self {
            FriendEvent::Friend { userid, invited_by } => UserPair::new(userid, invited_by),
            FriendEvent::Unfriend { userid, other } => UserPair::new(userid, other),
        }
    }

    /// Partition key: every event for the same pair shares it.
    pub fn partition_key(&self) -> String {
        self.pair().key()
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
