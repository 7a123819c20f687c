//! Data Transfer Objects
//!
//! Inbound payloads with their boundary validation rules, and the
//! notifications pushed to connected clients.

pub mod chat;
pub mod notification;
pub mod presence;

pub use chat::{ChatProps, CreateGroupChat, DEFAULT_THEME};
pub use notification::{Notification, PresenceAnswer};
pub use presence::{InboundFrame, PresencePing, PresenceQuery};
