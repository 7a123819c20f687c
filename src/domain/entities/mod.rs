//! # Domain Entities
//!
//! Core domain entities of the messaging core. All entities map directly to
//! their corresponding database tables.
//!
//! - **FriendEdge / FriendInvitation**: the friend graph
//! - **DirectChat**: a two-party chat keyed by the sorted user pair
//! - **GroupChat**: a 3 to 31 member chat with its assoc index
//! - **Message**: an append-only chat message
//!
//! Each entity has an associated repository trait defining data access
//! operations, implemented in the infrastructure layer.

mod direct_chat;
mod friend;
mod group_chat;
mod message;
mod user;

pub use direct_chat::{DirectChat, DmRepository};
pub use friend::{FriendEdge, FriendInvitation, FriendRepository, InvitationRepository};
pub use group_chat::{
    member_pairs, GdmRepository, GroupChat, MembershipChange, MAX_GROUP_MEMBERS,
    MIN_GROUP_MEMBERS,
};
pub use message::{ChatRef, Message, MessageKind, MessageRepository};
pub use user::UserDirectory;
