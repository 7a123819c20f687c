//! # Domain Layer
//!
//! The domain layer contains the core business types of the messaging core.
//! It is independent of any external frameworks or infrastructure concerns.
//!
//! ## Structure
//!
//! - **entities**: Friend graph, direct chats, group chats and messages,
//!   each with its repository trait
//! - **value_objects**: Immutable value types (UserPair, Location)
//! - **events**: Friend graph events carried over the event stream

pub mod entities;
pub mod events;
pub mod value_objects;

// Re-export commonly used types
pub use entities::*;
pub use events::FriendEvent;
pub use value_objects::*;
