//! Value Objects
//!
//! Immutable value types used across the domain.

mod location;
mod user_pair;

pub use location::{InvalidLocation, Location, LocationFilter};
pub use user_pair::UserPair;
