//! Presence locations.
//!
//! A location names the area of the client a connected user is in: the
//! direct chat list (`dm`) or the group chat list (`gdm`). Fanout targets
//! every member present in the area of the chat's family.

use std::fmt;
use std::str::FromStr;

/// Where a user currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Dm,
    Gdm,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Location::Dm => "dm",
            Location::Gdm => "gdm",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected location string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid location")]
pub struct InvalidLocation;

impl FromStr for Location {
    type Err = InvalidLocation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dm" => Ok(Location::Dm),
            "gdm" => Ok(Location::Gdm),
            _ => Err(InvalidLocation),
        }
    }
}

/// Which presence records a lookup should accept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationFilter {
    /// Only users at exactly this location
    Exact(Location),
    /// Users anywhere
    Any,
}

impl LocationFilter {
    /// Match a stored location string against the filter
    pub fn matches(&self, stored: &str) -> bool {
        match self {
            LocationFilter::Any => stored.parse::<Location>().is_ok(),
            LocationFilter::Exact(loc) => stored.parse::<Location>() == Ok(*loc),
        }
    }
}
