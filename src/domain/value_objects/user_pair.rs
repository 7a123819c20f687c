//! Canonical two-party key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An unordered pair of user IDs stored in lexicographic order.
///
/// `UserPair::new(a, b)` and `UserPair::new(b, a)` are equal, so every
/// two-party lookup (friend event partition key, direct chat row) resolves
/// to one record regardless of argument order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserPair {
    first: String,
    second: String,
}

impl UserPair {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    /// The lexicographically smaller ID
    pub fn first(&self) -> &str {
        &self.first
    }

    /// The lexicographically larger ID
    pub fn second(&self) -> &str {
        &self.second
    }

    pub fn contains(&self, userid: &str) -> bool {
        self.first == userid || self.second == userid
    }

    /// The member that is not `userid`, if `userid` is part of the pair.
    pub fn other(&self, userid: &str) -> Option<&str> {
        if self.first == userid {
            Some(&self.second)
        } else if self.second == userid {
            Some(&self.first)
        } else {
            None
        }
    }

    pub fn is_self_pair(&self) -> bool {
        self.first == self.second
    }

    /// Stable key used to route events about this pair to one partition
    pub fn key(&self) -> String {
        format!("{}.{}", self.first, self.second)
    }
}

impl fmt::Display for UserPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.first, self.second)
    }
}
