//! Canonical unordered identity pairs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An unordered pair of identity ids, stored with the lexicographically
/// smaller id first.
///
/// `PairKey::new(a, b) == PairKey::new(b, a)` for every `a` and `b`. All
/// uniqueness rules keyed by "pair of participants" (connections, pending
/// requests, chats, open calls) go through this type, so callers cannot
/// accidentally build a key in the wrong order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    low: String,
    high: String,
}

impl PairKey {
    /// Canonicalize two identity ids into a pair key.
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self {
                low: a.to_string(),
                high: b.to_string(),
            }
        } else {
            Self {
                low: b.to_string(),
                high: a.to_string(),
            }
        }
    }

    /// The smaller identity id.
    pub fn low(&self) -> &str {
        &self.low
    }

    /// The larger identity id.
    pub fn high(&self) -> &str {
        &self.high
    }

    /// True if both sides are the same identity.
    pub fn is_self_pair(&self) -> bool {
        self.low == self.high
    }

    /// True if `identity` is one of the two members.
    pub fn contains(&self, identity: &str) -> bool {
        self.low == identity || self.high == identity
    }

    /// The member that is not `identity`, if `identity` is a member.
    pub fn other(&self, identity: &str) -> Option<&str> {
        if self.low == identity {
            Some(&self.high)
        } else if self.high == identity {
            Some(&self.low)
        } else {
            None
        }
    }

    /// Flat string form used as a storage and lock key.
    pub fn as_key(&self) -> String {
        format!("{}|{}", self.low, self.high)
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.low, self.high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_members() {
        let key = PairKey::new("zed", "amy");
        assert_eq!(key.low(), "amy");
        assert_eq!(key.high(), "zed");
        assert_eq!(key.as_key(), "amy|zed");
    }

    #[test]
    fn other_member() {
        let key = PairKey::new("a", "b");
        assert_eq!(key.other("a"), Some("b"));
        assert_eq!(key.other("b"), Some("a"));
        assert_eq!(key.other("c"), None);
    }

    #[test]
    fn self_pair_detected() {
        assert!(PairKey::new("a", "a").is_self_pair());
        assert!(!PairKey::new("a", "b").is_self_pair());
    }
}
